use std::fmt;
use std::path::PathBuf;

/// Driver status code, passed through verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DriverStatus(pub i32);

impl DriverStatus {
    pub const SUCCESS: DriverStatus = DriverStatus(0);
    pub const INVALID_VALUE: DriverStatus = DriverStatus(1);
    pub const INVALID_CONFIGURATION: DriverStatus = DriverStatus(9);
    pub const INVALID_IMAGE: DriverStatus = DriverStatus(200);
    pub const NOT_FOUND: DriverStatus = DriverStatus(500);
    pub const LAUNCH_FAILURE: DriverStatus = DriverStatus(719);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised while loading code objects, resolving kernels,
/// marshaling arguments or launching.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("HIP runtime not available (libamdhip64.so not found)")]
    DriverUnavailable,

    #[error("failed to read code object '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("driver rejected code object '{module}': HIP error {status}")]
    ModuleLoad { module: String, status: DriverStatus },

    #[error("kernel '{0}' not found in any loaded code object")]
    KernelNotFound(String),

    #[error("type mismatch for argument '{0}'")]
    ArgumentType(String),

    #[error("argument '{0}' is not part of the kernel argument buffer")]
    MissingArgument(String),

    #[error("argument '{name}' occupies {expected} bytes, got a {actual}-byte value")]
    ArgumentSize {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("value {value} for argument '{name}' does not fit in 32 bits")]
    ArgumentOverflow { name: String, value: usize },

    #[error("graph invocation argument buffer was already released")]
    ArgumentsReleased,

    #[error("invalid launch configuration for '{kernel}': {reason}")]
    InvalidLaunch { kernel: String, reason: String },

    #[error("launch of '{kernel}' failed: HIP error {status}")]
    Launch { kernel: String, status: DriverStatus },

    #[error("HIP error {status} in {context}")]
    Driver { status: DriverStatus, context: String },

    #[error("code object directory '{}' does not exist", .0.display())]
    MissingCodeObjectDirectory(PathBuf),

    #[error("embedded code objects were already registered")]
    EmbeddedAlreadyInitialized,

    #[error("config error: {0}")]
    Config(String),
}

impl KernelError {
    /// Whether this error came from creating a module (I/O or driver rejection).
    pub fn is_load_error(&self) -> bool {
        matches!(self, KernelError::Io { .. } | KernelError::ModuleLoad { .. })
    }

    /// Driver status carried by this error, if any.
    pub fn status(&self) -> Option<DriverStatus> {
        match self {
            KernelError::ModuleLoad { status, .. }
            | KernelError::Launch { status, .. }
            | KernelError::Driver { status, .. } => Some(*status),
            KernelError::InvalidLaunch { .. } => Some(DriverStatus::INVALID_CONFIGURATION),
            _ => None,
        }
    }
}

/// Check a driver return code.
pub fn check_hip(status: DriverStatus, context: &str) -> crate::Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(KernelError::Driver {
            status,
            context: context.to_string(),
        })
    }
}
