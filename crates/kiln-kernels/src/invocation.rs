//! Launch descriptors handed to the dispatcher.

use crate::args::KernelArguments;
use crate::driver::{EventHandle, GraphExecHandle, StreamHandle};
use crate::marshal::ScalarSlot;

/// Three-component launch extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dim3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dim3 {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Product of the three components.
    pub fn volume(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    pub fn is_degenerate(&self) -> bool {
        self.x == 0 || self.y == 0 || self.z == 0
    }
}

impl std::fmt::Display for Dim3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

impl From<(u32, u32, u32)> for Dim3 {
    fn from((x, y, z): (u32, u32, u32)) -> Self {
        Self { x, y, z }
    }
}

/// One kernel launch: which kernel, launch geometry and packed arguments.
#[derive(Debug, Clone)]
pub struct KernelInvocation {
    pub kernel_name: String,
    /// Number of work-groups per axis.
    pub grid: Dim3,
    /// Work-items per work-group per axis.
    pub block: Dim3,
    pub shared_memory_bytes: u32,
    pub args: KernelArguments,
}

impl KernelInvocation {
    pub fn new(kernel_name: impl Into<String>, grid: Dim3, block: Dim3) -> Self {
        Self {
            kernel_name: kernel_name.into(),
            grid,
            block,
            shared_memory_bytes: 0,
            args: KernelArguments::new(),
        }
    }

    pub fn with_args(mut self, args: KernelArguments) -> Self {
        self.args = args;
        self
    }

    pub fn with_shared_memory(mut self, bytes: u32) -> Self {
        self.shared_memory_bytes = bytes;
        self
    }
}

/// Where and how a single launch is submitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaunchOptions {
    pub stream: StreamHandle,
    pub start_event: Option<EventHandle>,
    pub stop_event: Option<EventHandle>,
}

impl LaunchOptions {
    pub fn on_stream(stream: StreamHandle) -> Self {
        Self {
            stream,
            ..Self::default()
        }
    }

    pub fn timed(stream: StreamHandle, start: EventHandle, stop: EventHandle) -> Self {
        Self {
            stream,
            start_event: Some(start),
            stop_event: Some(stop),
        }
    }
}

/// Timing events for a batch launch.
#[derive(Debug, Clone, Default)]
pub enum LaunchEvents {
    #[default]
    None,
    /// One start event before the first kernel, one stop event after the last.
    Bracket { start: EventHandle, stop: EventHandle },
    /// One start/stop pair per kernel; lengths must match the batch.
    PerKernel {
        starts: Vec<EventHandle>,
        stops: Vec<EventHandle>,
    },
}

/// A reusable, updatable capture of one launch plus its bound "alpha" and
/// "beta" scalars.
///
/// The argument buffer is owned exclusively by the invocation and is released
/// explicitly with `release_kernel_args` (or `HipAdapter::release_graph`,
/// which also destroys the captured graph). Dropping an invocation that still
/// owns either logs a warning.
pub struct GraphInvocation {
    pub alpha: ScalarSlot,
    pub beta: ScalarSlot,
    /// Source-level kernels take one half-precision scalar slot; assembly
    /// kernels take a duplicate under `<name>_2`.
    pub is_source_kernel: bool,
    pub(crate) kernel_args: Option<Box<KernelArguments>>,
    pub(crate) exec: Option<GraphExecHandle>,
}

impl GraphInvocation {
    pub fn new(
        kernel_args: KernelArguments,
        alpha: ScalarSlot,
        beta: ScalarSlot,
        is_source_kernel: bool,
    ) -> Self {
        Self {
            alpha,
            beta,
            is_source_kernel,
            kernel_args: Some(Box::new(kernel_args)),
            exec: None,
        }
    }

    pub fn kernel_args(&self) -> Option<&KernelArguments> {
        self.kernel_args.as_deref()
    }

    /// Whether a graph has been captured for this invocation.
    pub fn is_captured(&self) -> bool {
        self.exec.is_some()
    }

    /// Release the owned argument buffer. Returns false if it was already
    /// released, so the buffer is freed exactly once.
    pub fn release_kernel_args(&mut self) -> bool {
        match self.kernel_args.take() {
            Some(args) => {
                tracing::debug!("releasing graph kernel arguments ({} bytes)", args.len());
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for GraphInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphInvocation")
            .field("alpha", &self.alpha)
            .field("beta", &self.beta)
            .field("is_source_kernel", &self.is_source_kernel)
            .field("args_bytes", &self.kernel_args.as_ref().map(|a| a.len()))
            .field("captured", &self.exec.is_some())
            .finish()
    }
}

impl Drop for GraphInvocation {
    fn drop(&mut self) {
        if self.kernel_args.is_some() {
            tracing::warn!("graph invocation dropped without releasing its kernel arguments");
        }
        if self.exec.is_some() {
            tracing::warn!("graph invocation dropped with a live captured graph; the graph leaks");
        }
    }
}
