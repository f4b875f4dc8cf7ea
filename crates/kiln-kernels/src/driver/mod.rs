//! Device driver seam.
//!
//! Everything above this trait (store, lazy loader, dispatcher) is driver
//! agnostic. Two implementations exist:
//! - `hip::HipDriver`: the HIP runtime, loaded with dlopen
//! - `RecordingDriver`: device-free, records every call (tests, dry runs)

pub mod recording;

use std::ffi::c_void;

use crate::error::DriverStatus;
use crate::invocation::Dim3;

pub use recording::{DriverCall, RecordingDriver};

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(*mut c_void);

        // Driver handles are process-global; the HIP runtime synchronizes
        // access to the objects behind them.
        unsafe impl Send for $name {}
        unsafe impl Sync for $name {}

        impl $name {
            pub const fn from_raw(raw: *mut c_void) -> Self {
                Self(raw)
            }

            pub fn as_raw(&self) -> *mut c_void {
                self.0
            }

            pub fn is_null(&self) -> bool {
                self.0.is_null()
            }
        }
    };
}

opaque_handle!(
    /// A loaded code object (`hipModule_t`).
    ModuleHandle
);
opaque_handle!(
    /// A kernel entry point inside a module (`hipFunction_t`).
    FunctionHandle
);
opaque_handle!(
    /// An in-order work queue (`hipStream_t`); null is the default stream.
    StreamHandle
);
opaque_handle!(
    /// A timing/synchronization marker (`hipEvent_t`).
    EventHandle
);

impl StreamHandle {
    pub const DEFAULT: StreamHandle = StreamHandle(std::ptr::null_mut());
}

impl Default for StreamHandle {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A captured single-kernel launch graph: the graph, its executable
/// instance, and the kernel node whose parameters get updated in place.
#[derive(Debug)]
pub struct GraphExecHandle {
    pub graph: *mut c_void,
    pub exec: *mut c_void,
    pub node: *mut c_void,
}

unsafe impl Send for GraphExecHandle {}
unsafe impl Sync for GraphExecHandle {}

/// Geometry and packed arguments for one kernel submission.
#[derive(Debug, Clone, Copy)]
pub struct LaunchParams<'a> {
    pub grid: Dim3,
    pub block: Dim3,
    pub shared_memory_bytes: u32,
    pub args: &'a [u8],
}

/// Capability set the code-object store and dispatcher need from a device.
///
/// Errors are raw driver statuses; callers wrap them with context.
pub trait Driver: Send + Sync {
    /// Human-readable driver name for reports.
    fn name(&self) -> &str;

    /// Create a module from an in-memory code object.
    ///
    /// # Safety
    /// The driver does not copy `image`. It must stay alive and unmodified
    /// until `unload_module` is called for the returned handle.
    unsafe fn load_module(&self, image: &[u8]) -> Result<ModuleHandle, DriverStatus>;

    fn unload_module(&self, module: ModuleHandle) -> Result<(), DriverStatus>;

    /// Look up a kernel symbol. `Ok(None)` means the module does not export it.
    fn get_function(
        &self,
        module: ModuleHandle,
        name: &str,
    ) -> Result<Option<FunctionHandle>, DriverStatus>;

    /// Enqueue a kernel on `stream`. Returns once submitted, not once executed.
    fn launch_kernel(
        &self,
        function: FunctionHandle,
        params: &LaunchParams<'_>,
        stream: StreamHandle,
    ) -> Result<(), DriverStatus>;

    fn record_event(&self, event: EventHandle, stream: StreamHandle) -> Result<(), DriverStatus>;

    /// Capture a single launch into a reusable executable graph.
    fn capture_graph(
        &self,
        function: FunctionHandle,
        params: &LaunchParams<'_>,
        stream: StreamHandle,
    ) -> Result<GraphExecHandle, DriverStatus>;

    /// Replace the kernel node parameters of a captured graph.
    fn update_graph(
        &self,
        graph: &GraphExecHandle,
        function: FunctionHandle,
        params: &LaunchParams<'_>,
    ) -> Result<(), DriverStatus>;

    fn launch_graph(&self, graph: &GraphExecHandle, stream: StreamHandle) -> Result<(), DriverStatus>;

    fn destroy_graph(&self, graph: GraphExecHandle) -> Result<(), DriverStatus>;
}
