//! HIP runtime entry points, resolved with dlopen at first use.
//!
//! Nothing links against ROCm at build time; a machine without a HIP runtime
//! simply reports the driver as unavailable.

use std::ffi::{c_char, c_int, c_uint, c_void};
use std::sync::OnceLock;

use libloading::Library;

// ---------------------------------------------------------------------------
// HIP status codes and constants
// ---------------------------------------------------------------------------

pub type HipErrorT = c_int;
pub const HIP_SUCCESS: HipErrorT = 0;
pub const HIP_ERROR_NOT_FOUND: HipErrorT = 500;

// hipStreamCaptureMode
pub const HIP_STREAM_CAPTURE_MODE_THREAD_LOCAL: c_int = 1;

// Keys of the `extra` launch array
pub const HIP_LAUNCH_PARAM_BUFFER_POINTER: *mut c_void = 0x01 as *mut c_void;
pub const HIP_LAUNCH_PARAM_BUFFER_SIZE: *mut c_void = 0x02 as *mut c_void;
pub const HIP_LAUNCH_PARAM_END: *mut c_void = 0x03 as *mut c_void;

// hipModule_t, hipFunction_t, ... are all opaque pointers.
pub type HipModule = *mut c_void;
pub type HipFunction = *mut c_void;
pub type HipStream = *mut c_void;
pub type HipEvent = *mut c_void;
pub type HipGraph = *mut c_void;
pub type HipGraphExec = *mut c_void;
pub type HipGraphNode = *mut c_void;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HipDim3 {
    pub x: c_uint,
    pub y: c_uint,
    pub z: c_uint,
}

#[repr(C)]
#[derive(Debug)]
pub struct HipKernelNodeParams {
    pub block_dim: HipDim3,
    pub extra: *mut *mut c_void,
    pub func: *mut c_void,
    pub grid_dim: HipDim3,
    pub kernel_params: *mut *mut c_void,
    pub shared_mem_bytes: c_uint,
}

// ---------------------------------------------------------------------------
// HIP runtime API function signatures (hip_runtime_api.h)
// ---------------------------------------------------------------------------

type FnHipInit = unsafe extern "C" fn(c_uint) -> HipErrorT;
type FnHipSetDevice = unsafe extern "C" fn(c_int) -> HipErrorT;
type FnHipModuleLoadData = unsafe extern "C" fn(*mut HipModule, *const c_void) -> HipErrorT;
type FnHipModuleUnload = unsafe extern "C" fn(HipModule) -> HipErrorT;
type FnHipModuleGetFunction = unsafe extern "C" fn(
    *mut HipFunction, HipModule, *const c_char,
) -> HipErrorT;
type FnHipModuleLaunchKernel = unsafe extern "C" fn(
    HipFunction,
    c_uint, c_uint, c_uint,   // grid x, y, z
    c_uint, c_uint, c_uint,   // block x, y, z
    c_uint,                   // shared mem bytes
    HipStream,                // stream (null = default)
    *mut *mut c_void,         // kernel params
    *mut *mut c_void,         // extra
) -> HipErrorT;
type FnHipEventRecord = unsafe extern "C" fn(HipEvent, HipStream) -> HipErrorT;
type FnHipStreamBeginCapture = unsafe extern "C" fn(HipStream, c_int) -> HipErrorT;
type FnHipStreamEndCapture = unsafe extern "C" fn(HipStream, *mut HipGraph) -> HipErrorT;
type FnHipGraphGetNodes = unsafe extern "C" fn(HipGraph, *mut HipGraphNode, *mut usize) -> HipErrorT;
type FnHipGraphInstantiate = unsafe extern "C" fn(
    *mut HipGraphExec, HipGraph, *mut HipGraphNode, *mut c_char, usize,
) -> HipErrorT;
type FnHipGraphExecKernelNodeSetParams = unsafe extern "C" fn(
    HipGraphExec, HipGraphNode, *const HipKernelNodeParams,
) -> HipErrorT;
type FnHipGraphLaunch = unsafe extern "C" fn(HipGraphExec, HipStream) -> HipErrorT;
type FnHipGraphExecDestroy = unsafe extern "C" fn(HipGraphExec) -> HipErrorT;
type FnHipGraphDestroy = unsafe extern "C" fn(HipGraph) -> HipErrorT;

// ---------------------------------------------------------------------------
// Loaded API struct
// ---------------------------------------------------------------------------

/// Sonames tried in order; the unversioned name is a dev-package symlink.
const LIBRARY_NAMES: [&str; 3] = ["libamdhip64.so", "libamdhip64.so.6", "libamdhip64.so.5"];

/// HIP entry points resolved from one loaded `libamdhip64`.
pub struct HipApi {
    pub hip_init: FnHipInit,
    pub hip_set_device: FnHipSetDevice,
    pub hip_module_load_data: FnHipModuleLoadData,
    pub hip_module_unload: FnHipModuleUnload,
    pub hip_module_get_function: FnHipModuleGetFunction,
    pub hip_module_launch_kernel: FnHipModuleLaunchKernel,
    pub hip_event_record: FnHipEventRecord,
    pub hip_stream_begin_capture: FnHipStreamBeginCapture,
    pub hip_stream_end_capture: FnHipStreamEndCapture,
    pub hip_graph_get_nodes: FnHipGraphGetNodes,
    pub hip_graph_instantiate: FnHipGraphInstantiate,
    pub hip_graph_exec_kernel_node_set_params: FnHipGraphExecKernelNodeSetParams,
    pub hip_graph_launch: FnHipGraphLaunch,
    pub hip_graph_exec_destroy: FnHipGraphExecDestroy,
    pub hip_graph_destroy: FnHipGraphDestroy,
    // Keeps the function pointers above valid; dropped last.
    _library: Library,
}

// Safety: plain function pointers into a library that is never unloaded
// while the struct lives; the HIP runtime synchronizes internally.
unsafe impl Send for HipApi {}
unsafe impl Sync for HipApi {}

static HIP_API: OnceLock<Option<HipApi>> = OnceLock::new();

/// Copy a symbol out of `library`, or None if it is not exported.
///
/// # Safety
/// `T` must be the symbol's true function-pointer type.
unsafe fn symbol<T: Copy>(library: &Library, name: &[u8]) -> Option<T> {
    library.get::<T>(name).ok().map(|s| *s)
}

impl HipApi {
    fn open() -> Option<Library> {
        LIBRARY_NAMES
            .iter()
            .find_map(|name| unsafe { Library::new(name) }.ok())
    }

    fn resolve(library: Library) -> Option<Self> {
        // Safety: each type alias above matches the HIP runtime prototype.
        unsafe {
            Some(HipApi {
                hip_init: symbol(&library, b"hipInit\0")?,
                hip_set_device: symbol(&library, b"hipSetDevice\0")?,
                hip_module_load_data: symbol(&library, b"hipModuleLoadData\0")?,
                hip_module_unload: symbol(&library, b"hipModuleUnload\0")?,
                hip_module_get_function: symbol(&library, b"hipModuleGetFunction\0")?,
                hip_module_launch_kernel: symbol(&library, b"hipModuleLaunchKernel\0")?,
                hip_event_record: symbol(&library, b"hipEventRecord\0")?,
                hip_stream_begin_capture: symbol(&library, b"hipStreamBeginCapture\0")?,
                hip_stream_end_capture: symbol(&library, b"hipStreamEndCapture\0")?,
                hip_graph_get_nodes: symbol(&library, b"hipGraphGetNodes\0")?,
                hip_graph_instantiate: symbol(&library, b"hipGraphInstantiate\0")?,
                hip_graph_exec_kernel_node_set_params: symbol(
                    &library,
                    b"hipGraphExecKernelNodeSetParams\0",
                )?,
                hip_graph_launch: symbol(&library, b"hipGraphLaunch\0")?,
                hip_graph_exec_destroy: symbol(&library, b"hipGraphExecDestroy\0")?,
                hip_graph_destroy: symbol(&library, b"hipGraphDestroy\0")?,
                _library: library,
            })
        }
    }
}

/// The process-wide HIP API, loaded on first use. None when no HIP runtime
/// is installed or it lacks a required entry point.
pub fn hip_api() -> Option<&'static HipApi> {
    HIP_API
        .get_or_init(|| {
            let api = HipApi::open().and_then(HipApi::resolve);
            if api.is_none() {
                tracing::debug!("HIP runtime not found (tried {:?})", LIBRARY_NAMES);
            }
            api
        })
        .as_ref()
}
