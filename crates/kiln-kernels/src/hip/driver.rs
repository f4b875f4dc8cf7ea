//! `Driver` implementation over the HIP module API.

use std::ffi::{c_uint, c_void, CString};

use super::ffi::{
    self, HipApi, HipDim3, HipErrorT, HipKernelNodeParams, HIP_ERROR_NOT_FOUND,
    HIP_LAUNCH_PARAM_BUFFER_POINTER, HIP_LAUNCH_PARAM_BUFFER_SIZE, HIP_LAUNCH_PARAM_END,
    HIP_STREAM_CAPTURE_MODE_THREAD_LOCAL, HIP_SUCCESS,
};
use crate::driver::{
    Driver, EventHandle, FunctionHandle, GraphExecHandle, LaunchParams, ModuleHandle, StreamHandle,
};
use crate::error::{check_hip, DriverStatus, KernelError};
use crate::invocation::Dim3;
use crate::Result;

fn status(code: HipErrorT) -> std::result::Result<(), DriverStatus> {
    if code == HIP_SUCCESS {
        Ok(())
    } else {
        Err(DriverStatus(code))
    }
}

fn dim3(d: Dim3) -> HipDim3 {
    HipDim3 { x: d.x, y: d.y, z: d.z }
}

/// `extra` array passing the packed argument buffer to a launch. The array
/// points into `size`, so both must outlive the driver call.
fn launch_extra(args: &[u8], size: &mut usize) -> [*mut c_void; 5] {
    [
        HIP_LAUNCH_PARAM_BUFFER_POINTER,
        args.as_ptr() as *mut c_void,
        HIP_LAUNCH_PARAM_BUFFER_SIZE,
        size as *mut usize as *mut c_void,
        HIP_LAUNCH_PARAM_END,
    ]
}

/// HIP runtime bound to one device index.
pub struct HipDriver {
    api: &'static HipApi,
    device: i32,
}

impl HipDriver {
    /// Initialize HIP and select `device`.
    ///
    /// Fails with `DriverUnavailable` if `libamdhip64.so` cannot be loaded.
    pub fn new(device: i32) -> Result<Self> {
        let api = ffi::hip_api().ok_or(KernelError::DriverUnavailable)?;
        check_hip(DriverStatus(unsafe { (api.hip_init)(0) }), "hipInit")?;
        check_hip(
            DriverStatus(unsafe { (api.hip_set_device)(device) }),
            "hipSetDevice",
        )?;
        tracing::info!("HIP driver initialized on device {}", device);
        Ok(Self { api, device })
    }

    /// Whether the HIP runtime library can be loaded.
    pub fn is_available() -> bool {
        ffi::hip_api().is_some()
    }

    pub fn device(&self) -> i32 {
        self.device
    }

    fn set_device(&self) -> std::result::Result<(), DriverStatus> {
        status(unsafe { (self.api.hip_set_device)(self.device) })
    }
}

impl Driver for HipDriver {
    fn name(&self) -> &str {
        "hip"
    }

    unsafe fn load_module(&self, image: &[u8]) -> std::result::Result<ModuleHandle, DriverStatus> {
        self.set_device()?;
        let mut module: ffi::HipModule = std::ptr::null_mut();
        status((self.api.hip_module_load_data)(
            &mut module,
            image.as_ptr() as *const c_void,
        ))?;
        Ok(ModuleHandle::from_raw(module))
    }

    fn unload_module(&self, module: ModuleHandle) -> std::result::Result<(), DriverStatus> {
        status(unsafe { (self.api.hip_module_unload)(module.as_raw()) })
    }

    fn get_function(
        &self,
        module: ModuleHandle,
        name: &str,
    ) -> std::result::Result<Option<FunctionHandle>, DriverStatus> {
        // A name with an interior NUL cannot be exported by any module.
        let Ok(c_name) = CString::new(name) else {
            return Ok(None);
        };
        let mut func: ffi::HipFunction = std::ptr::null_mut();
        let code = unsafe {
            (self.api.hip_module_get_function)(&mut func, module.as_raw(), c_name.as_ptr())
        };
        match code {
            HIP_SUCCESS => Ok(Some(FunctionHandle::from_raw(func))),
            HIP_ERROR_NOT_FOUND => Ok(None),
            other => Err(DriverStatus(other)),
        }
    }

    fn launch_kernel(
        &self,
        function: FunctionHandle,
        params: &LaunchParams<'_>,
        stream: StreamHandle,
    ) -> std::result::Result<(), DriverStatus> {
        let mut size = params.args.len();
        let mut extra = launch_extra(params.args, &mut size);
        status(unsafe {
            (self.api.hip_module_launch_kernel)(
                function.as_raw(),
                params.grid.x as c_uint,
                params.grid.y as c_uint,
                params.grid.z as c_uint,
                params.block.x as c_uint,
                params.block.y as c_uint,
                params.block.z as c_uint,
                params.shared_memory_bytes as c_uint,
                stream.as_raw(),
                std::ptr::null_mut(), // kernel params (args go through extra)
                extra.as_mut_ptr(),
            )
        })
    }

    fn record_event(
        &self,
        event: EventHandle,
        stream: StreamHandle,
    ) -> std::result::Result<(), DriverStatus> {
        status(unsafe { (self.api.hip_event_record)(event.as_raw(), stream.as_raw()) })
    }

    fn capture_graph(
        &self,
        function: FunctionHandle,
        params: &LaunchParams<'_>,
        stream: StreamHandle,
    ) -> std::result::Result<GraphExecHandle, DriverStatus> {
        let api = self.api;
        status(unsafe {
            (api.hip_stream_begin_capture)(stream.as_raw(), HIP_STREAM_CAPTURE_MODE_THREAD_LOCAL)
        })?;
        let launched = self.launch_kernel(function, params, stream);

        // Always end the capture, even if the launch failed, so the stream
        // leaves capture mode.
        let mut graph: ffi::HipGraph = std::ptr::null_mut();
        let ended = status(unsafe { (api.hip_stream_end_capture)(stream.as_raw(), &mut graph) });
        if let Err(e) = launched.and(ended) {
            if !graph.is_null() {
                unsafe { (api.hip_graph_destroy)(graph) };
            }
            return Err(e);
        }

        let mut node: ffi::HipGraphNode = std::ptr::null_mut();
        let mut count: usize = 1;
        let instantiated = status(unsafe { (api.hip_graph_get_nodes)(graph, &mut node, &mut count) })
            .and_then(|_| {
                let mut exec: ffi::HipGraphExec = std::ptr::null_mut();
                status(unsafe {
                    (api.hip_graph_instantiate)(
                        &mut exec,
                        graph,
                        std::ptr::null_mut(),
                        std::ptr::null_mut(),
                        0,
                    )
                })
                .map(|_| exec)
            });
        match instantiated {
            Ok(exec) => Ok(GraphExecHandle { graph, exec, node }),
            Err(e) => {
                unsafe { (api.hip_graph_destroy)(graph) };
                Err(e)
            }
        }
    }

    fn update_graph(
        &self,
        graph: &GraphExecHandle,
        function: FunctionHandle,
        params: &LaunchParams<'_>,
    ) -> std::result::Result<(), DriverStatus> {
        let mut size = params.args.len();
        let mut extra = launch_extra(params.args, &mut size);
        let node_params = HipKernelNodeParams {
            block_dim: dim3(params.block),
            extra: extra.as_mut_ptr(),
            func: function.as_raw(),
            grid_dim: dim3(params.grid),
            kernel_params: std::ptr::null_mut(),
            shared_mem_bytes: params.shared_memory_bytes as c_uint,
        };
        status(unsafe {
            (self.api.hip_graph_exec_kernel_node_set_params)(graph.exec, graph.node, &node_params)
        })
    }

    fn launch_graph(
        &self,
        graph: &GraphExecHandle,
        stream: StreamHandle,
    ) -> std::result::Result<(), DriverStatus> {
        status(unsafe { (self.api.hip_graph_launch)(graph.exec, stream.as_raw()) })
    }

    fn destroy_graph(&self, graph: GraphExecHandle) -> std::result::Result<(), DriverStatus> {
        let exec = status(unsafe { (self.api.hip_graph_exec_destroy)(graph.exec) });
        let destroyed = status(unsafe { (self.api.hip_graph_destroy)(graph.graph) });
        exec.and(destroyed)
    }
}
