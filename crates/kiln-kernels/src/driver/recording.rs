//! Device-free driver that records every call.
//!
//! A "code object" for this driver is UTF-8 text listing one exported kernel
//! name per line. Images whose first byte is `!` are rejected with
//! `INVALID_IMAGE`, which lets tests exercise driver rejection.

use std::collections::HashMap;
use std::ffi::c_void;

use parking_lot::Mutex;

use super::{
    Driver, EventHandle, FunctionHandle, GraphExecHandle, LaunchParams, ModuleHandle, StreamHandle,
};
use crate::error::DriverStatus;
use crate::invocation::Dim3;

/// One recorded driver call. Handles are reported as integers.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    LoadModule { module: usize, bytes: usize },
    UnloadModule { module: usize },
    GetFunction { name: String, found: bool },
    Launch {
        kernel: String,
        grid: Dim3,
        block: Dim3,
        shared_memory_bytes: u32,
        args: Vec<u8>,
        stream: usize,
    },
    RecordEvent { event: usize, stream: usize },
    CaptureGraph { kernel: String, graph: usize, args: Vec<u8> },
    UpdateGraph { kernel: String, graph: usize, args: Vec<u8> },
    LaunchGraph { kernel: String, graph: usize, stream: usize },
    DestroyGraph { graph: usize },
}

#[derive(Default)]
struct RecorderState {
    /// Live modules and the kernel names each exports.
    modules: HashMap<usize, Vec<String>>,
    next_module: usize,
    /// Function id → kernel name.
    functions: HashMap<usize, String>,
    function_ids: HashMap<(usize, String), usize>,
    /// Graph id → kernel name.
    graphs: HashMap<usize, String>,
    next_graph: usize,
    launch_failures: HashMap<String, DriverStatus>,
    calls: Vec<DriverCall>,
}

/// A `Driver` that never touches a device.
#[derive(Default)]
pub struct RecordingDriver {
    state: Mutex<RecorderState>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an image understood by this driver.
    pub fn code_object(kernels: &[&str]) -> Vec<u8> {
        kernels.join("\n").into_bytes()
    }

    /// Make every launch of `kernel` fail with `status`.
    pub fn fail_launches_of(&self, kernel: &str, status: DriverStatus) {
        self.state
            .lock()
            .launch_failures
            .insert(kernel.to_string(), status);
    }

    /// Snapshot of all calls so far, in order.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of `load_module` calls that produced a module.
    pub fn module_loads(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, DriverCall::LoadModule { .. }))
            .count()
    }

    /// Modules loaded and not yet unloaded.
    pub fn live_modules(&self) -> usize {
        self.state.lock().modules.len()
    }

    /// Names of kernels submitted directly or through a graph, in order.
    pub fn launched_kernels(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                DriverCall::Launch { kernel, .. } | DriverCall::LaunchGraph { kernel, .. } => {
                    Some(kernel.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn kernel_of(state: &RecorderState, function: FunctionHandle) -> Result<String, DriverStatus> {
        state
            .functions
            .get(&(function.as_raw() as usize))
            .cloned()
            .ok_or(DriverStatus::INVALID_VALUE)
    }
}

impl Driver for RecordingDriver {
    fn name(&self) -> &str {
        "recording"
    }

    unsafe fn load_module(&self, image: &[u8]) -> Result<ModuleHandle, DriverStatus> {
        if image.first() == Some(&b'!') {
            return Err(DriverStatus::INVALID_IMAGE);
        }
        let text = std::str::from_utf8(image).map_err(|_| DriverStatus::INVALID_IMAGE)?;
        let kernels = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();

        let mut state = self.state.lock();
        state.next_module += 1;
        let id = state.next_module;
        state.modules.insert(id, kernels);
        state.calls.push(DriverCall::LoadModule {
            module: id,
            bytes: image.len(),
        });
        Ok(ModuleHandle::from_raw(id as *mut c_void))
    }

    fn unload_module(&self, module: ModuleHandle) -> Result<(), DriverStatus> {
        let id = module.as_raw() as usize;
        let mut state = self.state.lock();
        state
            .modules
            .remove(&id)
            .ok_or(DriverStatus::INVALID_VALUE)?;
        state.calls.push(DriverCall::UnloadModule { module: id });
        Ok(())
    }

    fn get_function(
        &self,
        module: ModuleHandle,
        name: &str,
    ) -> Result<Option<FunctionHandle>, DriverStatus> {
        let module_id = module.as_raw() as usize;
        let mut state = self.state.lock();
        let exported = state
            .modules
            .get(&module_id)
            .ok_or(DriverStatus::INVALID_VALUE)?
            .iter()
            .any(|k| k == name);
        state.calls.push(DriverCall::GetFunction {
            name: name.to_string(),
            found: exported,
        });
        if !exported {
            return Ok(None);
        }

        let key = (module_id, name.to_string());
        let id = match state.function_ids.get(&key) {
            Some(&id) => id,
            None => {
                // Function ids share no space with module ids; offset them.
                let id = 0x1_0000 + state.function_ids.len() + 1;
                state.function_ids.insert(key, id);
                state.functions.insert(id, name.to_string());
                id
            }
        };
        Ok(Some(FunctionHandle::from_raw(id as *mut c_void)))
    }

    fn launch_kernel(
        &self,
        function: FunctionHandle,
        params: &LaunchParams<'_>,
        stream: StreamHandle,
    ) -> Result<(), DriverStatus> {
        let mut state = self.state.lock();
        let kernel = Self::kernel_of(&state, function)?;
        state.calls.push(DriverCall::Launch {
            kernel: kernel.clone(),
            grid: params.grid,
            block: params.block,
            shared_memory_bytes: params.shared_memory_bytes,
            args: params.args.to_vec(),
            stream: stream.as_raw() as usize,
        });
        match state.launch_failures.get(&kernel) {
            Some(&status) => Err(status),
            None => Ok(()),
        }
    }

    fn record_event(&self, event: EventHandle, stream: StreamHandle) -> Result<(), DriverStatus> {
        if event.is_null() {
            return Err(DriverStatus::INVALID_VALUE);
        }
        self.state.lock().calls.push(DriverCall::RecordEvent {
            event: event.as_raw() as usize,
            stream: stream.as_raw() as usize,
        });
        Ok(())
    }

    fn capture_graph(
        &self,
        function: FunctionHandle,
        params: &LaunchParams<'_>,
        _stream: StreamHandle,
    ) -> Result<GraphExecHandle, DriverStatus> {
        let mut state = self.state.lock();
        let kernel = Self::kernel_of(&state, function)?;
        state.next_graph += 1;
        let id = state.next_graph;
        state.graphs.insert(id, kernel.clone());
        state.calls.push(DriverCall::CaptureGraph {
            kernel,
            graph: id,
            args: params.args.to_vec(),
        });
        Ok(GraphExecHandle {
            graph: id as *mut c_void,
            exec: id as *mut c_void,
            node: id as *mut c_void,
        })
    }

    fn update_graph(
        &self,
        graph: &GraphExecHandle,
        function: FunctionHandle,
        params: &LaunchParams<'_>,
    ) -> Result<(), DriverStatus> {
        let id = graph.exec as usize;
        let mut state = self.state.lock();
        if !state.graphs.contains_key(&id) {
            return Err(DriverStatus::INVALID_VALUE);
        }
        let kernel = Self::kernel_of(&state, function)?;
        state.calls.push(DriverCall::UpdateGraph {
            kernel,
            graph: id,
            args: params.args.to_vec(),
        });
        Ok(())
    }

    fn launch_graph(&self, graph: &GraphExecHandle, stream: StreamHandle) -> Result<(), DriverStatus> {
        let id = graph.exec as usize;
        let mut state = self.state.lock();
        let kernel = state
            .graphs
            .get(&id)
            .cloned()
            .ok_or(DriverStatus::INVALID_VALUE)?;
        state.calls.push(DriverCall::LaunchGraph {
            kernel: kernel.clone(),
            graph: id,
            stream: stream.as_raw() as usize,
        });
        match state.launch_failures.get(&kernel) {
            Some(&status) => Err(status),
            None => Ok(()),
        }
    }

    fn destroy_graph(&self, graph: GraphExecHandle) -> Result<(), DriverStatus> {
        let id = graph.exec as usize;
        let mut state = self.state.lock();
        state
            .graphs
            .remove(&id)
            .ok_or(DriverStatus::INVALID_VALUE)?;
        state.calls.push(DriverCall::DestroyGraph { graph: id });
        Ok(())
    }
}
