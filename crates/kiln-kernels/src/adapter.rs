//! The adapter: one code-object store bound to a driver, plus the launch
//! entry points (see `dispatch`).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::AdapterConfig;
use crate::driver::{Driver, FunctionHandle, StreamHandle};
use crate::embedded::embedded;
use crate::hip::HipDriver;
use crate::invocation::{KernelInvocation, LaunchEvents, LaunchOptions};
use crate::lazy::LazyLoading;
use crate::store::CodeObjectStore;
use crate::Result;

/// Load code objects and launch kernels from them.
pub trait KernelAdapter {
    fn name(&self) -> &str;

    /// Read a code-object file and load it.
    fn load_code_object_file(&self, path: &Path) -> Result<()>;

    /// Load a code object from bytes; the adapter keeps its own copy.
    fn load_code_object_bytes(&self, bytes: &[u8]) -> Result<()>;

    /// Load a resident image that lives for the rest of the program.
    fn load_code_object_image(&self, name: &str, image: &'static [u8]) -> Result<()>;

    /// Launch one kernel on the default stream.
    fn launch_kernel(&self, invocation: &KernelInvocation) -> Result<()>;

    /// Launch a batch in order on `stream`.
    fn launch_kernels(
        &self,
        invocations: &[KernelInvocation],
        stream: StreamHandle,
        events: &LaunchEvents,
    ) -> Result<()>;
}

/// Kernel adapter over a `Driver`; `HipAdapter<HipDriver>` on a device.
pub struct HipAdapter<D: Driver = HipDriver> {
    name: String,
    debug: bool,
    pub(crate) debug_skip_launch: bool,
    pub(crate) store: CodeObjectStore<D>,
}

impl HipAdapter<HipDriver> {
    /// Initialize HIP on `device` and build an adapter from `config`.
    pub fn with_hip(config: &AdapterConfig, device: i32) -> Result<Self> {
        let driver = Arc::new(HipDriver::new(device)?);
        Self::from_config(driver, config)
    }
}

impl<D: Driver> HipAdapter<D> {
    pub fn new(driver: Arc<D>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            debug: false,
            debug_skip_launch: false,
            store: CodeObjectStore::new(driver),
        }
    }

    /// Build an adapter and arm lazy loading if the config names both an
    /// architecture and a code-object directory.
    pub fn from_config(driver: Arc<D>, config: &AdapterConfig) -> Result<Self> {
        let mut adapter = Self::new(driver, config.name.clone());
        adapter.debug = config.debug;
        adapter.debug_skip_launch = config.debug_skip_launch;
        if let Some((architecture, directory)) = config.lazy_target() {
            adapter.initialize_lazy_loading(architecture, directory)?;
        }
        tracing::info!(
            "adapter {} on {} driver (debug={}, skip_launch={})",
            adapter.name,
            adapter.store.driver().name(),
            adapter.debug,
            adapter.debug_skip_launch
        );
        Ok(adapter)
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn set_debug_skip_launch(&mut self, skip: bool) {
        self.debug_skip_launch = skip;
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn driver(&self) -> &Arc<D> {
        self.store.driver()
    }

    pub fn store(&self) -> &CodeObjectStore<D> {
        &self.store
    }

    /// Load code objects on demand from `directory` for `architecture`.
    /// Fails if the directory does not exist; loads nothing up front.
    pub fn initialize_lazy_loading(&self, architecture: &str, directory: &Path) -> Result<()> {
        let lazy = LazyLoading::new(architecture, directory)?;
        self.store.arm_lazy(lazy);
        Ok(())
    }

    /// Load code objects from the process-wide embedded registry, all of them
    /// or only those registered under `key`. Returns how many were loaded.
    pub fn load_embedded_code_objects(&self, key: Option<&str>) -> Result<usize> {
        let loaded = self.store.load_embedded(embedded(), key)?;
        self.after_load();
        Ok(loaded)
    }

    /// Resolve through the store; log the debug report if that loaded a
    /// code-object file lazily.
    pub(crate) fn resolve_kernel(&self, kernel_name: &str) -> Result<FunctionHandle> {
        let (function, loaded) = self.store.resolve_lazily(kernel_name);
        if loaded.is_some() {
            self.after_load();
        }
        function
    }

    fn after_load(&self) {
        if self.debug {
            tracing::info!("{}", self);
        }
    }
}

impl<D: Driver> KernelAdapter for HipAdapter<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn load_code_object_file(&self, path: &Path) -> Result<()> {
        self.store.load_file(path)?;
        self.after_load();
        Ok(())
    }

    fn load_code_object_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.store.load_bytes(bytes)?;
        self.after_load();
        Ok(())
    }

    fn load_code_object_image(&self, name: &str, image: &'static [u8]) -> Result<()> {
        self.store.load_image(name, image)?;
        self.after_load();
        Ok(())
    }

    fn launch_kernel(&self, invocation: &KernelInvocation) -> Result<()> {
        self.launch_kernel_with(invocation, &LaunchOptions::default(), None)
    }

    fn launch_kernels(
        &self,
        invocations: &[KernelInvocation],
        stream: StreamHandle,
        events: &LaunchEvents,
    ) -> Result<()> {
        self.launch_batch(invocations, stream, events)
    }
}

/// Debug report: loaded modules, lazily loaded files, resolved kernels.
impl<D: Driver> fmt::Display for HipAdapter<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "HipAdapter {} ({} driver)",
            self.name,
            self.store.driver().name()
        )?;
        write!(f, "{}", self.store.report())
    }
}

impl<D: Driver> fmt::Debug for HipAdapter<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HipAdapter")
            .field("name", &self.name)
            .field("driver", &self.store.driver().name())
            .field("debug", &self.debug)
            .field("debug_skip_launch", &self.debug_skip_launch)
            .field("modules", &self.store.module_count())
            .field("kernels", &self.store.kernel_count())
            .finish()
    }
}
