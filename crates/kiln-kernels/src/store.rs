//! Loaded code objects and the kernel-handle cache.
//!
//! The module list, the name → handle cache, the loaded-file set and the
//! lazy-loading configuration sit behind one mutex so a load and the cache
//! update that follows it can never interleave with another thread's.
//! The lock is held for one load or lookup and never across a launch.
//!
//! Modules are append-only: they are unloaded together when the store is
//! dropped, never one at a time, so a cached handle stays valid for the
//! store's whole lifetime.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::driver::{Driver, FunctionHandle, ModuleHandle};
use crate::embedded::EmbeddedCodeObjects;
use crate::error::KernelError;
use crate::lazy::LazyLoading;
use crate::Result;

struct LoadedModule {
    handle: ModuleHandle,
    name: String,
    /// Bytes the driver reads from; the driver does not copy them.
    _backing: Option<Box<[u8]>>,
}

#[derive(Default)]
struct StoreState {
    modules: Vec<LoadedModule>,
    kernels: HashMap<String, FunctionHandle>,
    loaded_files: HashSet<String>,
    lazy: Option<LazyLoading>,
}

/// Owner of every module loaded through one adapter.
pub struct CodeObjectStore<D: Driver> {
    driver: Arc<D>,
    state: Mutex<StoreState>,
}

impl<D: Driver> CodeObjectStore<D> {
    pub fn new(driver: Arc<D>) -> Self {
        Self {
            driver,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    /// Read a code-object file and load it.
    pub fn load_file(&self, path: &Path) -> Result<()> {
        let mut state = self.state.lock();
        Self::load_file_locked(&self.driver, &mut state, path)
    }

    /// Load a code object from a caller buffer. The store keeps its own copy.
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<()> {
        let name = format!("<{} bytes>", bytes.len());
        let mut state = self.state.lock();
        Self::load_owned(&self.driver, &mut state, name, Box::from(bytes))
    }

    /// Load a resident image without copying it.
    pub fn load_image(&self, name: &str, image: &'static [u8]) -> Result<()> {
        let mut state = self.state.lock();
        Self::load_static(&self.driver, &mut state, name.to_string(), image)
    }

    /// Load every embedded code object, or only those under `key`.
    /// Returns how many modules were loaded; stops at the first failure.
    pub fn load_embedded(&self, registry: &EmbeddedCodeObjects, key: Option<&str>) -> Result<usize> {
        let selected = registry.select(key);
        let mut state = self.state.lock();
        for (i, (key, image)) in selected.iter().enumerate() {
            Self::load_static(&self.driver, &mut state, format!("embedded:{key}#{i}"), image)?;
        }
        Ok(selected.len())
    }

    /// Arm lazy loading. Replaces any previous configuration; already loaded
    /// modules and cached handles are kept.
    pub fn arm_lazy(&self, lazy: LazyLoading) {
        tracing::info!(
            "lazy loading armed for {} from {}",
            lazy.architecture(),
            lazy.directory().display()
        );
        self.state.lock().lazy = Some(lazy);
    }

    pub fn lazy(&self) -> Option<LazyLoading> {
        self.state.lock().lazy.clone()
    }

    pub fn is_lazy_loading(&self) -> bool {
        self.state.lock().lazy.is_some()
    }

    /// Resolve a kernel handle by name.
    ///
    /// Cache hit → cached handle. Miss → search loaded modules in load order.
    /// Still missing and lazy loading armed → load the kernel's code-object
    /// file (unless already loaded) and search once more.
    pub fn resolve(&self, name: &str) -> Result<FunctionHandle> {
        self.resolve_lazily(name).0
    }

    /// `resolve`, plus the identifier of the code-object file this call
    /// loaded lazily, if any. A file can be loaded even when the kernel is
    /// then still not found.
    pub fn resolve_lazily(&self, name: &str) -> (Result<FunctionHandle>, Option<String>) {
        let mut loaded = None;
        let result = self.resolve_locked(name, &mut loaded);
        (result, loaded)
    }

    fn resolve_locked(&self, name: &str, loaded: &mut Option<String>) -> Result<FunctionHandle> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(&function) = state.kernels.get(name) {
            return Ok(function);
        }
        if let Some(function) = Self::find_in_modules(&self.driver, state, name)? {
            return Ok(function);
        }

        let located = state.lazy.as_ref().and_then(|lazy| lazy.locate(name));
        if let Some((file_id, path)) = located {
            if !state.loaded_files.contains(&file_id) {
                tracing::debug!("lazy loading {} for kernel {}", file_id, name);
                Self::load_file_locked(&self.driver, state, &path)?;
                state.loaded_files.insert(file_id.clone());
                *loaded = Some(file_id);
                if let Some(function) = Self::find_in_modules(&self.driver, state, name)? {
                    return Ok(function);
                }
            }
        }

        Err(KernelError::KernelNotFound(name.to_string()))
    }

    fn find_in_modules(
        driver: &D,
        state: &mut StoreState,
        name: &str,
    ) -> Result<Option<FunctionHandle>> {
        for module in &state.modules {
            let found = driver
                .get_function(module.handle, name)
                .map_err(|status| KernelError::Driver {
                    status,
                    context: format!("hipModuleGetFunction({name})"),
                })?;
            if let Some(function) = found {
                tracing::debug!("resolved kernel {} in {}", name, module.name);
                state.kernels.insert(name.to_string(), function);
                return Ok(Some(function));
            }
        }
        Ok(None)
    }

    fn load_file_locked(driver: &D, state: &mut StoreState, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path).map_err(|source| KernelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::load_owned(driver, state, path.display().to_string(), bytes.into_boxed_slice())
    }

    fn load_owned(driver: &D, state: &mut StoreState, name: String, bytes: Box<[u8]>) -> Result<()> {
        // Safety: `bytes` moves into the module entry below (the heap block
        // does not move) and is freed only after the module is unloaded.
        let handle = unsafe { driver.load_module(&bytes) }.map_err(|status| KernelError::ModuleLoad {
            module: name.clone(),
            status,
        })?;
        tracing::info!("loaded code object {} ({} bytes)", name, bytes.len());
        state.modules.push(LoadedModule {
            handle,
            name,
            _backing: Some(bytes),
        });
        Ok(())
    }

    fn load_static(
        driver: &D,
        state: &mut StoreState,
        name: String,
        image: &'static [u8],
    ) -> Result<()> {
        // Safety: a 'static image outlives every module.
        let handle = unsafe { driver.load_module(image) }.map_err(|status| KernelError::ModuleLoad {
            module: name.clone(),
            status,
        })?;
        tracing::info!("loaded code object {} ({} bytes, resident)", name, image.len());
        state.modules.push(LoadedModule {
            handle,
            name,
            _backing: None,
        });
        Ok(())
    }

    pub fn module_count(&self) -> usize {
        self.state.lock().modules.len()
    }

    pub fn kernel_count(&self) -> usize {
        self.state.lock().kernels.len()
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.state.lock().kernels.contains_key(name)
    }

    /// Module identifiers in load order.
    pub fn module_names(&self) -> Vec<String> {
        self.state.lock().modules.iter().map(|m| m.name.clone()).collect()
    }

    /// Lazily loaded file identifiers, sorted.
    pub fn loaded_files(&self) -> Vec<String> {
        let mut files: Vec<_> = self.state.lock().loaded_files.iter().cloned().collect();
        files.sort();
        files
    }

    /// Resolved kernel names, sorted.
    pub fn kernel_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state.lock().kernels.keys().cloned().collect();
        names.sort();
        names
    }

    /// Consistent snapshot of the store for debug output.
    pub fn report(&self) -> StoreReport {
        let state = self.state.lock();
        let mut files: Vec<_> = state.loaded_files.iter().cloned().collect();
        files.sort();
        let mut kernels: Vec<_> = state.kernels.keys().cloned().collect();
        kernels.sort();
        StoreReport {
            modules: state.modules.iter().map(|m| m.name.clone()).collect(),
            files,
            kernels,
            lazy: state.lazy.clone(),
        }
    }
}

impl<D: Driver> Drop for CodeObjectStore<D> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.kernels.clear();
        for module in state.modules.drain(..) {
            if let Err(status) = self.driver.unload_module(module.handle) {
                tracing::warn!("failed to unload {}: HIP error {}", module.name, status);
            }
        }
    }
}

/// Snapshot of what a store has loaded and resolved.
#[derive(Debug, Clone)]
pub struct StoreReport {
    pub modules: Vec<String>,
    pub files: Vec<String>,
    pub kernels: Vec<String>,
    pub lazy: Option<LazyLoading>,
}

impl fmt::Display for StoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} code object modules:", self.modules.len())?;
        for m in &self.modules {
            writeln!(f, "  module {m}")?;
        }
        if let Some(lazy) = &self.lazy {
            writeln!(
                f,
                "lazy loading {} from {}",
                lazy.architecture(),
                lazy.directory().display()
            )?;
        }
        writeln!(f, "{} code object files loaded:", self.files.len())?;
        for file in &self.files {
            writeln!(f, "  file {file}")?;
        }
        write!(f, "{} kernels resolved", self.kernels.len())?;
        for k in &self.kernels {
            write!(f, "\n  kernel {k}")?;
        }
        Ok(())
    }
}
