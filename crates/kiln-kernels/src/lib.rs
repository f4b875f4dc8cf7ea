//! # kiln-kernels
//!
//! Code-object lifecycle and kernel dispatch over HIP.
//!
//! Provides:
//! - A per-adapter store of loaded code objects and a name → kernel cache
//! - Lazy, architecture-scoped loading of code objects on first use
//! - Validated, asynchronous kernel launches, singly or in batches
//! - Reusable launch graphs with re-marshaled "alpha"/"beta" scalars
//! - A `Driver` seam: `HipDriver` (dlopen'd HIP runtime) and `RecordingDriver`

pub mod adapter;
pub mod args;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod embedded;
pub mod error;
pub mod hip;
pub mod invocation;
pub mod lazy;
pub mod marshal;
pub mod store;

pub use adapter::{HipAdapter, KernelAdapter};
pub use args::KernelArguments;
pub use config::AdapterConfig;
pub use driver::{
    Driver, DriverCall, EventHandle, FunctionHandle, ModuleHandle, RecordingDriver, StreamHandle,
};
pub use embedded::{embedded, register_embedded, EmbeddedCodeObjects};
pub use error::{DriverStatus, KernelError};
pub use hip::HipDriver;
pub use invocation::{Dim3, GraphInvocation, KernelInvocation, LaunchEvents, LaunchOptions};
pub use lazy::LazyLoading;
pub use marshal::ScalarSlot;
pub use store::CodeObjectStore;

pub use kiln_core::{DataType, Dimension, Shape};

pub type Result<T> = std::result::Result<T, KernelError>;
