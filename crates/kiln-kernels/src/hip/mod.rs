//! HIP backend.
//!
//! Uses `libloading` for runtime-loaded HIP function pointers (no build-time
//! ROCm dependency).
//!
//! Provides:
//! - `ffi`: the subset of the HIP module, event and graph API the adapter needs
//! - `HipDriver`: the production `Driver`

pub mod driver;
pub mod ffi;

pub use driver::HipDriver;
