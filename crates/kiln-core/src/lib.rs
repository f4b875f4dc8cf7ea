//! # kiln-core
//!
//! Addressing model shared by the kernel runtime.
//!
//! Provides:
//! - `DataType` tags for tensors and kernel scalar arguments
//! - `Dimension` / `Shape`: stride/size pairs with linear indexing,
//!   footprint sizing and canonical dimension ordering

pub mod dtype;
pub mod shape;

pub use dtype::DataType;
pub use shape::{Dimension, Shape};
