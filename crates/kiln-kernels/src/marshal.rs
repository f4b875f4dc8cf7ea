//! Scalar argument marshaling for graph invocations.
//!
//! Before a captured graph is (re-)executed, its "alpha" and "beta" scalars
//! are rewritten into the graph's argument buffer so that new values take
//! effect without recapturing. The stored representation depends only on the
//! declared type tag:
//!
//! | tag          | read as         | stored as                          |
//! |--------------|-----------------|------------------------------------|
//! | F32, BF16    | f32             | f32                                |
//! | F64          | f64             | f64                                |
//! | ComplexF32   | Complex<f32>    | Complex<f32>                       |
//! | ComplexF64   | Complex<f64>    | Complex<f64>                       |
//! | I32          | i32             | f32                                |
//! | F16          | f32             | f32, plus `<name>_2` for non-source kernels |

use std::mem::size_of;

use bytemuck::Pod;
use kiln_core::DataType;
use num_complex::Complex;

use crate::args::KernelArguments;
use crate::error::KernelError;
use crate::invocation::GraphInvocation;
use crate::Result;

pub const ALPHA: &str = "alpha";
pub const BETA: &str = "beta";

const RAW_BYTES: usize = 16;

/// A scalar value together with the tag it was declared with.
///
/// The value is kept as raw bytes and reinterpreted by the marshaler
/// according to the tag, so a slot can hold any scalar up to 16 bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ScalarSlot {
    pub dtype: DataType,
    raw: [u8; RAW_BYTES],
}

impl ScalarSlot {
    /// # Panics
    /// If `T` is larger than 16 bytes.
    pub fn new<T: Pod>(dtype: DataType, value: T) -> Self {
        let bytes = bytemuck::bytes_of(&value);
        assert!(
            bytes.len() <= RAW_BYTES,
            "ScalarSlot holds at most {RAW_BYTES} bytes, got {}",
            bytes.len()
        );
        let mut raw = [0u8; RAW_BYTES];
        raw[..bytes.len()].copy_from_slice(bytes);
        Self { dtype, raw }
    }

    /// Reinterpret the leading bytes as `T`.
    pub fn read<T: Pod>(&self) -> T {
        bytemuck::pod_read_unaligned(&self.raw[..size_of::<T>()])
    }
}

impl std::fmt::Debug for ScalarSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScalarSlot({}, {:02x?})", self.dtype, &self.raw[..])
    }
}

/// Write one named scalar into `args` according to its tag.
///
/// Unsupported tags fail with `ArgumentType`; this is a configuration fault,
/// not something a retry can fix.
pub fn marshal_scalar(
    args: &mut KernelArguments,
    name: &str,
    slot: &ScalarSlot,
    is_source_kernel: bool,
) -> Result<()> {
    match slot.dtype {
        DataType::F32 | DataType::BF16 => args.update_value(name, slot.read::<f32>()),
        DataType::F64 => args.update_value(name, slot.read::<f64>()),
        DataType::ComplexF32 => args.update_value(name, slot.read::<Complex<f32>>()),
        DataType::ComplexF64 => args.update_value(name, slot.read::<Complex<f64>>()),
        DataType::I32 => args.update_value(name, slot.read::<i32>() as f32),
        DataType::F16 => {
            let value = slot.read::<f32>();
            args.update_value(name, value)?;
            if !is_source_kernel {
                args.update_value(&format!("{name}_2"), value)?;
            }
            Ok(())
        }
        _ => Err(KernelError::ArgumentType(name.to_string())),
    }
}

/// Refresh "alpha" then "beta" in a graph invocation's argument buffer.
///
/// Both scalars are written to a staged copy first; on error the buffer is
/// left as it was.
pub fn update_graph_scalars(graph: &mut GraphInvocation) -> Result<()> {
    let is_source_kernel = graph.is_source_kernel;
    let (alpha, beta) = (graph.alpha, graph.beta);
    let args = graph
        .kernel_args
        .as_deref_mut()
        .ok_or(KernelError::ArgumentsReleased)?;
    let mut staged = args.clone();
    marshal_scalar(&mut staged, ALPHA, &alpha, is_source_kernel)?;
    marshal_scalar(&mut staged, BETA, &beta, is_source_kernel)?;
    *args = staged;
    Ok(())
}
