use std::fmt;

/// Data type tags carried by shapes and kernel scalar arguments.
///
/// Tensor shapes use `None` and the four IEEE float/complex tags. Scalar
/// arguments may carry any tag; the marshaler decides which ones it accepts.
/// The derived `Ord` (declaration order) is part of the shape ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum DataType {
    /// No data attached (shape-only descriptors)
    #[default]
    None,
    /// 32-bit IEEE 754 single-precision float
    F32,
    /// 64-bit IEEE 754 double-precision float
    F64,
    /// Pair of 32-bit floats (re, im)
    ComplexF32,
    /// Pair of 64-bit floats (re, im)
    ComplexF64,
    /// 16-bit IEEE 754 half-precision float
    F16,
    /// 16-bit Brain Float
    BF16,
    /// 8-bit signed integer
    I8,
    /// 8-bit unsigned integer
    U8,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
}

impl DataType {
    /// Size in bytes of a single element, or None for `DataType::None`.
    pub fn element_size(&self) -> Option<usize> {
        match self {
            DataType::None => None,
            DataType::I8 | DataType::U8 => Some(1),
            DataType::F16 | DataType::BF16 => Some(2),
            DataType::F32 | DataType::I32 => Some(4),
            DataType::F64 | DataType::I64 | DataType::ComplexF32 => Some(8),
            DataType::ComplexF64 => Some(16),
        }
    }

    /// Whether this is one of the two complex tags.
    pub fn is_complex(&self) -> bool {
        matches!(self, DataType::ComplexF32 | DataType::ComplexF64)
    }

    /// Whether this is a real floating-point tag.
    pub fn is_float(&self) -> bool {
        matches!(
            self,
            DataType::F16 | DataType::BF16 | DataType::F32 | DataType::F64
        )
    }

    /// Whether this is an integer tag.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::I8 | DataType::U8 | DataType::I32 | DataType::I64
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::None => write!(f, "none"),
            DataType::F32 => write!(f, "f32"),
            DataType::F64 => write!(f, "f64"),
            DataType::ComplexF32 => write!(f, "c32"),
            DataType::ComplexF64 => write!(f, "c64"),
            DataType::F16 => write!(f, "f16"),
            DataType::BF16 => write!(f, "bf16"),
            DataType::I8 => write!(f, "i8"),
            DataType::U8 => write!(f, "u8"),
            DataType::I32 => write!(f, "i32"),
            DataType::I64 => write!(f, "i64"),
        }
    }
}
