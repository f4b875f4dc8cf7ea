use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

use crate::dtype::DataType;

/// One addressed dimension: an extent and the element stride between
/// consecutive indices along it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Dimension {
    pub size: usize,
    pub stride: usize,
}

impl Dimension {
    pub fn new(size: usize, stride: usize) -> Self {
        Self { size, stride }
    }
}

/// Canonical order: larger stride first, then larger size first.
impl Ord for Dimension {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .stride
            .cmp(&self.stride)
            .then_with(|| other.size.cmp(&self.size))
    }
}

impl PartialOrd for Dimension {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Stride/size shape of a device tensor.
///
/// Dimension 0 is the fastest-varying one when printed, but strides are
/// free-form: they need not be contiguous, sorted, or even non-overlapping.
/// Stack-allocated for up to 4 dimensions, which covers most GEMM-style
/// problems (batched matrices).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dtype: DataType,
    dims: SmallVec<[Dimension; 4]>,
}

impl Shape {
    /// Create a shape from explicit dimensions.
    pub fn new(dtype: DataType, dims: &[Dimension]) -> Self {
        Self {
            dtype,
            dims: SmallVec::from_slice(dims),
        }
    }

    /// Packed layout where dimension 0 has stride 1 and every following
    /// stride is the product of the faster sizes.
    ///
    /// # Panics
    /// If a stride that is actually stored does not fit in `usize`.
    pub fn contiguous(dtype: DataType, sizes: &[usize]) -> Self {
        let mut dims = SmallVec::with_capacity(sizes.len());
        let mut stride = 1usize;
        for (i, &size) in sizes.iter().enumerate() {
            dims.push(Dimension { size, stride });
            if i + 1 < sizes.len() {
                stride = stride.checked_mul(size).unwrap_or_else(|| {
                    panic!("contiguous: stride of dimension {} overflows usize", i + 1)
                });
            }
        }
        Self { dtype, dims }
    }

    /// Rank-0 shape.
    pub fn scalar(dtype: DataType) -> Self {
        Self {
            dtype,
            dims: SmallVec::new(),
        }
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn dim(&self, axis: usize) -> Option<Dimension> {
        self.dims.get(axis).copied()
    }

    /// Offset of an element: `Σ coords[i] * stride[i]`.
    ///
    /// Coordinates are not checked against the sizes. Extra trailing
    /// coordinates are ignored.
    ///
    /// # Panics
    /// If `coords` is shorter than the rank.
    pub fn linear_index(&self, coords: &[usize]) -> usize {
        assert!(
            coords.len() >= self.ndim(),
            "linear_index: {} coordinates for a rank-{} shape",
            coords.len(),
            self.ndim()
        );
        self.dims
            .iter()
            .zip(coords)
            .map(|(d, &c)| c * d.stride)
            .sum()
    }

    /// Upper bound on addressed storage in elements: `max(size[i] * stride[i])`.
    ///
    /// This equals `element_count()` for packed layouts and overshoots by
    /// the padding for padded ones. It is not the product of sizes.
    /// Saturates at `usize::MAX`.
    pub fn footprint(&self) -> usize {
        self.dims
            .iter()
            .map(|d| d.size.saturating_mul(d.stride))
            .max()
            .unwrap_or(0)
    }

    /// `footprint()` in bytes for this shape's data type (0 for `None`).
    pub fn footprint_bytes(&self) -> usize {
        self.footprint()
            .saturating_mul(self.dtype.element_size().unwrap_or(0))
    }

    /// Number of logical elements (product of sizes, 1 for rank 0).
    pub fn element_count(&self) -> usize {
        self.dims.iter().map(|d| d.size).product()
    }

    /// Permutation `P` mapping each original dimension index to its position
    /// in canonical order, i.e. `sorted[P[i]] == dims[i]`.
    ///
    /// Equal dimensions keep their relative order and get distinct positions,
    /// so `P` is always a true permutation and parallel per-dimension data
    /// can be remapped with it.
    pub fn canonical_order(&self) -> Vec<usize> {
        let mut by_rank: Vec<usize> = (0..self.ndim()).collect();
        by_rank.sort_by(|&a, &b| self.dims[a].cmp(&self.dims[b]));

        let mut order = vec![0usize; self.ndim()];
        for (position, &original) in by_rank.iter().enumerate() {
            order[original] = position;
        }
        order
    }

    /// Apply a permutation from `canonical_order`: dimension `i` moves to
    /// position `order[i]`.
    ///
    /// # Panics
    /// If `order` is not a permutation of `0..ndim`.
    pub fn permuted(&self, order: &[usize]) -> Shape {
        assert_eq!(
            order.len(),
            self.ndim(),
            "permuted: order has {} entries for a rank-{} shape",
            order.len(),
            self.ndim()
        );
        let mut dims: SmallVec<[Option<Dimension>; 4]> = SmallVec::from_elem(None, self.ndim());
        for (i, &to) in order.iter().enumerate() {
            assert!(
                to < self.ndim() && dims[to].is_none(),
                "permuted: {order:?} is not a permutation"
            );
            dims[to] = Some(self.dims[i]);
        }
        Shape {
            dtype: self.dtype,
            dims: dims.into_iter().flatten().collect(),
        }
    }

    /// Sort dimensions into canonical order in place and return the
    /// permutation that was applied (see `canonical_order`).
    pub fn sort_dimensions(&mut self) -> Vec<usize> {
        let order = self.canonical_order();
        *self = self.permuted(&order);
        order
    }
}

/// Structural order used to deduplicate shapes: data type, then rank, then
/// dimensions element-wise.
impl Ord for Shape {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dtype
            .cmp(&other.dtype)
            .then_with(|| self.ndim().cmp(&other.ndim()))
            .then_with(|| self.dims.iter().cmp(other.dims.iter()))
    }
}

impl PartialOrd for Shape {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({self})")
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.dtype)?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}x{}", d.size, d.stride)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(pairs: &[(usize, usize)]) -> Vec<Dimension> {
        pairs.iter().map(|&(s, st)| Dimension::new(s, st)).collect()
    }

    #[test]
    fn test_linear_index() {
        let s = Shape::new(DataType::F32, &dims(&[(4, 1), (3, 8), (2, 32)]));
        assert_eq!(s.linear_index(&[0, 0, 0]), 0);
        assert_eq!(s.linear_index(&[3, 0, 0]), 3);
        assert_eq!(s.linear_index(&[1, 2, 1]), 1 + 16 + 32);
        // trailing coordinates beyond the rank are ignored
        assert_eq!(s.linear_index(&[1, 2, 1, 99]), 49);
    }

    #[test]
    fn test_linear_index_matches_formula() {
        let s = Shape::new(DataType::F64, &dims(&[(5, 3), (7, 1), (2, 100)]));
        for a in 0..5 {
            for b in 0..7 {
                for c in 0..2 {
                    assert_eq!(s.linear_index(&[a, b, c]), a * 3 + b + c * 100);
                }
            }
        }
    }

    #[test]
    #[should_panic(expected = "linear_index")]
    fn test_linear_index_short_coords() {
        let s = Shape::contiguous(DataType::F32, &[2, 2]);
        s.linear_index(&[1]);
    }

    #[test]
    fn test_footprint_contiguous_equals_count() {
        let s = Shape::contiguous(DataType::F32, &[4, 3, 2]);
        assert_eq!(s.dims()[1].stride, 4);
        assert_eq!(s.dims()[2].stride, 12);
        assert_eq!(s.footprint(), 24);
        assert_eq!(s.element_count(), 24);
        assert_eq!(s.footprint_bytes(), 96);
    }

    #[test]
    fn test_footprint_padded_leading_dimension() {
        // 4x3 matrix with a leading dimension of 6: two padding elements per column
        let s = Shape::new(DataType::F32, &dims(&[(4, 1), (3, 6)]));
        assert_eq!(s.element_count(), 12);
        assert_eq!(s.footprint(), 18);
    }

    #[test]
    fn test_footprint_is_max_not_product() {
        let s = Shape::new(DataType::None, &dims(&[(10, 1), (2, 1)]));
        assert_eq!(s.footprint(), 10);
        assert_eq!(s.footprint_bytes(), 0);
        assert_eq!(Shape::scalar(DataType::F32).footprint(), 0);
    }

    #[test]
    fn test_contiguous_huge_last_dimension() {
        let s = Shape::contiguous(DataType::F32, &[2, usize::MAX]);
        assert_eq!(s.dims()[1].stride, 2);
        assert_eq!(s.footprint(), usize::MAX);
        assert_eq!(s.footprint_bytes(), usize::MAX);
    }

    #[test]
    #[should_panic(expected = "overflows usize")]
    fn test_contiguous_stride_overflow() {
        Shape::contiguous(DataType::F32, &[usize::MAX, 2, 2]);
    }

    #[test]
    fn test_dimension_order() {
        let big_stride = Dimension::new(2, 64);
        let small_stride = Dimension::new(64, 1);
        assert!(big_stride < small_stride);
        // equal strides fall back to size, larger first
        assert!(Dimension::new(8, 4) < Dimension::new(2, 4));
    }

    #[test]
    fn test_canonical_order_is_permutation() {
        let s = Shape::new(DataType::F32, &dims(&[(4, 1), (3, 32), (2, 4)]));
        let order = s.canonical_order();
        assert_eq!(order, vec![2, 0, 1]);

        let sorted = s.permuted(&order);
        for (i, d) in s.dims().iter().enumerate() {
            assert_eq!(sorted.dims()[order[i]], *d);
        }
        assert!(sorted.dims().windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_canonical_order_of_sorted_is_identity() {
        let s = Shape::new(DataType::F32, &dims(&[(3, 32), (2, 4), (4, 1)]));
        assert_eq!(s.canonical_order(), vec![0, 1, 2]);
    }

    #[test]
    fn test_canonical_order_duplicates() {
        let s = Shape::new(DataType::F32, &dims(&[(2, 2), (2, 2), (5, 9)]));
        assert_eq!(s.canonical_order(), vec![1, 2, 0]);
    }

    #[test]
    fn test_sort_dimensions() {
        let mut s = Shape::new(DataType::F64, &dims(&[(4, 1), (3, 32), (2, 4)]));
        let order = s.sort_dimensions();
        assert_eq!(order, vec![2, 0, 1]);
        assert_eq!(s.dims(), dims(&[(3, 32), (2, 4), (4, 1)]).as_slice());
        assert_eq!(s.dtype(), DataType::F64);
    }

    #[test]
    fn test_shape_order() {
        let a = Shape::contiguous(DataType::F32, &[4, 4]);
        let b = Shape::contiguous(DataType::F64, &[2]);
        assert!(a < b, "data type dominates");

        let c = Shape::contiguous(DataType::F32, &[4, 4, 1]);
        assert!(a < c, "rank breaks data type ties");

        let d = Shape::new(DataType::F32, &dims(&[(4, 1), (4, 2)]));
        assert_eq!(a.cmp(&d), a.dims()[1].cmp(&d.dims()[1]));
        assert_eq!(a.cmp(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_display() {
        let s = Shape::contiguous(DataType::F32, &[4, 3]);
        assert_eq!(format!("{s}"), "f32[4x1, 3x4]");
        assert_eq!(format!("{:?}", Shape::scalar(DataType::None)), "Shape(none[])");
    }
}
