//! Coordinate scalar kinds and type-erased coordinate storage.
//!
//! Coordinate buffers (domains, query ranges, MBRs, bounding coordinates)
//! are stored type-erased in `CoordValues` and viewed through the
//! `Coordinate` trait. A read call dispatches on the schema's scalar kind
//! once, obtains typed slices, and stays typed for the rest of the call.
//! Dense tile-grid arithmetic is integer-only and lives on the `GridCoord`
//! subtrait.

use std::cmp::Ordering;
use std::fmt;

/// Scalar kind of array coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CoordType {
    Int32,
    Int64,
    Float32,
    Float64,
}

impl CoordType {
    /// Byte width of one scalar of this kind.
    pub fn size(&self) -> usize {
        match self {
            CoordType::Int32 | CoordType::Float32 => 4,
            CoordType::Int64 | CoordType::Float64 => 8,
        }
    }

    /// Whether this kind supports dense tile-grid arithmetic.
    pub fn is_integer(&self) -> bool {
        matches!(self, CoordType::Int32 | CoordType::Int64)
    }
}

impl fmt::Display for CoordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoordType::Int32 => "int32",
            CoordType::Int64 => "int64",
            CoordType::Float32 => "float32",
            CoordType::Float64 => "float64",
        };
        write!(f, "{}", name)
    }
}

/// Owned, type-erased coordinate vector.
#[derive(Clone, Debug, PartialEq)]
pub enum CoordValues {
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl CoordValues {
    pub fn coord_type(&self) -> CoordType {
        match self {
            CoordValues::Int32(_) => CoordType::Int32,
            CoordValues::Int64(_) => CoordType::Int64,
            CoordValues::Float32(_) => CoordType::Float32,
            CoordValues::Float64(_) => CoordType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CoordValues::Int32(v) => v.len(),
            CoordValues::Int64(v) => v.len(),
            CoordValues::Float32(v) => v.len(),
            CoordValues::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An empty vector of the given kind.
    pub fn empty(kind: CoordType) -> Self {
        match kind {
            CoordType::Int32 => CoordValues::Int32(Vec::new()),
            CoordType::Int64 => CoordValues::Int64(Vec::new()),
            CoordType::Float32 => CoordValues::Float32(Vec::new()),
            CoordType::Float64 => CoordValues::Float64(Vec::new()),
        }
    }
}

/// A coordinate scalar. Implemented for `i32`, `i64`, `f32`, `f64`.
///
/// `total_cmp` gives the strict total order every comparator and binary
/// search in the engine relies on; floats use the IEEE total ordering.
pub trait Coordinate: Copy + PartialEq + fmt::Debug + 'static {
    const KIND: CoordType;
    const SIZE: usize;

    /// Typed view over erased storage; `None` on kind mismatch.
    fn values_of(values: &CoordValues) -> Option<&[Self]>;

    /// Erase a typed vector.
    fn erase(values: Vec<Self>) -> CoordValues;

    /// Decode one scalar from `SIZE` little-endian bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Strict total order.
    fn total_cmp(self, other: Self) -> Ordering;

    /// Offset-normalized unsigned value for Hilbert indexing, or `None`
    /// when the scalar kind has no Hilbert embedding (floats).
    fn hilbert_bits(self, origin: Self) -> Option<u64>;
}

/// Integer coordinate scalar, required for dense tile-grid arithmetic.
pub trait GridCoord: Coordinate {
    fn as_i64(self) -> i64;
}

impl Coordinate for i32 {
    const KIND: CoordType = CoordType::Int32;
    const SIZE: usize = 4;

    fn values_of(values: &CoordValues) -> Option<&[Self]> {
        match values {
            CoordValues::Int32(v) => Some(v),
            _ => None,
        }
    }

    fn erase(values: Vec<Self>) -> CoordValues {
        CoordValues::Int32(values)
    }

    fn read_le(bytes: &[u8]) -> Self {
        i32::from_le_bytes(bytes[..4].try_into().expect("4 coordinate bytes"))
    }

    fn total_cmp(self, other: Self) -> Ordering {
        self.cmp(&other)
    }

    fn hilbert_bits(self, origin: Self) -> Option<u64> {
        Some((self as i64 - origin as i64) as u64)
    }
}

impl Coordinate for i64 {
    const KIND: CoordType = CoordType::Int64;
    const SIZE: usize = 8;

    fn values_of(values: &CoordValues) -> Option<&[Self]> {
        match values {
            CoordValues::Int64(v) => Some(v),
            _ => None,
        }
    }

    fn erase(values: Vec<Self>) -> CoordValues {
        CoordValues::Int64(values)
    }

    fn read_le(bytes: &[u8]) -> Self {
        i64::from_le_bytes(bytes[..8].try_into().expect("8 coordinate bytes"))
    }

    fn total_cmp(self, other: Self) -> Ordering {
        self.cmp(&other)
    }

    fn hilbert_bits(self, origin: Self) -> Option<u64> {
        Some(self.wrapping_sub(origin) as u64)
    }
}

impl Coordinate for f32 {
    const KIND: CoordType = CoordType::Float32;
    const SIZE: usize = 4;

    fn values_of(values: &CoordValues) -> Option<&[Self]> {
        match values {
            CoordValues::Float32(v) => Some(v),
            _ => None,
        }
    }

    fn erase(values: Vec<Self>) -> CoordValues {
        CoordValues::Float32(values)
    }

    fn read_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes(bytes[..4].try_into().expect("4 coordinate bytes"))
    }

    fn total_cmp(self, other: Self) -> Ordering {
        f32::total_cmp(&self, &other)
    }

    fn hilbert_bits(self, _origin: Self) -> Option<u64> {
        None
    }
}

impl Coordinate for f64 {
    const KIND: CoordType = CoordType::Float64;
    const SIZE: usize = 8;

    fn values_of(values: &CoordValues) -> Option<&[Self]> {
        match values {
            CoordValues::Float64(v) => Some(v),
            _ => None,
        }
    }

    fn erase(values: Vec<Self>) -> CoordValues {
        CoordValues::Float64(values)
    }

    fn read_le(bytes: &[u8]) -> Self {
        f64::from_le_bytes(bytes[..8].try_into().expect("8 coordinate bytes"))
    }

    fn total_cmp(self, other: Self) -> Ordering {
        f64::total_cmp(&self, &other)
    }

    fn hilbert_bits(self, _origin: Self) -> Option<u64> {
        None
    }
}

impl GridCoord for i32 {
    fn as_i64(self) -> i64 {
        self as i64
    }
}

impl GridCoord for i64 {
    fn as_i64(self) -> i64 {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_views_reject_kind_mismatch() {
        let v = CoordValues::Int32(vec![1, 2, 3]);
        assert_eq!(<i32 as Coordinate>::values_of(&v), Some(&[1, 2, 3][..]));
        assert_eq!(<i64 as Coordinate>::values_of(&v), None);
        assert_eq!(<f64 as Coordinate>::values_of(&v), None);
    }

    #[test]
    fn read_le_roundtrip() {
        assert_eq!(<i32 as Coordinate>::read_le(&7i32.to_le_bytes()), 7);
        assert_eq!(<i64 as Coordinate>::read_le(&(-9i64).to_le_bytes()), -9);
        assert_eq!(<f64 as Coordinate>::read_le(&1.5f64.to_le_bytes()), 1.5);
    }

    #[test]
    fn hilbert_bits_only_for_integers() {
        assert_eq!(3i32.hilbert_bits(1), Some(2));
        assert_eq!(10i64.hilbert_bits(4), Some(6));
        assert_eq!(1.0f32.hilbert_bits(0.0), None);
        assert_eq!(1.0f64.hilbert_bits(0.0), None);
    }

    #[test]
    fn float_total_order() {
        assert_eq!(1.0f64.total_cmp(2.0), Ordering::Less);
        assert_eq!((-0.0f64).total_cmp(0.0), Ordering::Less);
    }
}
