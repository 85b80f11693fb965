//! Cell-layout comparators.
//!
//! A tile stores its cells in one of three total orders. The engine uses
//! these comparators for binary searches over coordinate tiles and over the
//! bounding-coordinate index of a sparse fragment:
//!
//! | Order | Comparison | Use case |
//! |-------|------------|----------|
//! | RowMajor | dimension 0 first | default layout |
//! | ColumnMajor | dimension D-1 first | column-oriented access |
//! | Hilbert | Hilbert id, then row-major | locality-preserving sparse layouts |

use crate::types::Coordinate;
use std::cmp::Ordering;

/// Total order on cells within a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellOrder {
    RowMajor,
    ColumnMajor,
    Hilbert,
}

/// Order in which tiles of a dense fragment are laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TileOrder {
    RowMajor,
    ColumnMajor,
}

/// Row-major comparison: dimension 0 is most significant.
pub fn cmp_row_major<T: Coordinate>(a: &[T], b: &[T]) -> Ordering {
    debug_assert_eq!(a.len(), b.len());
    for i in 0..a.len() {
        match a[i].total_cmp(b[i]) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Column-major comparison: dimension D-1 is most significant.
pub fn cmp_col_major<T: Coordinate>(a: &[T], b: &[T]) -> Ordering {
    debug_assert_eq!(a.len(), b.len());
    for i in (0..a.len()).rev() {
        match a[i].total_cmp(b[i]) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Hilbert comparison: Hilbert id first, row-major on ties.
pub fn cmp_hilbert<T: Coordinate>(id_a: u64, a: &[T], id_b: u64, b: &[T]) -> Ordering {
    id_a.cmp(&id_b).then_with(|| cmp_row_major(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_dim0_first() {
        assert_eq!(cmp_row_major(&[1i64, 9], &[2, 0]), Ordering::Less);
        assert_eq!(cmp_row_major(&[1i64, 2], &[1, 3]), Ordering::Less);
        assert_eq!(cmp_row_major(&[4i64, 4], &[4, 4]), Ordering::Equal);
    }

    #[test]
    fn col_major_last_dim_first() {
        assert_eq!(cmp_col_major(&[9i64, 1], &[0, 2]), Ordering::Less);
        assert_eq!(cmp_col_major(&[2i64, 1], &[3, 1]), Ordering::Less);
    }

    #[test]
    fn hilbert_ties_break_row_major() {
        assert_eq!(cmp_hilbert(5, &[0i64, 1], 7, &[9, 9]), Ordering::Less);
        assert_eq!(cmp_hilbert(5, &[0i64, 1], 5, &[0, 2]), Ordering::Less);
        assert_eq!(cmp_hilbert(5, &[0i64, 1], 5, &[0, 1]), Ordering::Equal);
    }

    #[test]
    fn float_coords_compare_totally() {
        assert_eq!(cmp_row_major(&[0.5f64, 1.0], &[0.5, 2.0]), Ordering::Less);
    }
}
