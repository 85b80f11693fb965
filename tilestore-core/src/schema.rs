//! Array schema and tile-grid geometry.
//!
//! `ArraySchema` is a read-only input to the engine: dimensions, domain,
//! tile extents, attributes, cell/tile orders, capacity. It also owns the
//! geometry the fragment read engine consumes: tile positions and traversal
//! in tile order, cell positions inside a tile, overlap classification
//! against a query range (dense tiles and sparse MBRs), and slab sizes for
//! non-contiguous dense copies.
//!
//! Tile indices, tile-relative cell boxes, and cell positions are plain
//! integers (`i64`/`u64`); only absolute coordinates carry the schema's
//! scalar kind.

use crate::cell_order::{CellOrder, TileOrder};
use crate::error::{Result, SchemaError};
use crate::hilbert::hilbert_index;
use crate::types::{CoordType, CoordValues, Coordinate, GridCoord};
use crate::{CELL_VAR_OFFSET_SIZE, COORDS_NAME};
use std::cmp::Ordering;

/// Per-attribute compression of tile payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

/// Fixed or variable-length cell values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellVal {
    /// Fixed cell width in bytes.
    Fixed(usize),
    /// Variable-length cells; the fixed stream holds 8-byte offsets into a
    /// separate variable segment.
    Var,
}

/// One attribute of the array.
#[derive(Clone, Debug)]
pub struct Attribute {
    pub name: String,
    pub cell_val: CellVal,
    pub compression: Compression,
}

/// Relationship between a tile (or MBR) and the query range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlapKind {
    /// Disjoint.
    None,
    /// Tile contained in the range.
    Full,
    /// Qualifying cells form one run in cell order.
    PartialContig,
    /// Qualifying cells form multiple runs.
    PartialNonContig,
}

/// Array schema: the read-only description of one array.
#[derive(Clone, Debug)]
pub struct ArraySchema {
    dim_num: usize,
    coord_type: CoordType,
    domain: CoordValues,
    attributes: Vec<Attribute>,
    coords_compression: Compression,
    cell_order: CellOrder,
    tile_order: TileOrder,
    capacity: u64,
    dense: bool,
    // Dense-only integer geometry, precomputed at construction.
    domain_lo: Vec<i64>,
    extents: Vec<i64>,
    tile_grid: Vec<i64>,
    // Significant bits per dimension for Hilbert ids (integer domains).
    hilbert_bits: u32,
}

impl ArraySchema {
    /// Validate and build a schema.
    ///
    /// `domain` holds `2*dim_num` inclusive bounds. `tile_extents` is
    /// required for dense arrays (one extent per dimension, same scalar
    /// kind); `capacity` is the per-tile cell budget of sparse fragments.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dim_num: usize,
        domain: CoordValues,
        tile_extents: Option<CoordValues>,
        attributes: Vec<Attribute>,
        coords_compression: Compression,
        cell_order: CellOrder,
        tile_order: TileOrder,
        capacity: u64,
        dense: bool,
    ) -> Result<Self> {
        if dim_num == 0 {
            return Err(SchemaError::InvalidSchema("zero dimensions".into()));
        }
        if domain.len() != 2 * dim_num {
            return Err(SchemaError::InvalidSchema(format!(
                "domain has {} values, expected {}",
                domain.len(),
                2 * dim_num
            )));
        }
        let coord_type = domain.coord_type();
        if attributes.is_empty() {
            return Err(SchemaError::InvalidSchema("no attributes".into()));
        }
        if !dense && capacity == 0 {
            return Err(SchemaError::InvalidSchema("sparse capacity is zero".into()));
        }

        let mut domain_lo = Vec::new();
        let mut extents = Vec::new();
        let mut tile_grid = Vec::new();
        if dense {
            if cell_order == CellOrder::Hilbert {
                return Err(SchemaError::InvalidSchema(
                    "dense arrays do not support the Hilbert cell order".into(),
                ));
            }
            let ext = tile_extents.as_ref().ok_or_else(|| {
                SchemaError::InvalidSchema("dense array without tile extents".into())
            })?;
            if ext.len() != dim_num || ext.coord_type() != coord_type {
                return Err(SchemaError::InvalidSchema(
                    "tile extents do not match the domain".into(),
                ));
            }
            let (dom64, ext64) = match (&domain, ext) {
                (CoordValues::Int32(d), CoordValues::Int32(e)) => (
                    d.iter().map(|&v| v as i64).collect::<Vec<_>>(),
                    e.iter().map(|&v| v as i64).collect::<Vec<_>>(),
                ),
                (CoordValues::Int64(d), CoordValues::Int64(e)) => (d.clone(), e.clone()),
                _ => {
                    return Err(SchemaError::InvalidSchema(
                        "dense arrays require an integer coordinate type".into(),
                    ))
                }
            };
            for i in 0..dim_num {
                let lo = dom64[2 * i];
                let hi = dom64[2 * i + 1];
                let e = ext64[i];
                if hi < lo || e <= 0 || (hi - lo + 1) % e != 0 {
                    return Err(SchemaError::InvalidSchema(format!(
                        "dimension {}: extent {} does not tile domain [{}, {}]",
                        i, e, lo, hi
                    )));
                }
                domain_lo.push(lo);
                extents.push(e);
                tile_grid.push((hi - lo + 1) / e);
            }
        }

        let hilbert_bits = hilbert_bits_for(&domain, dim_num);

        Ok(Self {
            dim_num,
            coord_type,
            domain,
            attributes,
            coords_compression,
            cell_order,
            tile_order,
            capacity,
            dense,
            domain_lo,
            extents,
            tile_grid,
            hilbert_bits,
        })
    }

    pub fn dim_num(&self) -> usize {
        self.dim_num
    }

    pub fn coord_type(&self) -> CoordType {
        self.coord_type
    }

    pub fn dense(&self) -> bool {
        self.dense
    }

    pub fn cell_order(&self) -> CellOrder {
        self.cell_order
    }

    pub fn tile_order(&self) -> TileOrder {
        self.tile_order
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn domain(&self) -> &CoordValues {
        &self.domain
    }

    /// Number of real attributes, not counting the coordinates slot.
    pub fn attribute_num(&self) -> usize {
        self.attributes.len()
    }

    /// Id of the coordinates pseudo-attribute (one past the last attribute).
    pub fn coords_id(&self) -> usize {
        self.attributes.len()
    }

    pub fn attribute_name(&self, id: usize) -> &str {
        if id == self.coords_id() {
            COORDS_NAME
        } else {
            &self.attributes[id].name
        }
    }

    pub fn var_size(&self, id: usize) -> bool {
        id != self.coords_id() && self.attributes[id].cell_val == CellVal::Var
    }

    pub fn compression(&self, id: usize) -> Compression {
        if id == self.coords_id() {
            self.coords_compression
        } else {
            self.attributes[id].compression
        }
    }

    /// Byte width of one cell in the fixed stream of an attribute.
    pub fn cell_size(&self, id: usize) -> usize {
        if id == self.coords_id() {
            self.coords_size()
        } else {
            match self.attributes[id].cell_val {
                CellVal::Fixed(bytes) => bytes,
                CellVal::Var => CELL_VAR_OFFSET_SIZE,
            }
        }
    }

    /// Byte width of one cell's coordinates.
    pub fn coords_size(&self) -> usize {
        self.dim_num * self.coord_type.size()
    }

    /// Cells in a full tile: the extent product for dense arrays, the
    /// capacity for sparse fragments.
    pub fn cell_num_per_tile(&self) -> u64 {
        if self.dense {
            self.extents.iter().map(|&e| e as u64).product()
        } else {
            self.capacity
        }
    }

    /// Byte size of a full tile of an attribute's fixed stream.
    pub fn tile_size(&self, id: usize) -> usize {
        self.cell_num_per_tile() as usize * self.cell_size(id)
    }

    /// Per-dimension tile counts of the dense tile grid.
    pub fn tile_grid(&self) -> &[i64] {
        &self.tile_grid
    }

    /// Per-dimension tile extents in cells (dense).
    pub fn tile_extents(&self) -> &[i64] {
        &self.extents
    }

    // ========================================================================
    // Tile-grid traversal (dense)
    // ========================================================================

    /// Global position of a tile in tile order.
    pub fn tile_pos(&self, tile_coords: &[i64]) -> u64 {
        linear_pos(tile_coords, &self.tile_grid, self.tile_order == TileOrder::RowMajor)
    }

    /// Advance tile coordinates within a tile-domain box in tile order.
    /// Returns `false` once the box is exhausted.
    pub fn next_tile_coords(&self, tile_box: &[i64], coords: &mut [i64]) -> bool {
        let dims: Vec<usize> = match self.tile_order {
            // Fastest-varying dimension first.
            TileOrder::RowMajor => (0..self.dim_num).rev().collect(),
            TileOrder::ColumnMajor => (0..self.dim_num).collect(),
        };
        for &i in &dims {
            coords[i] += 1;
            if coords[i] <= tile_box[2 * i + 1] {
                return true;
            }
            coords[i] = tile_box[2 * i];
        }
        false
    }

    /// Position of a tile-relative cell coordinate under the cell order.
    pub fn cell_pos_in_tile(&self, cell: &[i64]) -> u64 {
        linear_pos(cell, &self.extents, self.cell_order == CellOrder::RowMajor)
    }

    /// Cells in one innermost-dimension slab of a full tile.
    pub fn cell_num_in_tile_slab(&self) -> u64 {
        match self.cell_order {
            CellOrder::RowMajor => self.extents[self.dim_num - 1] as u64,
            CellOrder::ColumnMajor => self.extents[0] as u64,
            CellOrder::Hilbert => 1,
        }
    }

    /// Cells in one innermost-dimension slab of an overlap box.
    pub fn cell_num_in_range_slab(&self, cell_box: &[i64]) -> u64 {
        let i = match self.cell_order {
            CellOrder::RowMajor => self.dim_num - 1,
            CellOrder::ColumnMajor => 0,
            CellOrder::Hilbert => return 1,
        };
        (cell_box[2 * i + 1] - cell_box[2 * i] + 1) as u64
    }

    // ========================================================================
    // Overlap classification
    // ========================================================================

    /// Overlap of a dense tile with the query range.
    ///
    /// Returns the overlap kind and the overlap box relative to the tile,
    /// in cell units (`2*dim` inclusive bounds).
    pub fn tile_range_overlap<T: GridCoord>(
        &self,
        range: &[T],
        tile_coords: &[i64],
    ) -> (OverlapKind, Vec<i64>) {
        let mut rel = vec![0i64; 2 * self.dim_num];
        for i in 0..self.dim_num {
            let tile_lo = self.domain_lo[i] + tile_coords[i] * self.extents[i];
            let tile_hi = tile_lo + self.extents[i] - 1;
            let lo = range[2 * i].as_i64().max(tile_lo);
            let hi = range[2 * i + 1].as_i64().min(tile_hi);
            if hi < lo {
                return (OverlapKind::None, Vec::new());
            }
            rel[2 * i] = lo - tile_lo;
            rel[2 * i + 1] = hi - tile_lo;
        }

        let full = (0..self.dim_num)
            .all(|i| rel[2 * i] == 0 && rel[2 * i + 1] == self.extents[i] - 1);
        if full {
            return (OverlapKind::Full, rel);
        }

        let contig = box_is_contiguous(
            &rel,
            |i| (0, self.extents[i] - 1),
            self.significance_order(),
        );
        let kind = if contig {
            OverlapKind::PartialContig
        } else {
            OverlapKind::PartialNonContig
        };
        (kind, rel)
    }

    /// Overlap of a sparse tile's MBR with the query range.
    ///
    /// Returns the overlap kind and the overlap box in absolute
    /// coordinates.
    pub fn mbr_range_overlap<T: Coordinate>(&self, range: &[T], mbr: &[T]) -> (OverlapKind, Vec<T>) {
        let mut isect = Vec::with_capacity(2 * self.dim_num);
        for i in 0..self.dim_num {
            let lo = max_by_total(range[2 * i], mbr[2 * i]);
            let hi = min_by_total(range[2 * i + 1], mbr[2 * i + 1]);
            if hi.total_cmp(lo) == Ordering::Less {
                return (OverlapKind::None, Vec::new());
            }
            isect.push(lo);
            isect.push(hi);
        }

        let full = (0..self.dim_num).all(|i| {
            isect[2 * i].total_cmp(mbr[2 * i]) == Ordering::Equal
                && isect[2 * i + 1].total_cmp(mbr[2 * i + 1]) == Ordering::Equal
        });
        if full {
            return (OverlapKind::Full, isect);
        }

        if self.cell_order == CellOrder::Hilbert {
            return (OverlapKind::PartialNonContig, isect);
        }

        let order = self.significance_order();
        let mut pivot_seen = false;
        let mut contig = true;
        for &i in &order {
            let unary = isect[2 * i].total_cmp(isect[2 * i + 1]) == Ordering::Equal;
            let covers_mbr = isect[2 * i].total_cmp(mbr[2 * i]) == Ordering::Equal
                && isect[2 * i + 1].total_cmp(mbr[2 * i + 1]) == Ordering::Equal;
            if !pivot_seen {
                if unary {
                    continue;
                }
                pivot_seen = true;
            } else if !covers_mbr {
                contig = false;
                break;
            }
        }
        let kind = if contig {
            OverlapKind::PartialContig
        } else {
            OverlapKind::PartialNonContig
        };
        (kind, isect)
    }

    /// Hilbert id of a coordinate tuple; `None` for float scalars.
    pub fn hilbert_id<T: Coordinate>(&self, coords: &[T]) -> Option<u64> {
        let domain = T::values_of(&self.domain)?;
        let mut normalized = Vec::with_capacity(self.dim_num);
        for i in 0..self.dim_num {
            normalized.push(coords[i].hilbert_bits(domain[2 * i])?);
        }
        Some(hilbert_index(&normalized, self.hilbert_bits))
    }

    /// Dimensions from most to least significant under the cell order.
    fn significance_order(&self) -> Vec<usize> {
        match self.cell_order {
            CellOrder::RowMajor | CellOrder::Hilbert => (0..self.dim_num).collect(),
            CellOrder::ColumnMajor => (0..self.dim_num).rev().collect(),
        }
    }
}

/// Linear position of `coords` in a box of per-dimension lengths `dims`,
/// row-major (`dim0_first`) or column-major.
fn linear_pos(coords: &[i64], dims: &[i64], dim0_first: bool) -> u64 {
    let n = dims.len();
    let mut pos = 0u64;
    if dim0_first {
        for i in 0..n {
            let stride: u64 = dims[i + 1..].iter().map(|&d| d as u64).product();
            pos += coords[i] as u64 * stride;
        }
    } else {
        for i in 0..n {
            let stride: u64 = dims[..i].iter().map(|&d| d as u64).product();
            pos += coords[i] as u64 * stride;
        }
    }
    pos
}

/// A box is one contiguous run in cell order exactly when, walking the
/// dimensions from most to least significant, every dimension before some
/// pivot is unary and every dimension after it covers its full interval.
fn box_is_contiguous<F>(cell_box: &[i64], full_interval: F, order: Vec<usize>) -> bool
where
    F: Fn(usize) -> (i64, i64),
{
    let mut pivot_seen = false;
    for &i in &order {
        let lo = cell_box[2 * i];
        let hi = cell_box[2 * i + 1];
        if !pivot_seen {
            if lo == hi {
                continue;
            }
            pivot_seen = true;
        } else {
            let (flo, fhi) = full_interval(i);
            if lo != flo || hi != fhi {
                return false;
            }
        }
    }
    true
}

/// Significant bits per dimension for Hilbert ids, sized to the largest
/// domain extent and clamped so the interleaved index fits in 63 bits.
fn hilbert_bits_for(domain: &CoordValues, dim_num: usize) -> u32 {
    let max_extent: u64 = match domain {
        CoordValues::Int32(d) => d
            .chunks_exact(2)
            .map(|p| (p[1] as i64 - p[0] as i64 + 1).max(1) as u64)
            .max()
            .unwrap_or(1),
        CoordValues::Int64(d) => d
            .chunks_exact(2)
            .map(|p| p[1].wrapping_sub(p[0]).wrapping_add(1).max(1) as u64)
            .max()
            .unwrap_or(1),
        _ => return 0,
    };
    let needed = 64 - max_extent.saturating_sub(1).leading_zeros();
    needed.clamp(1, 63 / dim_num as u32)
}

fn max_by_total<T: Coordinate>(a: T, b: T) -> T {
    if a.total_cmp(b) == Ordering::Less {
        b
    } else {
        a
    }
}

fn min_by_total<T: Coordinate>(a: T, b: T) -> T {
    if a.total_cmp(b) == Ordering::Greater {
        b
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_2d_4x4() -> ArraySchema {
        ArraySchema::new(
            2,
            CoordValues::Int64(vec![0, 3, 0, 3]),
            Some(CoordValues::Int64(vec![2, 2])),
            vec![Attribute {
                name: "a1".into(),
                cell_val: CellVal::Fixed(4),
                compression: Compression::None,
            }],
            Compression::None,
            CellOrder::RowMajor,
            TileOrder::RowMajor,
            0,
            true,
        )
        .unwrap()
    }

    fn sparse_schema() -> ArraySchema {
        ArraySchema::new(
            2,
            CoordValues::Int64(vec![0, 3, 0, 3]),
            None,
            vec![Attribute {
                name: "a1".into(),
                cell_val: CellVal::Fixed(4),
                compression: Compression::None,
            }],
            Compression::None,
            CellOrder::RowMajor,
            TileOrder::RowMajor,
            2,
            false,
        )
        .unwrap()
    }

    #[test]
    fn dense_requires_integer_coords() {
        let err = ArraySchema::new(
            1,
            CoordValues::Float64(vec![0.0, 1.0]),
            Some(CoordValues::Float64(vec![0.5])),
            vec![Attribute {
                name: "a".into(),
                cell_val: CellVal::Fixed(8),
                compression: Compression::None,
            }],
            Compression::None,
            CellOrder::RowMajor,
            TileOrder::RowMajor,
            0,
            true,
        );
        assert!(err.is_err());
    }

    #[test]
    fn tile_grid_and_sizes() {
        let s = schema_2d_4x4();
        assert_eq!(s.tile_grid(), &[2, 2]);
        assert_eq!(s.cell_num_per_tile(), 4);
        assert_eq!(s.tile_size(0), 16);
        assert_eq!(s.coords_size(), 16);
        assert_eq!(s.cell_size(s.coords_id()), 16);
    }

    #[test]
    fn tile_positions_row_major() {
        let s = schema_2d_4x4();
        assert_eq!(s.tile_pos(&[0, 0]), 0);
        assert_eq!(s.tile_pos(&[0, 1]), 1);
        assert_eq!(s.tile_pos(&[1, 0]), 2);
        assert_eq!(s.tile_pos(&[1, 1]), 3);
    }

    #[test]
    fn tile_coords_advance_in_box() {
        let s = schema_2d_4x4();
        let tile_box = [0i64, 1, 0, 1];
        let mut coords = vec![0i64, 0];
        let mut seen = vec![coords.clone()];
        while s.next_tile_coords(&tile_box, &mut coords) {
            seen.push(coords.clone());
        }
        assert_eq!(seen, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    }

    #[test]
    fn cell_positions_in_tile() {
        let s = schema_2d_4x4();
        assert_eq!(s.cell_pos_in_tile(&[0, 0]), 0);
        assert_eq!(s.cell_pos_in_tile(&[0, 1]), 1);
        assert_eq!(s.cell_pos_in_tile(&[1, 0]), 2);
        assert_eq!(s.cell_pos_in_tile(&[1, 1]), 3);
    }

    #[test]
    fn dense_overlap_classification() {
        let s = schema_2d_4x4();

        // Whole tile inside the range.
        let (kind, rel) = s.tile_range_overlap(&[0i64, 3, 0, 3], &[0, 0]);
        assert_eq!(kind, OverlapKind::Full);
        assert_eq!(rel, vec![0, 1, 0, 1]);

        // Single cell: contiguous.
        let (kind, rel) = s.tile_range_overlap(&[1i64, 1, 1, 1], &[0, 0]);
        assert_eq!(kind, OverlapKind::PartialContig);
        assert_eq!(rel, vec![1, 1, 1, 1]);

        // One full row of the tile: contiguous.
        let (kind, _) = s.tile_range_overlap(&[1i64, 1, 0, 3], &[0, 0]);
        assert_eq!(kind, OverlapKind::PartialContig);

        // A column: two disjoint runs in row-major order.
        let (kind, _) = s.tile_range_overlap(&[0i64, 3, 1, 1], &[0, 0]);
        assert_eq!(kind, OverlapKind::PartialNonContig);

        // Disjoint tile.
        let (kind, rel) = s.tile_range_overlap(&[0i64, 1, 0, 1], &[1, 1]);
        assert_eq!(kind, OverlapKind::None);
        assert!(rel.is_empty());
    }

    #[test]
    fn slab_sizes() {
        let s = schema_2d_4x4();
        assert_eq!(s.cell_num_in_tile_slab(), 2);
        assert_eq!(s.cell_num_in_range_slab(&[0, 1, 1, 1]), 1);
        assert_eq!(s.cell_num_in_range_slab(&[0, 0, 0, 1]), 2);
    }

    #[test]
    fn mbr_overlap_classification() {
        let s = sparse_schema();
        let mbr = [1i64, 2, 1, 2];

        let (kind, isect) = s.mbr_range_overlap(&[0i64, 3, 0, 3], &mbr);
        assert_eq!(kind, OverlapKind::Full);
        assert_eq!(isect, vec![1, 2, 1, 2]);

        // Overlap covers the MBR in the fast dimension: one run.
        let (kind, isect) = s.mbr_range_overlap(&[1i64, 1, 0, 3], &mbr);
        assert_eq!(kind, OverlapKind::PartialContig);
        assert_eq!(isect, vec![1, 1, 1, 2]);

        // Overlap narrows the fast dimension: multiple runs.
        let (kind, _) = s.mbr_range_overlap(&[1i64, 2, 1, 1], &mbr);
        assert_eq!(kind, OverlapKind::PartialNonContig);

        let (kind, _) = s.mbr_range_overlap(&[3i64, 3, 3, 3], &mbr);
        assert_eq!(kind, OverlapKind::None);
    }

    #[test]
    fn hilbert_ids_normalize_to_domain() {
        let s = sparse_schema();
        let a = s.hilbert_id(&[0i64, 0]).unwrap();
        let b = s.hilbert_id(&[0i64, 1]).unwrap();
        assert_ne!(a, b);
        assert!(s.hilbert_id(&[0.5f64, 0.5]).is_none());
    }
}
