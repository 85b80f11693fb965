//! Cell-range resolver: which cells of a sparse tile satisfy the range.
//!
//! Runs only on sparse partial overlaps, after the tile's coordinates are
//! materialized. Produces the ordered, disjoint cell-position intervals
//! the copy engine walks:
//!
//! 1. unary range: one exact-match binary search
//! 2. contiguous overlap (row/column major): two binary searches bracket
//!    the single qualifying run
//! 3. non-contiguous overlap (row/column major): the contiguous bracket
//!    bounds a scan that coalesces maximal in-range runs
//! 4. Hilbert: scan the whole tile and coalesce runs

use crate::error::{ReadError, Result};
use crate::read_state::{OverlapRegion, ReadState};
use std::cmp::Ordering;
use std::sync::Arc;
use tilestore_core::{
    cell_in_range, cmp_col_major, cmp_hilbert, cmp_row_major, is_unary_range, ArraySchema,
    CellOrder, Coordinate, OverlapKind,
};

/// Where the resolver found the coordinate tile.
enum CoordsTile {
    /// Shared coords slot (the common case).
    InSlot,
    /// Private buffer, because the coords attribute is mid-copy in the
    /// shared slot and its cursor must survive.
    Temp(Vec<u8>),
}

impl ReadState {
    /// Resolve the qualifying cell intervals of the newest overlapping
    /// tile.
    pub(crate) fn compute_cell_ranges<T: Coordinate>(&mut self) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        let coords_id = schema.coords_id();
        let last_idx = self.overlapping_tiles.len() - 1;

        let staged = self.stage_coords_for_resolver(last_idx)?;
        let coords_bytes: &[u8] = match &staged {
            CoordsTile::InSlot => self.tiles[coords_id].data(),
            CoordsTile::Temp(bytes) => bytes,
        };

        let range = self.typed_range::<T>()?;
        let entry = &self.overlapping_tiles[last_idx];
        let cell_num = entry.cell_num as usize;
        let overlap = entry.overlap;
        let coord_box: Vec<T> = match &entry.region {
            OverlapRegion::Sparse { coord_box } => T::values_of(coord_box)
                .ok_or(ReadError::Internal("overlap box kind mismatch"))?
                .to_vec(),
            _ => return Err(ReadError::Internal("sparse overlap region expected")),
        };

        let ranges = if is_unary_range(&range) {
            resolve_unary(&schema, coords_bytes, cell_num, &coord_box)?
        } else if overlap == OverlapKind::PartialContig {
            resolve_contig(&schema, coords_bytes, cell_num, &coord_box)
        } else {
            match schema.cell_order() {
                CellOrder::Hilbert => {
                    scan_ranges(&schema, coords_bytes, 0, cell_num as i64 - 1, &range)
                }
                _ => {
                    // Bracket with the contiguous bound, then scan inside it.
                    let bounding = resolve_contig(&schema, coords_bytes, cell_num, &coord_box);
                    match bounding.first() {
                        None => Vec::new(),
                        Some(&(first, last)) => {
                            scan_ranges(&schema, coords_bytes, first as i64, last as i64, &range)
                        }
                    }
                }
            }
        };

        tracing::trace!(tile = self.overlapping_tiles[last_idx].pos, intervals = ranges.len(), "resolved cell ranges");
        self.overlapping_tiles[last_idx].cell_ranges = ranges;
        Ok(())
    }

    /// Materialize the coordinate tile of entry `last_idx` for the
    /// resolver, preferring the shared coords slot.
    fn stage_coords_for_resolver(&mut self, last_idx: usize) -> Result<CoordsTile> {
        let coords_id = self.schema.coords_id();
        let slot_busy = self.query.attributes.contains(&coords_id)
            && self.coords_slot_entry == Some(self.tile_pos[coords_id])
            && self.tile_pos[coords_id] != last_idx
            && self.tiles[coords_id].has_pending();
        if slot_busy {
            let pos = self.overlapping_tiles[last_idx].pos;
            let cell_num = self.overlapping_tiles[last_idx].cell_num;
            let bytes = self.coords_tile_to_vec(pos, cell_num)?;
            return Ok(CoordsTile::Temp(bytes));
        }
        self.coords_tile_into_slot(last_idx)?;
        Ok(CoordsTile::InSlot)
    }
}

/// Copy cell `cell`'s coordinates out of the tile bytes.
fn read_cell<T: Coordinate>(bytes: &[u8], cell: usize, dim: usize, out: &mut Vec<T>) {
    out.clear();
    let base = cell * dim * T::SIZE;
    for d in 0..dim {
        out.push(T::read_le(&bytes[base + d * T::SIZE..]));
    }
}

/// Exact-match binary search for a unary range.
fn resolve_unary<T: Coordinate>(
    schema: &ArraySchema,
    coords: &[u8],
    cell_num: usize,
    coord_box: &[T],
) -> Result<Vec<(u64, u64)>> {
    let dim = schema.dim_num();
    let point: Vec<T> = (0..dim).map(|i| coord_box[2 * i]).collect();

    match schema.cell_order() {
        CellOrder::RowMajor => Ok(search_exact(coords, cell_num, dim, &point, cmp_row_major)),
        CellOrder::ColumnMajor => Ok(search_exact(coords, cell_num, dim, &point, cmp_col_major)),
        CellOrder::Hilbert => match schema.hilbert_id(&point) {
            Some(point_id) => {
                let mut cell = Vec::new();
                let (mut min, mut max) = (0i64, cell_num as i64 - 1);
                let mut med = 0i64;
                while min <= max {
                    med = min + (max - min) / 2;
                    read_cell(coords, med as usize, dim, &mut cell);
                    let cell_id = schema
                        .hilbert_id(&cell)
                        .ok_or(ReadError::Internal("no hilbert id for cell"))?;
                    match cmp_hilbert(point_id, &point, cell_id, &cell) {
                        Ordering::Less => max = med - 1,
                        Ordering::Greater => min = med + 1,
                        Ordering::Equal => break,
                    }
                }
                if max >= min {
                    Ok(vec![(med as u64, med as u64)])
                } else {
                    Ok(Vec::new())
                }
            }
            // No Hilbert embedding: a scan of the unary box is still exact.
            None => Ok(scan_ranges(
                schema,
                coords,
                0,
                cell_num as i64 - 1,
                coord_box,
            )),
        },
    }
}

fn search_exact<T: Coordinate>(
    coords: &[u8],
    cell_num: usize,
    dim: usize,
    point: &[T],
    cmp: fn(&[T], &[T]) -> Ordering,
) -> Vec<(u64, u64)> {
    let mut cell = Vec::new();
    let (mut min, mut max) = (0i64, cell_num as i64 - 1);
    let mut med = 0i64;
    while min <= max {
        med = min + (max - min) / 2;
        read_cell(coords, med as usize, dim, &mut cell);
        match cmp(point, &cell) {
            Ordering::Less => max = med - 1,
            Ordering::Greater => min = med + 1,
            Ordering::Equal => break,
        }
    }
    if max >= min {
        vec![(med as u64, med as u64)]
    } else {
        Vec::new()
    }
}

/// Bracket the cells between the overlap box corners with two binary
/// searches; the result is the single qualifying run of a contiguous
/// overlap, or the scan bound of a non-contiguous one.
fn resolve_contig<T: Coordinate>(
    schema: &ArraySchema,
    coords: &[u8],
    cell_num: usize,
    coord_box: &[T],
) -> Vec<(u64, u64)> {
    let dim = schema.dim_num();
    let cmp: fn(&[T], &[T]) -> Ordering = match schema.cell_order() {
        CellOrder::ColumnMajor => cmp_col_major,
        _ => cmp_row_major,
    };
    let box_min: Vec<T> = (0..dim).map(|i| coord_box[2 * i]).collect();
    let box_max: Vec<T> = (0..dim).map(|i| coord_box[2 * i + 1]).collect();
    let mut cell = Vec::new();

    // Start: first cell at or after the box minimum.
    let (mut min, mut max) = (0i64, cell_num as i64 - 1);
    let mut med = 0i64;
    while min <= max {
        med = min + (max - min) / 2;
        read_cell(coords, med as usize, dim, &mut cell);
        match cmp(&box_min, &cell) {
            Ordering::Less => max = med - 1,
            Ordering::Greater => min = med + 1,
            Ordering::Equal => break,
        }
    }
    let start = if max < min { min } else { med };

    // End: last cell at or before the box maximum.
    let (mut min, mut max) = (0i64, cell_num as i64 - 1);
    let mut med = 0i64;
    while min <= max {
        med = min + (max - min) / 2;
        read_cell(coords, med as usize, dim, &mut cell);
        match cmp(&box_max, &cell) {
            Ordering::Less => max = med - 1,
            Ordering::Greater => min = med + 1,
            Ordering::Equal => break,
        }
    }
    let end = if max < min { max } else { med };

    if start <= end {
        vec![(start as u64, end as u64)]
    } else {
        Vec::new()
    }
}

/// Scan `[first, last]` and coalesce maximal runs of in-range cells.
fn scan_ranges<T: Coordinate>(
    schema: &ArraySchema,
    coords: &[u8],
    first: i64,
    last: i64,
    range: &[T],
) -> Vec<(u64, u64)> {
    let dim = schema.dim_num();
    let mut result = Vec::new();
    let mut run: Option<(u64, u64)> = None;
    let mut cell = Vec::new();
    for i in first..=last {
        read_cell(coords, i as usize, dim, &mut cell);
        if cell_in_range(&cell, range) {
            match &mut run {
                Some((_, end)) => *end = i as u64,
                None => run = Some((i as u64, i as u64)),
            }
        } else if let Some(done) = run.take() {
            result.push(done);
        }
    }
    if let Some(done) = run {
        result.push(done);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilestore_core::{Attribute, CellVal, Compression, CoordValues, TileOrder};

    fn schema(order: CellOrder) -> ArraySchema {
        ArraySchema::new(
            2,
            CoordValues::Int64(vec![0, 7, 0, 7]),
            None,
            vec![Attribute {
                name: "a1".into(),
                cell_val: CellVal::Fixed(4),
                compression: Compression::None,
            }],
            Compression::None,
            order,
            TileOrder::RowMajor,
            8,
            false,
        )
        .unwrap()
    }

    fn coords_tile(cells: &[[i64; 2]]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for cell in cells {
            bytes.extend_from_slice(&cell[0].to_le_bytes());
            bytes.extend_from_slice(&cell[1].to_le_bytes());
        }
        bytes
    }

    #[test]
    fn unary_exact_match() {
        let s = schema(CellOrder::RowMajor);
        let tile = coords_tile(&[[0, 0], [1, 1], [3, 3]]);
        let hit = resolve_unary(&s, &tile, 3, &[1i64, 1, 1, 1]).unwrap();
        assert_eq!(hit, vec![(1, 1)]);
        let miss = resolve_unary(&s, &tile, 3, &[2i64, 2, 2, 2]).unwrap();
        assert!(miss.is_empty());
    }

    #[test]
    fn contig_brackets_the_run() {
        let s = schema(CellOrder::RowMajor);
        let tile = coords_tile(&[[0, 0], [1, 1], [2, 0], [3, 3]]);
        // Box [1..3, 0..3]: cells 1, 2, 3 qualify as one bracket.
        let ranges = resolve_contig(&s, &tile, 4, &[1i64, 3, 0, 3]);
        assert_eq!(ranges, vec![(1, 3)]);
        // Box beyond all cells.
        let empty = resolve_contig(&s, &tile, 4, &[5i64, 7, 0, 3]);
        assert!(empty.is_empty());
    }

    #[test]
    fn scan_coalesces_runs() {
        let s = schema(CellOrder::RowMajor);
        let tile = coords_tile(&[[0, 1], [0, 5], [1, 1], [1, 5], [2, 1]]);
        // Column 0..2 x 0..2: cells 0, 2, 4 qualify; cells 1 and 3 break
        // the runs.
        let ranges = scan_ranges(&s, &tile, 0, 4, &[0i64, 2, 0, 2]);
        assert_eq!(ranges, vec![(0, 0), (2, 2), (4, 4)]);
    }

    #[test]
    fn scan_keeps_adjacent_cells_in_one_run() {
        let s = schema(CellOrder::RowMajor);
        let tile = coords_tile(&[[0, 0], [0, 1], [1, 0], [6, 6]]);
        let ranges = scan_ranges(&s, &tile, 0, 3, &[0i64, 1, 0, 1]);
        assert_eq!(ranges, vec![(0, 2)]);
    }

    #[test]
    fn hilbert_unary_search() {
        let s = schema(CellOrder::Hilbert);
        // Cells sorted by Hilbert id.
        let mut cells: Vec<[i64; 2]> = vec![[0, 0], [1, 1], [3, 3], [5, 2]];
        cells.sort_by_key(|c| s.hilbert_id(&c[..]).unwrap());
        let tile = coords_tile(&cells);
        let hit = resolve_unary(&s, &tile, 4, &[3i64, 3, 3, 3]).unwrap();
        assert_eq!(hit.len(), 1);
        let (pos, _) = hit[0];
        let found = &cells[pos as usize];
        assert_eq!(found, &[3, 3]);
    }
}
