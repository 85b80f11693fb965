//! Overlap iterator: producing the next tile of the fragment that
//! overlaps the query range.
//!
//! Dense fragments walk the tile-grid box covering the range in the
//! schema's tile order. Sparse fragments first narrow a candidate tile
//! interval by binary search over the fragment's bounding coordinates,
//! then scan forward, classifying each MBR against the range and skipping
//! disjoint tiles.
//!
//! Either walk terminates by pushing a sentinel entry with no overlap.
//! After every push the reaper retires the prefix of entries that all
//! requested attributes have consumed, so the list stays bounded by the
//! attributes' drift.

use crate::error::{ReadError, Result};
use crate::read_state::{OverlapRegion, OverlappingTile, ReadState};
use std::cmp::Ordering;
use std::sync::Arc;
use tilestore_core::{
    cmp_col_major, cmp_hilbert, cmp_row_major, is_unary_range, BookKeeping, CellOrder, Coordinate,
    GridCoord, OverlapKind,
};

/// First and last cell coordinates of a sparse tile in cell order.
fn bounding_coords_of<T: Coordinate>(
    book: &BookKeeping,
    dim: usize,
    tile: i64,
) -> Result<(&[T], &[T])> {
    let bc = T::values_of(&book.bounding_coords[tile as usize])
        .ok_or(ReadError::Internal("bounding coordinates kind mismatch"))?;
    Ok((&bc[..dim], &bc[dim..]))
}

impl ReadState {
    fn push_sentinel(&mut self) {
        self.overlapping_tiles.push(OverlappingTile {
            pos: 0,
            overlap: OverlapKind::None,
            region: OverlapRegion::None,
            cell_num: 0,
            cell_ranges: Vec::new(),
            coords_tile_fetched: false,
        });
    }

    // ========================================================================
    // Dense grid walk
    // ========================================================================

    /// Map the query range into the tile grid. An empty intersection
    /// immediately pushes the terminal sentinel.
    pub(crate) fn init_dense<T: GridCoord>(&mut self) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        let range = self.typed_range::<T>()?;
        let domain = T::values_of(schema.domain())
            .ok_or(ReadError::Internal("domain kind mismatch"))?;
        let grid = schema.tile_grid();
        let extents = schema.tile_extents();
        let dim = schema.dim_num();

        let mut rtd = vec![0i64; 2 * dim];
        let mut overlap = true;
        for i in 0..dim {
            let lo = (range[2 * i].as_i64() - domain[2 * i].as_i64()) / extents[i];
            let hi = (range[2 * i + 1].as_i64() - domain[2 * i].as_i64()) / extents[i];
            rtd[2 * i] = lo.max(0);
            rtd[2 * i + 1] = hi.min(grid[i] - 1);
            if rtd[2 * i] > grid[i] - 1 || rtd[2 * i + 1] < 0 || rtd[2 * i] > rtd[2 * i + 1] {
                overlap = false;
            }
        }
        tracing::debug!(?rtd, overlap, "dense range in tile domain");
        self.range_in_tile_domain = rtd;
        if !overlap {
            self.push_sentinel();
        }
        Ok(())
    }

    /// Push the next tile of the dense walk, or the sentinel once the
    /// tile-domain box is exhausted.
    pub(crate) fn next_overlapping_tile_dense<T: GridCoord>(&mut self) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        let range = self.typed_range::<T>()?;
        let dim = schema.dim_num();

        let coords = if self.overlapping_tiles.is_empty() {
            Some((0..dim).map(|i| self.range_in_tile_domain[2 * i]).collect::<Vec<_>>())
        } else {
            match &self.overlapping_tiles.last().expect("non-empty").region {
                OverlapRegion::Dense { tile_coords, .. } => {
                    let mut next = tile_coords.clone();
                    if schema.next_tile_coords(&self.range_in_tile_domain, &mut next) {
                        Some(next)
                    } else {
                        None
                    }
                }
                _ => return Err(ReadError::Internal("advanced past the terminal tile")),
            }
        };

        match coords {
            None => self.push_sentinel(),
            Some(tile_coords) => {
                let pos = schema.tile_pos(&tile_coords);
                let (kind, cell_box) = schema.tile_range_overlap(&range, &tile_coords);
                debug_assert_ne!(kind, OverlapKind::None);
                self.overlapping_tiles.push(OverlappingTile {
                    pos,
                    overlap: kind,
                    region: OverlapRegion::Dense {
                        tile_coords,
                        cell_box,
                    },
                    cell_num: schema.cell_num_per_tile(),
                    cell_ranges: Vec::new(),
                    coords_tile_fetched: false,
                });
            }
        }
        self.reap();
        Ok(())
    }

    // ========================================================================
    // Sparse MBR walk
    // ========================================================================

    /// Narrow the candidate tile interval by cell-layout order. An empty
    /// interval immediately pushes the terminal sentinel.
    pub(crate) fn init_sparse<T: Coordinate>(&mut self) -> Result<()> {
        let range = self.typed_range::<T>()?;
        if self.book.tile_num == 0 {
            self.tile_search_range = (0, -1);
            self.push_sentinel();
            return Ok(());
        }
        let search = match self.schema.cell_order() {
            CellOrder::RowMajor => self.search_range_ordered::<T>(&range, cmp_row_major)?,
            CellOrder::ColumnMajor => self.search_range_ordered::<T>(&range, cmp_col_major)?,
            CellOrder::Hilbert => self.search_range_hilbert::<T>(&range)?,
        };
        tracing::debug!(first = search.0, last = search.1, "sparse tile search range");
        self.tile_search_range = search;
        if search.1 < search.0 {
            self.push_sentinel();
        }
        Ok(())
    }

    /// Binary-search the bounding-coordinate index under a row- or
    /// column-major comparator: the starting tile is the first whose last
    /// cell reaches the range minimum, the ending tile the last whose
    /// first cell does not pass the range maximum.
    fn search_range_ordered<T: Coordinate>(
        &self,
        range: &[T],
        cmp: fn(&[T], &[T]) -> Ordering,
    ) -> Result<(i64, i64)> {
        let dim = self.schema.dim_num();
        let tile_num = self.book.tile_num as i64;
        let range_min: Vec<T> = (0..dim).map(|i| range[2 * i]).collect();
        let range_max: Vec<T> = (0..dim).map(|i| range[2 * i + 1]).collect();

        let (mut min, mut max) = (0i64, tile_num - 1);
        let mut med = 0i64;
        while min <= max {
            med = min + (max - min) / 2;
            let (first, last) = bounding_coords_of::<T>(&self.book, dim, med)?;
            if cmp(&range_min, first) == Ordering::Less {
                max = med - 1;
            } else if cmp(&range_min, last) == Ordering::Greater {
                min = med + 1;
            } else {
                break;
            }
        }
        let start = if max < min { min } else { med };

        let end = if is_unary_range(range) {
            start
        } else {
            let (mut min, mut max) = (0i64, tile_num - 1);
            let mut med = 0i64;
            while min <= max {
                med = min + (max - min) / 2;
                let (first, last) = bounding_coords_of::<T>(&self.book, dim, med)?;
                if cmp(&range_max, first) == Ordering::Less {
                    max = med - 1;
                } else if cmp(&range_max, last) == Ordering::Greater {
                    min = med + 1;
                } else {
                    break;
                }
            }
            if max < min {
                max
            } else {
                med
            }
        };

        Ok((start, end))
    }

    /// Hilbert layouts prune only unary ranges (by Hilbert id); anything
    /// else conservatively takes the full tile interval.
    fn search_range_hilbert<T: Coordinate>(&self, range: &[T]) -> Result<(i64, i64)> {
        let dim = self.schema.dim_num();
        let tile_num = self.book.tile_num as i64;
        if !is_unary_range(range) {
            return Ok((0, tile_num - 1));
        }
        let point: Vec<T> = (0..dim).map(|i| range[2 * i]).collect();
        let point_id = match self.schema.hilbert_id(&point) {
            Some(id) => id,
            // No Hilbert embedding for this scalar kind.
            None => return Ok((0, tile_num - 1)),
        };

        let (mut min, mut max) = (0i64, tile_num - 1);
        let mut med = 0i64;
        while min <= max {
            med = min + (max - min) / 2;
            let bc = T::values_of(&self.book.bounding_coords[med as usize])
                .ok_or(ReadError::Internal("bounding coordinates kind mismatch"))?;
            let (first, last) = (&bc[..dim], &bc[dim..]);
            let first_id = self
                .schema
                .hilbert_id(first)
                .ok_or(ReadError::Internal("no hilbert id for bounding coords"))?;
            let last_id = self
                .schema
                .hilbert_id(last)
                .ok_or(ReadError::Internal("no hilbert id for bounding coords"))?;
            if cmp_hilbert(point_id, &point, first_id, first) == Ordering::Less {
                max = med - 1;
            } else if cmp_hilbert(point_id, &point, last_id, last) == Ordering::Greater {
                min = med + 1;
            } else {
                break;
            }
        }
        let start = if max < min { min } else { med };
        Ok((start, start))
    }

    /// Scan forward from the last returned position for the next MBR that
    /// overlaps the range; push it (resolving cell ranges for partial
    /// overlaps) or the sentinel when the search interval is exhausted.
    pub(crate) fn next_overlapping_tile_sparse<T: Coordinate>(&mut self) -> Result<()> {
        let schema = Arc::clone(&self.schema);
        let book = Arc::clone(&self.book);
        let range = self.typed_range::<T>()?;
        let tile_num = book.tile_num as i64;
        let (first, last) = self.tile_search_range;

        let mut tile_pos = match self.overlapping_tiles.last() {
            None => first,
            Some(entry) => {
                if entry.overlap == OverlapKind::None {
                    return Err(ReadError::Internal("advanced past the terminal tile"));
                }
                entry.pos as i64 + 1
            }
        };

        let mut found = None;
        if first >= 0 && first < tile_num {
            while tile_pos <= last {
                let mbr = T::values_of(&book.mbrs[tile_pos as usize])
                    .ok_or(ReadError::Internal("MBR kind mismatch"))?;
                let (kind, isect) = schema.mbr_range_overlap(&range, mbr);
                if kind != OverlapKind::None {
                    found = Some((tile_pos as u64, kind, isect));
                    break;
                }
                tile_pos += 1;
            }
        }

        match found {
            None => self.push_sentinel(),
            Some((pos, kind, isect)) => {
                self.overlapping_tiles.push(OverlappingTile {
                    pos,
                    overlap: kind,
                    region: OverlapRegion::Sparse {
                        coord_box: T::erase(isect),
                    },
                    cell_num: book.tile_cell_num(&schema, pos),
                    cell_ranges: Vec::new(),
                    coords_tile_fetched: false,
                });
                if kind == OverlapKind::PartialContig || kind == OverlapKind::PartialNonContig {
                    self.compute_cell_ranges::<T>()?;
                }
            }
        }
        self.reap();
        Ok(())
    }

    // ========================================================================
    // Reaper
    // ========================================================================

    /// Retire the prefix of overlapping tiles that every requested
    /// attribute has consumed and rebase all cursors, bounding memory
    /// regardless of attribute drift.
    pub(crate) fn reap(&mut self) {
        let min_pos = self
            .query
            .attributes
            .iter()
            .map(|&a| self.tile_pos[a])
            .min()
            .unwrap_or(0);
        if min_pos == 0 {
            return;
        }
        self.overlapping_tiles.drain(..min_pos);
        for pos in self.tile_pos.iter_mut() {
            if *pos != 0 {
                *pos -= min_pos;
            }
        }
        self.coords_slot_entry = match self.coords_slot_entry {
            Some(entry) if entry >= min_pos => Some(entry - min_pos),
            _ => None,
        };
        tracing::trace!(
            retired = min_pos,
            remaining = self.overlapping_tiles.len(),
            "reaped overlapping tiles"
        );
    }
}
