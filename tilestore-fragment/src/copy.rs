//! Copy engine: streaming qualifying cells from tile buffers into caller
//! output buffers.
//!
//! Every copy shares one backpressure contract: if an output buffer fills
//! before the tile's qualifying cells are exhausted, the per-attribute
//! overflow flag is set and cursors stay positioned for resumption on the
//! next `read` call.
//!
//! Region shapes:
//! - full overlap: one run covering the whole tile
//! - dense partial-contiguous: one run located from the overlap box corner
//! - dense partial-non-contiguous: slab walk (innermost-dimension runs,
//!   skipping the tile bytes between slabs)
//! - sparse partial: the resolver's cell-position interval list, with a
//!   resume index (the contiguous case is the one-interval instance)
//!
//! Variable cells couple every region to the `compute_bytes_to_copy`
//! helper, which picks the largest cell prefix fitting both the offset
//! buffer and the variable buffer, then rebases the emitted offsets into
//! the caller's variable output.

use crate::error::{ReadError, Result};
use crate::read_state::{OverlapRegion, ReadState};
use crate::tile_io::{offset_at, rebase_offsets};
use tilestore_core::{cell_num_in_range, OverlapKind, CELL_VAR_OFFSET_SIZE};

fn corner_lo(cell_box: &[i64]) -> Vec<i64> {
    cell_box.chunks_exact(2).map(|p| p[0]).collect()
}

fn corner_hi(cell_box: &[i64]) -> Vec<i64> {
    cell_box.chunks_exact(2).map(|p| p[1]).collect()
}

impl ReadState {
    fn dense_cell_box(&self, attr: usize) -> Result<Vec<i64>> {
        match &self.current_entry(attr).region {
            OverlapRegion::Dense { cell_box, .. } => Ok(cell_box.clone()),
            _ => Err(ReadError::Internal("dense overlap region expected")),
        }
    }

    // ========================================================================
    // Overlap-kind dispatch
    // ========================================================================

    pub(crate) fn copy_dense(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: usize,
        offset: &mut usize,
    ) -> Result<()> {
        match self.current_entry(attr).overlap {
            OverlapKind::Full => self.copy_full(attr, buffer, size, offset),
            OverlapKind::PartialContig => self.copy_partial_contig_dense(attr, buffer, size, offset),
            OverlapKind::PartialNonContig => {
                self.copy_partial_non_contig_dense(attr, buffer, size, offset)
            }
            OverlapKind::None => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn copy_dense_var(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: usize,
        offset: &mut usize,
        buffer_var: &mut [u8],
        size_var: usize,
        offset_var: &mut usize,
    ) -> Result<()> {
        match self.current_entry(attr).overlap {
            OverlapKind::Full => {
                self.copy_full_var(attr, buffer, size, offset, buffer_var, size_var, offset_var)
            }
            OverlapKind::PartialContig => self.copy_partial_contig_dense_var(
                attr, buffer, size, offset, buffer_var, size_var, offset_var,
            ),
            OverlapKind::PartialNonContig => self.copy_partial_non_contig_dense_var(
                attr, buffer, size, offset, buffer_var, size_var, offset_var,
            ),
            OverlapKind::None => Ok(()),
        }
    }

    pub(crate) fn copy_sparse(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: usize,
        offset: &mut usize,
    ) -> Result<()> {
        match self.current_entry(attr).overlap {
            OverlapKind::Full => self.copy_full(attr, buffer, size, offset),
            OverlapKind::PartialContig | OverlapKind::PartialNonContig => {
                self.copy_partial_sparse(attr, buffer, size, offset)
            }
            OverlapKind::None => Ok(()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn copy_sparse_var(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: usize,
        offset: &mut usize,
        buffer_var: &mut [u8],
        size_var: usize,
        offset_var: &mut usize,
    ) -> Result<()> {
        match self.current_entry(attr).overlap {
            OverlapKind::Full => {
                self.copy_full_var(attr, buffer, size, offset, buffer_var, size_var, offset_var)
            }
            OverlapKind::PartialContig | OverlapKind::PartialNonContig => self
                .copy_partial_sparse_var(
                    attr, buffer, size, offset, buffer_var, size_var, offset_var,
                ),
            OverlapKind::None => Ok(()),
        }
    }

    // ========================================================================
    // Full overlap
    // ========================================================================

    pub(crate) fn copy_full(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: usize,
        offset: &mut usize,
    ) -> Result<()> {
        let slot = &mut self.tiles[attr];
        let left = slot.len() - slot.cursor();
        let free = size - *offset;
        let bytes = left.min(free);
        if bytes != 0 {
            let cursor = slot.cursor();
            buffer[*offset..*offset + bytes].copy_from_slice(&slot.data()[cursor..cursor + bytes]);
            slot.advance_cursor(bytes);
            *offset += bytes;
        }
        if bytes < left {
            self.overflow[attr] = true;
        } else {
            self.advance_tile(attr);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn copy_full_var(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: usize,
        offset: &mut usize,
        buffer_var: &mut [u8],
        size_var: usize,
        offset_var: &mut usize,
    ) -> Result<()> {
        let free = size - *offset;
        let free_var = size_var - *offset_var;
        let len = self.tiles[attr].len();
        let cursor = self.tiles[attr].cursor();
        let left = len - cursor;

        let start_cell = (cursor / CELL_VAR_OFFSET_SIZE) as i64;
        let end_cell = start_cell - 1 + (left.min(free) / CELL_VAR_OFFSET_SIZE) as i64;
        let (bytes, bytes_var) =
            self.compute_bytes_to_copy(attr, start_cell, end_cell, free, free_var);

        if bytes != 0 {
            self.emit_var_region(attr, bytes, bytes_var, buffer, offset, buffer_var, offset_var);
        }

        if self.tiles[attr].cursor() == len {
            self.advance_tile(attr);
        } else {
            self.overflow[attr] = true;
        }
        Ok(())
    }

    // ========================================================================
    // Dense partial overlaps
    // ========================================================================

    pub(crate) fn copy_partial_contig_dense(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: usize,
        offset: &mut usize,
    ) -> Result<()> {
        let free = size - *offset;
        if free == 0 {
            self.overflow[attr] = true;
            return Ok(());
        }

        let cell_box = self.dense_cell_box(attr)?;
        let cell_size = self.schema.cell_size(attr);
        let start_cell = self.schema.cell_pos_in_tile(&corner_lo(&cell_box));
        let start_off = start_cell as usize * cell_size;
        let range_bytes = cell_num_in_range(&cell_box) as usize * cell_size;
        let end_off = start_off + range_bytes - 1;

        let slot = &mut self.tiles[attr];
        if slot.cursor() == 0 {
            slot.set_cursor(start_off);
        }
        let cursor = slot.cursor();
        let left = end_off - cursor + 1;
        let bytes = left.min(free);
        buffer[*offset..*offset + bytes].copy_from_slice(&slot.data()[cursor..cursor + bytes]);
        slot.advance_cursor(bytes);
        *offset += bytes;

        if self.tiles[attr].cursor() == end_off + 1 {
            self.tiles[attr].mark_drained();
            self.advance_tile(attr);
        } else {
            self.overflow[attr] = true;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn copy_partial_contig_dense_var(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: usize,
        offset: &mut usize,
        buffer_var: &mut [u8],
        size_var: usize,
        offset_var: &mut usize,
    ) -> Result<()> {
        let free = size - *offset;
        let free_var = size_var - *offset_var;
        if free == 0 || free_var == 0 {
            self.overflow[attr] = true;
            return Ok(());
        }

        let cell_box = self.dense_cell_box(attr)?;
        let box_start_cell = self.schema.cell_pos_in_tile(&corner_lo(&cell_box)) as usize;
        let box_cells = cell_num_in_range(&cell_box) as usize;
        let box_end_cell = box_start_cell + box_cells - 1;
        let start_off = box_start_cell * CELL_VAR_OFFSET_SIZE;
        let end_off = (box_end_cell + 1) * CELL_VAR_OFFSET_SIZE - 1;

        if self.tiles[attr].cursor() == 0 {
            self.tiles[attr].set_cursor(start_off);
            let var_start = offset_at(self.tiles[attr].data(), box_start_cell) as usize;
            self.tiles_var[attr].set_cursor(var_start);
        }

        let start_cell = (self.tiles[attr].cursor() / CELL_VAR_OFFSET_SIZE) as i64;
        let (bytes, bytes_var) =
            self.compute_bytes_to_copy(attr, start_cell, box_end_cell as i64, free, free_var);
        if bytes == 0 {
            self.overflow[attr] = true;
            return Ok(());
        }

        self.emit_var_region(attr, bytes, bytes_var, buffer, offset, buffer_var, offset_var);

        if self.tiles[attr].cursor() == end_off + 1 {
            self.tiles[attr].mark_drained();
            self.tiles_var[attr].mark_drained();
            self.advance_tile(attr);
        } else {
            self.overflow[attr] = true;
        }
        Ok(())
    }

    pub(crate) fn copy_partial_non_contig_dense(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: usize,
        offset: &mut usize,
    ) -> Result<()> {
        if size - *offset == 0 {
            self.overflow[attr] = true;
            return Ok(());
        }

        let cell_box = self.dense_cell_box(attr)?;
        let cell_size = self.schema.cell_size(attr);
        let range_start_off =
            self.schema.cell_pos_in_tile(&corner_lo(&cell_box)) as usize * cell_size;
        let range_end_off =
            (self.schema.cell_pos_in_tile(&corner_hi(&cell_box)) as usize + 1) * cell_size - 1;
        let range_slab = self.schema.cell_num_in_range_slab(&cell_box) as usize * cell_size;
        let tile_slab = self.schema.cell_num_in_tile_slab() as usize * cell_size;

        if self.tiles[attr].cursor() < range_start_off {
            self.tiles[attr].set_cursor(range_start_off);
        }

        loop {
            let cursor = self.tiles[attr].cursor();
            let slab_start =
                (cursor - range_start_off) / tile_slab * tile_slab + range_start_off;
            let slab_end = slab_start + range_slab - 1;
            let left = slab_end - cursor + 1;
            let free = size - *offset;
            let bytes = left.min(free);
            if bytes != 0 {
                let slot = &mut self.tiles[attr];
                buffer[*offset..*offset + bytes]
                    .copy_from_slice(&slot.data()[cursor..cursor + bytes]);
                slot.advance_cursor(bytes);
                *offset += bytes;
            }

            let cursor = self.tiles[attr].cursor();
            if bytes == left && cursor != range_end_off + 1 {
                // Hop over the tile bytes between this slab and the next.
                self.tiles[attr].set_cursor(cursor + tile_slab - range_slab);
            }
            if self.tiles[attr].cursor() == range_end_off + 1 {
                self.tiles[attr].mark_drained();
                self.advance_tile(attr);
                return Ok(());
            }
            if *offset == size {
                self.overflow[attr] = true;
                return Ok(());
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn copy_partial_non_contig_dense_var(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: usize,
        offset: &mut usize,
        buffer_var: &mut [u8],
        size_var: usize,
        offset_var: &mut usize,
    ) -> Result<()> {
        if size - *offset == 0 || size_var - *offset_var == 0 {
            self.overflow[attr] = true;
            return Ok(());
        }

        let cell_box = self.dense_cell_box(attr)?;
        let range_start_cell = self.schema.cell_pos_in_tile(&corner_lo(&cell_box)) as usize;
        let range_end_cell = self.schema.cell_pos_in_tile(&corner_hi(&cell_box)) as usize;
        let range_start_off = range_start_cell * CELL_VAR_OFFSET_SIZE;
        let range_end_off = (range_end_cell + 1) * CELL_VAR_OFFSET_SIZE - 1;
        let range_slab = self.schema.cell_num_in_range_slab(&cell_box) as usize
            * CELL_VAR_OFFSET_SIZE;
        let tile_slab = self.schema.cell_num_in_tile_slab() as usize * CELL_VAR_OFFSET_SIZE;

        if self.tiles[attr].cursor() < range_start_off {
            self.tiles[attr].set_cursor(range_start_off);
            let var_start = offset_at(self.tiles[attr].data(), range_start_cell) as usize;
            self.tiles_var[attr].set_cursor(var_start);
        }

        loop {
            let cursor = self.tiles[attr].cursor();
            let slab_start =
                (cursor - range_start_off) / tile_slab * tile_slab + range_start_off;
            let slab_end = slab_start + range_slab - 1;
            let start_cell = (cursor / CELL_VAR_OFFSET_SIZE) as i64;
            let end_cell = ((slab_end + 1) / CELL_VAR_OFFSET_SIZE - 1) as i64;
            let free = size - *offset;
            let free_var = size_var - *offset_var;

            let (bytes, bytes_var) =
                self.compute_bytes_to_copy(attr, start_cell, end_cell, free, free_var);
            if bytes == 0 {
                self.overflow[attr] = true;
                return Ok(());
            }

            self.emit_var_region(attr, bytes, bytes_var, buffer, offset, buffer_var, offset_var);

            let cursor = self.tiles[attr].cursor();
            if cursor == range_end_off + 1 {
                self.tiles[attr].mark_drained();
                self.tiles_var[attr].mark_drained();
                self.advance_tile(attr);
                return Ok(());
            }
            if cursor == slab_end + 1 {
                let skipped = cursor + tile_slab - range_slab;
                self.tiles[attr].set_cursor(skipped);
                let var_cursor = if skipped != self.tiles[attr].len() {
                    offset_at(self.tiles[attr].data(), skipped / CELL_VAR_OFFSET_SIZE) as usize
                } else {
                    self.tiles_var[attr].len()
                };
                self.tiles_var[attr].set_cursor(var_cursor);
            }
        }
    }

    // ========================================================================
    // Sparse partial overlaps (interval-list walk)
    // ========================================================================

    pub(crate) fn copy_partial_sparse(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: usize,
        offset: &mut usize,
    ) -> Result<()> {
        let free = size - *offset;
        if free == 0 {
            self.overflow[attr] = true;
            return Ok(());
        }

        let ranges = self.current_entry(attr).cell_ranges.clone();
        if ranges.is_empty() {
            // The MBR overlapped but no cell qualified.
            self.tiles[attr].mark_drained();
            self.advance_tile(attr);
            self.cell_range_pos[attr] = 0;
            return Ok(());
        }

        let cell_size = self.schema.cell_size(attr);
        for i in self.cell_range_pos[attr]..ranges.len() {
            let (first, last) = ranges[i];
            let start_off = first as usize * cell_size;
            let end_off = (last as usize + 1) * cell_size - 1;

            if self.tiles[attr].cursor() < start_off {
                self.tiles[attr].set_cursor(start_off);
            }
            let cursor = self.tiles[attr].cursor();
            let left = end_off - cursor + 1;
            let free = size - *offset;
            let bytes = left.min(free);
            if bytes != 0 {
                let slot = &mut self.tiles[attr];
                buffer[*offset..*offset + bytes]
                    .copy_from_slice(&slot.data()[cursor..cursor + bytes]);
                slot.advance_cursor(bytes);
                *offset += bytes;
            }

            if self.tiles[attr].cursor() != end_off + 1 {
                self.overflow[attr] = true;
                self.cell_range_pos[attr] = i;
                return Ok(());
            }
        }

        self.tiles[attr].mark_drained();
        self.advance_tile(attr);
        self.cell_range_pos[attr] = 0;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn copy_partial_sparse_var(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: usize,
        offset: &mut usize,
        buffer_var: &mut [u8],
        size_var: usize,
        offset_var: &mut usize,
    ) -> Result<()> {
        if size - *offset == 0 || size_var - *offset_var == 0 {
            self.overflow[attr] = true;
            return Ok(());
        }

        let ranges = self.current_entry(attr).cell_ranges.clone();
        if ranges.is_empty() {
            self.tiles[attr].mark_drained();
            self.tiles_var[attr].mark_drained();
            self.advance_tile(attr);
            self.cell_range_pos[attr] = 0;
            return Ok(());
        }

        for i in self.cell_range_pos[attr]..ranges.len() {
            let (first, last) = ranges[i];
            let start_off = first as usize * CELL_VAR_OFFSET_SIZE;
            let end_off = (last as usize + 1) * CELL_VAR_OFFSET_SIZE - 1;

            if self.tiles[attr].cursor() < start_off {
                self.tiles[attr].set_cursor(start_off);
            }
            let start_cell = self.tiles[attr].cursor() / CELL_VAR_OFFSET_SIZE;
            let var_start = offset_at(self.tiles[attr].data(), start_cell) as usize;
            if self.tiles_var[attr].cursor() < var_start {
                self.tiles_var[attr].set_cursor(var_start);
            }

            let free = size - *offset;
            let free_var = size_var - *offset_var;
            let (bytes, bytes_var) =
                self.compute_bytes_to_copy(attr, start_cell as i64, last as i64, free, free_var);
            if bytes != 0 {
                self.emit_var_region(
                    attr, bytes, bytes_var, buffer, offset, buffer_var, offset_var,
                );
            }

            if self.tiles[attr].cursor() != end_off + 1 {
                self.overflow[attr] = true;
                self.cell_range_pos[attr] = i;
                return Ok(());
            }
        }

        self.tiles[attr].mark_drained();
        self.tiles_var[attr].mark_drained();
        self.advance_tile(attr);
        self.cell_range_pos[attr] = 0;
        Ok(())
    }

    // ========================================================================
    // Variable-cell mechanics
    // ========================================================================

    /// Pick how many cells of `[start_cell, end_cell]` fit both output
    /// buffers. Returns `(offset_bytes, variable_bytes)`; `(0, 0)` when not
    /// even the first cell fits.
    ///
    /// The variable byte count of a candidate prefix ending at cell `m` is
    /// `off[m+1] - off[start_cell]`, where `off[cell_num]` falls back to the
    /// variable tile size. When the whole region does not fit the variable
    /// buffer, a binary search finds the largest fitting `m`.
    pub(crate) fn compute_bytes_to_copy(
        &self,
        attr: usize,
        start_cell: i64,
        end_cell: i64,
        free: usize,
        free_var: usize,
    ) -> (usize, usize) {
        if free == 0 || free_var == 0 {
            return (0, 0);
        }
        let max_cells = (free / CELL_VAR_OFFSET_SIZE) as i64;
        if max_cells == 0 {
            return (0, 0);
        }
        let end_cell = end_cell.min(start_cell + max_cells - 1);
        if end_cell < start_cell {
            return (0, 0);
        }

        let tile = self.tiles[attr].data();
        let cell_num = self.current_entry(attr).cell_num as i64;
        let var_total = self.tiles_var[attr].len() as u64;
        let end_offset = |cell: i64| -> u64 {
            if cell < cell_num {
                offset_at(tile, cell as usize)
            } else {
                var_total
            }
        };

        let base = offset_at(tile, start_cell as usize);
        let mut last = end_cell;
        let mut bytes_var = end_offset(end_cell + 1) - base;
        if bytes_var as usize > free_var {
            let (mut lo, mut hi) = (start_cell, end_cell);
            let mut best = None;
            while lo <= hi {
                let med = lo + (hi - lo) / 2;
                if (end_offset(med + 1) - base) as usize <= free_var {
                    best = Some(med);
                    lo = med + 1;
                } else {
                    hi = med - 1;
                }
            }
            match best {
                Some(m) => {
                    last = m;
                    bytes_var = end_offset(m + 1) - base;
                }
                None => return (0, 0),
            }
        }

        (
            (last - start_cell + 1) as usize * CELL_VAR_OFFSET_SIZE,
            bytes_var as usize,
        )
    }

    /// Copy one variable region: `bytes` of offsets (rebased into the
    /// caller's variable output) and `bytes_var` of the variable segment,
    /// advancing all four cursors.
    #[allow(clippy::too_many_arguments)]
    fn emit_var_region(
        &mut self,
        attr: usize,
        bytes: usize,
        bytes_var: usize,
        buffer: &mut [u8],
        offset: &mut usize,
        buffer_var: &mut [u8],
        offset_var: &mut usize,
    ) {
        let cursor = self.tiles[attr].cursor();
        buffer[*offset..*offset + bytes]
            .copy_from_slice(&self.tiles[attr].data()[cursor..cursor + bytes]);
        self.tiles[attr].advance_cursor(bytes);
        rebase_offsets(&mut buffer[*offset..*offset + bytes], *offset_var as u64);
        *offset += bytes;

        let var_cursor = self.tiles_var[attr].cursor();
        buffer_var[*offset_var..*offset_var + bytes_var]
            .copy_from_slice(&self.tiles_var[attr].data()[var_cursor..var_cursor + bytes_var]);
        self.tiles_var[attr].advance_cursor(bytes_var);
        *offset_var += bytes_var;
    }

    // ========================================================================
    // Direct disk-to-caller fast paths (uncompressed attributes)
    // ========================================================================

    pub(crate) fn copy_tile_dense(
        &mut self,
        attr: usize,
        kind: OverlapKind,
        buffer: &mut [u8],
        size: usize,
        offset: &mut usize,
    ) -> Result<()> {
        let free = size - *offset;
        if free == 0 {
            self.overflow[attr] = true;
            return Ok(());
        }
        match kind {
            OverlapKind::Full => {
                let (tile_bytes, pos) = {
                    let entry = self.current_entry(attr);
                    (
                        entry.cell_num as usize * self.schema.cell_size(attr),
                        entry.pos,
                    )
                };
                if tile_bytes <= free {
                    let file_offset = pos * self.schema.tile_size(attr) as u64;
                    self.read_direct(
                        attr,
                        false,
                        file_offset,
                        &mut buffer[*offset..*offset + tile_bytes],
                    )?;
                    *offset += tile_bytes;
                    self.advance_tile(attr);
                } else {
                    self.tile_from_disk(attr)?;
                    self.copy_full(attr, buffer, size, offset)?;
                }
            }
            OverlapKind::PartialContig => {
                let cell_box = self.dense_cell_box(attr)?;
                let cell_size = self.schema.cell_size(attr);
                let result_bytes = cell_num_in_range(&cell_box) as usize * cell_size;
                if result_bytes <= free {
                    let start_off =
                        self.schema.cell_pos_in_tile(&corner_lo(&cell_box)) as usize * cell_size;
                    let pos = self.current_entry(attr).pos;
                    let file_offset =
                        pos * self.schema.tile_size(attr) as u64 + start_off as u64;
                    self.read_direct(
                        attr,
                        false,
                        file_offset,
                        &mut buffer[*offset..*offset + result_bytes],
                    )?;
                    *offset += result_bytes;
                    self.advance_tile(attr);
                } else {
                    self.tile_from_disk(attr)?;
                    self.copy_partial_contig_dense(attr, buffer, size, offset)?;
                }
            }
            _ => return Err(ReadError::Internal("direct path on unsupported overlap")),
        }
        Ok(())
    }

    pub(crate) fn copy_tile_sparse(
        &mut self,
        attr: usize,
        kind: OverlapKind,
        buffer: &mut [u8],
        size: usize,
        offset: &mut usize,
    ) -> Result<()> {
        let free = size - *offset;
        if free == 0 {
            self.overflow[attr] = true;
            return Ok(());
        }
        match kind {
            OverlapKind::Full => {
                let (tile_bytes, pos) = {
                    let entry = self.current_entry(attr);
                    (
                        entry.cell_num as usize * self.schema.cell_size(attr),
                        entry.pos,
                    )
                };
                if tile_bytes <= free {
                    let file_offset = pos * self.schema.tile_size(attr) as u64;
                    self.read_direct(
                        attr,
                        false,
                        file_offset,
                        &mut buffer[*offset..*offset + tile_bytes],
                    )?;
                    *offset += tile_bytes;
                    self.advance_tile(attr);
                } else {
                    self.tile_from_disk(attr)?;
                    self.copy_full(attr, buffer, size, offset)?;
                }
            }
            OverlapKind::PartialContig => {
                let ranges = self.current_entry(attr).cell_ranges.clone();
                if ranges.is_empty() {
                    self.tiles[attr].mark_drained();
                    self.advance_tile(attr);
                    self.cell_range_pos[attr] = 0;
                    return Ok(());
                }
                let (first, last) = ranges[0];
                let cell_size = self.schema.cell_size(attr);
                let result_bytes = (last - first + 1) as usize * cell_size;
                if result_bytes <= free {
                    let pos = self.current_entry(attr).pos;
                    let file_offset = pos * self.schema.tile_size(attr) as u64
                        + first * cell_size as u64;
                    self.read_direct(
                        attr,
                        false,
                        file_offset,
                        &mut buffer[*offset..*offset + result_bytes],
                    )?;
                    *offset += result_bytes;
                    self.advance_tile(attr);
                } else {
                    self.tile_from_disk(attr)?;
                    self.copy_partial_sparse(attr, buffer, size, offset)?;
                }
            }
            _ => return Err(ReadError::Internal("direct path on unsupported overlap")),
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn copy_tile_full_var(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: usize,
        offset: &mut usize,
        buffer_var: &mut [u8],
        size_var: usize,
        offset_var: &mut usize,
    ) -> Result<()> {
        let free = size - *offset;
        let free_var = size_var - *offset_var;
        let (tile_bytes, pos) = {
            let entry = self.current_entry(attr);
            (entry.cell_num as usize * CELL_VAR_OFFSET_SIZE, entry.pos)
        };
        let tile_var_bytes = self.tile_var_size(attr, pos)?;

        if tile_bytes <= free && tile_var_bytes <= free_var {
            let file_offset = pos * self.schema.tile_size(attr) as u64;
            self.read_direct(
                attr,
                false,
                file_offset,
                &mut buffer[*offset..*offset + tile_bytes],
            )?;
            let var_file_offset = offset_at(&buffer[*offset..], 0);
            self.read_direct(
                attr,
                true,
                var_file_offset,
                &mut buffer_var[*offset_var..*offset_var + tile_var_bytes],
            )?;
            rebase_offsets(&mut buffer[*offset..*offset + tile_bytes], *offset_var as u64);
            *offset += tile_bytes;
            *offset_var += tile_var_bytes;
            self.advance_tile(attr);
        } else {
            self.var_tile_from_disk(attr)?;
            self.copy_full_var(attr, buffer, size, offset, buffer_var, size_var, offset_var)?;
        }
        Ok(())
    }
}
