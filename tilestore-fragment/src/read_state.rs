//! Per-(fragment, query) read state.
//!
//! `ReadState` wires the tile I/O layer, the tile buffer cache, the overlap
//! iterator, the cell-range resolver, and the copy engine. One instance
//! serves one query; the caller drives it with repeated `read` calls,
//! supplying fresh buffers whenever the overflow flag reports that the
//! previous ones filled up.
//!
//! The engine is single-threaded cooperative: every operation runs to
//! completion on the calling thread, and any attribute's cursor is strictly
//! non-decreasing across calls.

use crate::error::{ReadError, Result};
use crate::tile_slot::TileSlot;
use std::path::PathBuf;
use std::sync::Arc;
use tilestore_core::{
    ArraySchema, BookKeeping, Compression, CoordType, CoordValues, Coordinate, GridCoord,
    OverlapKind,
};

/// Query mode. Reverse reads are recognized and reserved: the engine
/// returns success without transferring bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMode {
    Forward,
    Reverse,
}

/// How tile bytes reach the engine's buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoMode {
    /// Open, seek, read.
    Read,
    /// Private copy-on-write memory maps.
    Mmap,
}

/// One query against one fragment.
#[derive(Clone, Debug)]
pub struct ReadQuery {
    pub mode: ReadMode,
    /// `2*dim` inclusive bounds in the schema's coordinate kind.
    pub range: CoordValues,
    /// Requested attribute ids; the coordinates pseudo-attribute is
    /// `schema.coords_id()`.
    pub attributes: Vec<usize>,
}

/// Where an overlapping tile's qualifying region lives.
pub(crate) enum OverlapRegion {
    /// Sentinel: no more tiles.
    None,
    /// Dense: integer tile coordinates plus the overlap box relative to the
    /// tile, in cell units.
    Dense {
        tile_coords: Vec<i64>,
        cell_box: Vec<i64>,
    },
    /// Sparse: the overlap box in absolute coordinates.
    Sparse { coord_box: CoordValues },
}

/// One tile of the fragment that overlaps the query range.
pub(crate) struct OverlappingTile {
    /// Position of the tile in the fragment.
    pub(crate) pos: u64,
    pub(crate) overlap: OverlapKind,
    pub(crate) region: OverlapRegion,
    /// Cells in this tile.
    pub(crate) cell_num: u64,
    /// Sparse partial overlaps: ordered, disjoint cell-position intervals.
    pub(crate) cell_ranges: Vec<(u64, u64)>,
    /// Whether this tile's coordinates currently occupy the coords slot.
    pub(crate) coords_tile_fetched: bool,
}

/// Fragment read engine: streams qualifying cells of one query into caller
/// buffers across one or more `read` calls.
pub struct ReadState {
    pub(crate) schema: Arc<ArraySchema>,
    pub(crate) book: Arc<BookKeeping>,
    pub(crate) fragment_dir: PathBuf,
    pub(crate) query: ReadQuery,
    pub(crate) io_mode: IoMode,

    /// Tiles overlapping the range, in strictly increasing position. The
    /// reaper retires the prefix every requested attribute has consumed.
    pub(crate) overlapping_tiles: Vec<OverlappingTile>,
    /// Per slot: index of the attribute's current entry in
    /// `overlapping_tiles`.
    pub(crate) tile_pos: Vec<usize>,
    /// Per slot: resume index into the current tile's cell-range list.
    pub(crate) cell_range_pos: Vec<usize>,
    /// Per slot: output buffers filled up during the current call.
    pub(crate) overflow: Vec<bool>,
    /// Fixed-stream tile buffers, one per attribute plus coordinates.
    pub(crate) tiles: Vec<TileSlot>,
    /// Variable-segment buffers, one per attribute.
    pub(crate) tiles_var: Vec<TileSlot>,
    /// Shared scratch for compressed tile payloads.
    pub(crate) compressed: TileSlot,
    /// Dense: query range mapped into the tile grid (`2*dim` bounds).
    pub(crate) range_in_tile_domain: Vec<i64>,
    /// Sparse: candidate tile interval `[first, last]`.
    pub(crate) tile_search_range: (i64, i64),
    /// Index of the entry whose coordinate tile occupies the coords slot.
    pub(crate) coords_slot_entry: Option<usize>,
}

impl ReadState {
    /// Build the read state for one query and run the one-time overlap
    /// initialization (dense grid bounds or sparse tile search range).
    pub fn new(
        schema: Arc<ArraySchema>,
        book: Arc<BookKeeping>,
        fragment_dir: impl Into<PathBuf>,
        query: ReadQuery,
        io_mode: IoMode,
    ) -> Result<Self> {
        if query.range.len() != 2 * schema.dim_num()
            || query.range.coord_type() != schema.coord_type()
        {
            return Err(ReadError::InvalidCoordType(query.range.coord_type()));
        }
        if query.attributes.is_empty() {
            return Err(ReadError::Internal("no attributes requested"));
        }
        let coords_id = schema.coords_id();
        if query.attributes.iter().any(|&a| a > coords_id) {
            return Err(ReadError::Internal("attribute id out of range"));
        }

        let slots = schema.attribute_num() + 1;
        let mut state = Self {
            tile_pos: vec![0; slots],
            cell_range_pos: vec![0; slots],
            overflow: vec![false; slots],
            tiles: (0..slots).map(|_| TileSlot::new()).collect(),
            tiles_var: (0..schema.attribute_num()).map(|_| TileSlot::new()).collect(),
            compressed: TileSlot::new(),
            overlapping_tiles: Vec::new(),
            range_in_tile_domain: Vec::new(),
            tile_search_range: (0, -1),
            coords_slot_entry: None,
            schema,
            book,
            fragment_dir: fragment_dir.into(),
            query,
            io_mode,
        };

        if state.schema.dense() {
            match state.schema.coord_type() {
                CoordType::Int32 => state.init_dense::<i32>()?,
                CoordType::Int64 => state.init_dense::<i64>()?,
                other => return Err(ReadError::InvalidCoordType(other)),
            }
        } else {
            match state.schema.coord_type() {
                CoordType::Int32 => state.init_sparse::<i32>()?,
                CoordType::Int64 => state.init_sparse::<i64>()?,
                CoordType::Float32 => state.init_sparse::<f32>()?,
                CoordType::Float64 => state.init_sparse::<f64>()?,
            }
        }
        Ok(state)
    }

    /// Whether the last `read` call filled the output buffers of an
    /// attribute before its cells were exhausted.
    pub fn overflow(&self, attribute_id: usize) -> bool {
        self.overflow[attribute_id]
    }

    /// Overlapping tiles currently retained. Bounded by the attributes'
    /// drift: the reaper retires entries every requested attribute has
    /// consumed.
    pub fn overlapping_tile_count(&self) -> usize {
        self.overlapping_tiles.len()
    }

    /// Stream qualifying cells into `buffers`. `sizes[i]` bounds the usable
    /// bytes of `buffers[i]` on entry and reports the bytes written on
    /// return. Variable attributes occupy two consecutive slots: offsets,
    /// then the variable segment.
    pub fn read(&mut self, buffers: &mut [&mut [u8]], sizes: &mut [usize]) -> Result<()> {
        let expected: usize = self
            .query
            .attributes
            .iter()
            .map(|&a| if self.schema.var_size(a) { 2 } else { 1 })
            .sum();
        if buffers.len() != expected || sizes.len() != expected {
            return Err(ReadError::Internal(
                "buffer count does not match requested attributes",
            ));
        }
        for (buffer, &size) in buffers.iter().zip(sizes.iter()) {
            if buffer.len() < size {
                return Err(ReadError::Internal("buffer shorter than declared size"));
            }
        }

        self.reset_overflow();

        match self.query.mode {
            ReadMode::Reverse => Ok(()),
            ReadMode::Forward => self.read_forward(buffers, sizes),
        }
    }

    fn read_forward(&mut self, buffers: &mut [&mut [u8]], sizes: &mut [usize]) -> Result<()> {
        let attributes = self.query.attributes.clone();
        let mut buffer_i = 0;
        for attr in attributes {
            if self.schema.var_size(attr) {
                let (head, tail) = buffers.split_at_mut(buffer_i + 1);
                let buffer = &mut *head[buffer_i];
                let buffer_var = &mut *tail[0];
                let (sh, st) = sizes.split_at_mut(buffer_i + 1);
                self.read_attr_var(attr, buffer, &mut sh[buffer_i], buffer_var, &mut st[0])?;
                buffer_i += 2;
            } else {
                self.read_attr(attr, &mut *buffers[buffer_i], &mut sizes[buffer_i])?;
                buffer_i += 1;
            }
        }
        Ok(())
    }

    fn read_attr(&mut self, attr: usize, buffer: &mut [u8], size: &mut usize) -> Result<()> {
        if *size == 0 {
            self.overflow[attr] = true;
            return Ok(());
        }
        if self.is_empty_attribute(attr)? {
            *size = 0;
            return Ok(());
        }
        if self.schema.dense() {
            match self.schema.coord_type() {
                CoordType::Int32 => self.read_dense_attr::<i32>(attr, buffer, size),
                CoordType::Int64 => self.read_dense_attr::<i64>(attr, buffer, size),
                other => Err(ReadError::InvalidCoordType(other)),
            }
        } else {
            match self.schema.coord_type() {
                CoordType::Int32 => self.read_sparse_attr::<i32>(attr, buffer, size),
                CoordType::Int64 => self.read_sparse_attr::<i64>(attr, buffer, size),
                CoordType::Float32 => self.read_sparse_attr::<f32>(attr, buffer, size),
                CoordType::Float64 => self.read_sparse_attr::<f64>(attr, buffer, size),
            }
        }
    }

    fn read_attr_var(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: &mut usize,
        buffer_var: &mut [u8],
        size_var: &mut usize,
    ) -> Result<()> {
        if *size == 0 || *size_var == 0 {
            self.overflow[attr] = true;
            *size = 0;
            *size_var = 0;
            return Ok(());
        }
        if self.is_empty_attribute(attr)? {
            *size = 0;
            *size_var = 0;
            return Ok(());
        }
        if self.schema.dense() {
            match self.schema.coord_type() {
                CoordType::Int32 => {
                    self.read_dense_attr_var::<i32>(attr, buffer, size, buffer_var, size_var)
                }
                CoordType::Int64 => {
                    self.read_dense_attr_var::<i64>(attr, buffer, size, buffer_var, size_var)
                }
                other => Err(ReadError::InvalidCoordType(other)),
            }
        } else {
            match self.schema.coord_type() {
                CoordType::Int32 => {
                    self.read_sparse_attr_var::<i32>(attr, buffer, size, buffer_var, size_var)
                }
                CoordType::Int64 => {
                    self.read_sparse_attr_var::<i64>(attr, buffer, size, buffer_var, size_var)
                }
                CoordType::Float32 => {
                    self.read_sparse_attr_var::<f32>(attr, buffer, size, buffer_var, size_var)
                }
                CoordType::Float64 => {
                    self.read_sparse_attr_var::<f64>(attr, buffer, size, buffer_var, size_var)
                }
            }
        }
    }

    // ========================================================================
    // Per-attribute read loops
    // ========================================================================

    fn read_dense_attr<T: GridCoord>(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: &mut usize,
    ) -> Result<()> {
        let compression = self.schema.compression(attr);
        let mut offset = 0usize;
        loop {
            // Drain whatever the previous call left in the tile buffer.
            if self.tiles[attr].has_pending() {
                self.copy_dense(attr, buffer, *size, &mut offset)?;
            }
            if self.overflow[attr] {
                *size = offset;
                return Ok(());
            }

            if self.tile_pos[attr] >= self.overlapping_tiles.len() {
                self.next_overlapping_tile_dense::<T>()?;
            }

            let kind = self.current_entry(attr).overlap;
            match kind {
                OverlapKind::None => {
                    *size = offset;
                    return Ok(());
                }
                OverlapKind::Full | OverlapKind::PartialContig
                    if compression == Compression::None =>
                {
                    self.copy_tile_dense(attr, kind, buffer, *size, &mut offset)?;
                }
                _ => {
                    self.tile_from_disk(attr)?;
                    self.copy_dense(attr, buffer, *size, &mut offset)?;
                }
            }

            if self.overflow[attr] {
                *size = offset;
                return Ok(());
            }
        }
    }

    fn read_dense_attr_var<T: GridCoord>(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: &mut usize,
        buffer_var: &mut [u8],
        size_var: &mut usize,
    ) -> Result<()> {
        let compression = self.schema.compression(attr);
        let mut offset = 0usize;
        let mut offset_var = 0usize;
        loop {
            if self.tiles[attr].has_pending() {
                self.copy_dense_var(
                    attr, buffer, *size, &mut offset, buffer_var, *size_var, &mut offset_var,
                )?;
            }
            if self.overflow[attr] {
                *size = offset;
                *size_var = offset_var;
                return Ok(());
            }

            if self.tile_pos[attr] >= self.overlapping_tiles.len() {
                self.next_overlapping_tile_dense::<T>()?;
            }

            let kind = self.current_entry(attr).overlap;
            match kind {
                OverlapKind::None => {
                    *size = offset;
                    *size_var = offset_var;
                    return Ok(());
                }
                OverlapKind::Full if compression == Compression::None => {
                    self.copy_tile_full_var(
                        attr, buffer, *size, &mut offset, buffer_var, *size_var, &mut offset_var,
                    )?;
                }
                _ => {
                    self.var_tile_from_disk(attr)?;
                    self.copy_dense_var(
                        attr, buffer, *size, &mut offset, buffer_var, *size_var, &mut offset_var,
                    )?;
                }
            }

            if self.overflow[attr] {
                *size = offset;
                *size_var = offset_var;
                return Ok(());
            }
        }
    }

    fn read_sparse_attr<T: Coordinate>(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: &mut usize,
    ) -> Result<()> {
        let coords_id = self.schema.coords_id();
        let compression = self.schema.compression(attr);
        let mut offset = 0usize;
        loop {
            if self.slot_pending(attr) {
                self.copy_sparse(attr, buffer, *size, &mut offset)?;
            }
            if self.overflow[attr] {
                *size = offset;
                return Ok(());
            }

            if self.tile_pos[attr] >= self.overlapping_tiles.len() {
                self.next_overlapping_tile_sparse::<T>()?;
            }

            let entry = self.current_entry(attr);
            let kind = entry.overlap;
            if attr == coords_id
                && entry.coords_tile_fetched
                && self.coords_slot_entry == Some(self.tile_pos[attr])
            {
                // The resolver already materialized this tile's coordinates.
                self.copy_sparse(attr, buffer, *size, &mut offset)?;
            } else {
                match kind {
                    OverlapKind::None => {
                        *size = offset;
                        return Ok(());
                    }
                    OverlapKind::Full | OverlapKind::PartialContig
                        if compression == Compression::None =>
                    {
                        self.copy_tile_sparse(attr, kind, buffer, *size, &mut offset)?;
                    }
                    _ => {
                        self.tile_from_disk(attr)?;
                        self.copy_sparse(attr, buffer, *size, &mut offset)?;
                    }
                }
            }

            if self.overflow[attr] {
                *size = offset;
                return Ok(());
            }
        }
    }

    fn read_sparse_attr_var<T: Coordinate>(
        &mut self,
        attr: usize,
        buffer: &mut [u8],
        size: &mut usize,
        buffer_var: &mut [u8],
        size_var: &mut usize,
    ) -> Result<()> {
        let compression = self.schema.compression(attr);
        let mut offset = 0usize;
        let mut offset_var = 0usize;
        loop {
            if self.tiles[attr].has_pending() {
                self.copy_sparse_var(
                    attr, buffer, *size, &mut offset, buffer_var, *size_var, &mut offset_var,
                )?;
            }
            if self.overflow[attr] {
                *size = offset;
                *size_var = offset_var;
                return Ok(());
            }

            if self.tile_pos[attr] >= self.overlapping_tiles.len() {
                self.next_overlapping_tile_sparse::<T>()?;
            }

            let kind = self.current_entry(attr).overlap;
            match kind {
                OverlapKind::None => {
                    *size = offset;
                    *size_var = offset_var;
                    return Ok(());
                }
                OverlapKind::Full if compression == Compression::None => {
                    self.copy_tile_full_var(
                        attr, buffer, *size, &mut offset, buffer_var, *size_var, &mut offset_var,
                    )?;
                }
                _ => {
                    self.var_tile_from_disk(attr)?;
                    self.copy_sparse_var(
                        attr, buffer, *size, &mut offset, buffer_var, *size_var, &mut offset_var,
                    )?;
                }
            }

            if self.overflow[attr] {
                *size = offset;
                *size_var = offset_var;
                return Ok(());
            }
        }
    }

    // ========================================================================
    // Shared state helpers
    // ========================================================================

    pub(crate) fn current_entry(&self, attr: usize) -> &OverlappingTile {
        &self.overlapping_tiles[self.tile_pos[attr]]
    }

    /// Advance an attribute past its current overlapping tile.
    pub(crate) fn advance_tile(&mut self, attr: usize) {
        self.tile_pos[attr] += 1;
    }

    /// Pending bytes in the fixed slot, guarded for the coords slot: the
    /// resolver stages coordinate tiles there on behalf of other
    /// attributes, so the slot only counts as pending for the coords
    /// attribute when it holds that attribute's current tile.
    fn slot_pending(&self, attr: usize) -> bool {
        if !self.tiles[attr].has_pending() {
            return false;
        }
        attr != self.schema.coords_id() || self.coords_slot_entry == Some(self.tile_pos[attr])
    }

    fn reset_overflow(&mut self) {
        for flag in &mut self.overflow {
            *flag = false;
        }
    }

    /// A cloned typed view of the query range.
    pub(crate) fn typed_range<T: Coordinate>(&self) -> Result<Vec<T>> {
        T::values_of(&self.query.range)
            .map(|r| r.to_vec())
            .ok_or(ReadError::Internal("query range kind mismatch"))
    }

    /// Record which overlapping-tile entry owns the coords slot, keeping
    /// the per-entry flags in sync.
    pub(crate) fn set_coords_slot_entry(&mut self, entry: Option<usize>) {
        if let Some(old) = self.coords_slot_entry {
            if let Some(tile) = self.overlapping_tiles.get_mut(old) {
                tile.coords_tile_fetched = false;
            }
        }
        if let Some(new) = entry {
            self.overlapping_tiles[new].coords_tile_fetched = true;
        }
        self.coords_slot_entry = entry;
    }
}
