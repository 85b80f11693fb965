//! Per-attribute single-tile scratch buffers.
//!
//! One fixed slot per attribute plus one for coordinates, one variable slot
//! per attribute, and one compressed-scratch slot shared across attributes.
//! A slot is either heap-backed (owned bytes, reused across tiles, grown
//! only for variable segments) or backed by a private copy-on-write memory
//! map (replaced whole per tile; the previous mapping is released when it
//! is dropped).
//!
//! The cursor distinguishes "tile loaded, bytes remaining" from "tile
//! drained, advance": a fresh slot has `len == cursor == 0`.

use memmap2::MmapMut;

enum TileBytes {
    Empty,
    Heap(Vec<u8>),
    Mapped(MmapMut),
}

pub(crate) struct TileSlot {
    bytes: TileBytes,
    /// Logical size of the tile currently held.
    len: usize,
    /// Byte cursor of the consuming attribute into the tile.
    cursor: usize,
}

impl TileSlot {
    pub(crate) fn new() -> Self {
        Self {
            bytes: TileBytes::Empty,
            len: 0,
            cursor: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }

    pub(crate) fn set_cursor(&mut self, cursor: usize) {
        debug_assert!(cursor <= self.len);
        self.cursor = cursor;
    }

    pub(crate) fn advance_cursor(&mut self, bytes: usize) {
        self.set_cursor(self.cursor + bytes);
    }

    /// Bytes of the current tile remain unconsumed.
    pub(crate) fn has_pending(&self) -> bool {
        self.cursor < self.len
    }

    /// Mark the current tile fully consumed.
    pub(crate) fn mark_drained(&mut self) {
        self.cursor = self.len;
    }

    /// The current tile's bytes.
    pub(crate) fn data(&self) -> &[u8] {
        match &self.bytes {
            TileBytes::Empty => &[],
            TileBytes::Heap(v) => &v[..self.len],
            TileBytes::Mapped(m) => &m[..self.len],
        }
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        match &mut self.bytes {
            TileBytes::Empty => &mut [],
            TileBytes::Heap(v) => &mut v[..self.len],
            TileBytes::Mapped(m) => &mut m[..self.len],
        }
    }

    /// Allocated heap capacity, zero when empty or mapped.
    pub(crate) fn heap_capacity(&self) -> usize {
        match &self.bytes {
            TileBytes::Heap(v) => v.len(),
            _ => 0,
        }
    }

    /// Switch the slot to heap backing with at least `capacity` bytes,
    /// reusing (and growing) an existing allocation. Returns the full
    /// allocation.
    pub(crate) fn ensure_heap(&mut self, capacity: usize) -> &mut [u8] {
        match &mut self.bytes {
            TileBytes::Heap(v) => {
                if v.len() < capacity {
                    v.resize(capacity, 0);
                }
            }
            _ => {
                self.bytes = TileBytes::Heap(vec![0u8; capacity]);
            }
        }
        match &mut self.bytes {
            TileBytes::Heap(v) => v,
            _ => unreachable!(),
        }
    }

    /// Install a fresh mapping as the slot's backing. Any previous mapping
    /// is released here.
    pub(crate) fn install_map(&mut self, map: MmapMut, len: usize) {
        debug_assert!(map.len() >= len);
        self.bytes = TileBytes::Mapped(map);
        self.len = len;
        self.cursor = 0;
    }

    /// Declare a freshly loaded tile of `len` bytes and rewind the cursor.
    pub(crate) fn set_loaded(&mut self, len: usize) {
        self.len = len;
        self.cursor = 0;
    }
}
