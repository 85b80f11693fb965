//! Tile I/O: reading raw or compressed tiles into the engine's buffers.
//!
//! Two modes: read-syscall (open, seek, read into a heap slot) and mmap
//! (a private copy-on-write map of the byte range, so in-place offset
//! rebasing works on mapped tiles too). Gzip attributes stage the
//! compressed payload in a shared scratch slot and inflate into the
//! destination; the decompressed byte count must match the expected
//! logical tile size.

use crate::error::{ReadError, Result};
use crate::read_state::{IoMode, ReadState};
use crate::tile_slot::TileSlot;
use flate2::read::GzDecoder;
use memmap2::MmapOptions;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tilestore_core::{Compression, CELL_VAR_OFFSET_SIZE, FILE_SUFFIX, VAR_SUFFIX};

/// Read `out.len()` bytes at `offset`.
pub(crate) fn read_exact_at(path: &Path, offset: u64, out: &mut [u8]) -> Result<()> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(out)?;
    Ok(())
}

fn file_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)?.len())
}

/// Map `[offset, offset + len)` of a file as a private copy-on-write
/// region. Page alignment of the offset is handled by the mapping layer.
fn map_range(path: &Path, offset: u64, len: usize) -> Result<memmap2::MmapMut> {
    let file = File::open(path)?;
    let map = unsafe { MmapOptions::new().offset(offset).len(len).map_copy(&file)? };
    Ok(map)
}

/// Inflate a gzip stream into `dst`, requiring an exact fill.
pub(crate) fn gunzip_into(src: &[u8], dst: &mut [u8]) -> Result<()> {
    let expected = dst.len();
    let mut decoder = GzDecoder::new(src);
    let mut written = 0usize;
    while written < expected {
        let n = decoder.read(&mut dst[written..])?;
        if n == 0 {
            return Err(ReadError::Decompress {
                expected,
                actual: written,
            });
        }
        written += n;
    }
    let mut probe = [0u8; 1];
    if decoder.read(&mut probe)? != 0 {
        return Err(ReadError::Decompress {
            expected,
            actual: expected + 1,
        });
    }
    Ok(())
}

/// Little-endian cell offset at index `i` of an offsets stream.
pub(crate) fn offset_at(bytes: &[u8], i: usize) -> u64 {
    let start = i * CELL_VAR_OFFSET_SIZE;
    u64::from_le_bytes(
        bytes[start..start + CELL_VAR_OFFSET_SIZE]
            .try_into()
            .expect("8 offset bytes"),
    )
}

/// Rebase every offset in `region` so the first maps to `new_start`,
/// preserving monotonicity.
pub(crate) fn rebase_offsets(region: &mut [u8], new_start: u64) {
    debug_assert_eq!(region.len() % CELL_VAR_OFFSET_SIZE, 0);
    if region.is_empty() {
        return;
    }
    let first = offset_at(region, 0);
    let count = region.len() / CELL_VAR_OFFSET_SIZE;
    for i in 0..count {
        let value = offset_at(region, i) - first + new_start;
        let start = i * CELL_VAR_OFFSET_SIZE;
        region[start..start + CELL_VAR_OFFSET_SIZE].copy_from_slice(&value.to_le_bytes());
    }
}

impl ReadState {
    pub(crate) fn attr_path(&self, attr: usize) -> PathBuf {
        self.fragment_dir
            .join(format!("{}{}", self.schema.attribute_name(attr), FILE_SUFFIX))
    }

    pub(crate) fn attr_var_path(&self, attr: usize) -> PathBuf {
        self.fragment_dir.join(format!(
            "{}{}{}",
            self.schema.attribute_name(attr),
            VAR_SUFFIX,
            FILE_SUFFIX
        ))
    }

    /// An attribute is empty when its file does not exist.
    pub(crate) fn is_empty_attribute(&self, attr: usize) -> Result<bool> {
        Ok(!self.attr_path(attr).exists())
    }

    // ========================================================================
    // Staged tile loads
    // ========================================================================

    /// Load the fixed-stream tile of the attribute's current overlapping
    /// tile into its slot, decompressing if needed.
    pub(crate) fn tile_from_disk(&mut self, attr: usize) -> Result<()> {
        let entry_idx = self.tile_pos[attr];
        if attr == self.schema.coords_id() {
            return self.coords_tile_into_slot(entry_idx);
        }
        let pos = self.overlapping_tiles[entry_idx].pos;
        let cell_num = self.overlapping_tiles[entry_idx].cell_num;
        self.fixed_tile_into_slot(attr, pos, cell_num)
    }

    /// Materialize the coordinate tile of a specific overlapping-tile
    /// entry in the shared coords slot, unless it is already there. Used
    /// by both the coords attribute's read loop and the cell-range
    /// resolver (which targets the newest entry, not the coords
    /// attribute's cursor).
    pub(crate) fn coords_tile_into_slot(&mut self, entry_idx: usize) -> Result<()> {
        if self.coords_slot_entry == Some(entry_idx) {
            return Ok(());
        }
        let coords_id = self.schema.coords_id();
        let pos = self.overlapping_tiles[entry_idx].pos;
        let cell_num = self.overlapping_tiles[entry_idx].cell_num;
        self.fixed_tile_into_slot(coords_id, pos, cell_num)?;
        self.set_coords_slot_entry(Some(entry_idx));
        Ok(())
    }

    /// Load tile `pos` of an attribute's fixed stream into its slot.
    fn fixed_tile_into_slot(&mut self, attr: usize, pos: u64, cell_num: u64) -> Result<()> {
        let tile_len = cell_num as usize * self.schema.cell_size(attr);
        tracing::trace!(attr, pos, tile_len, "loading tile");
        match self.schema.compression(attr) {
            Compression::None => {
                let offset = pos * self.schema.tile_size(attr) as u64;
                self.raw_tile_into_slot(attr, offset, tile_len, false)
            }
            Compression::Gzip => {
                let path = self.attr_path(attr);
                let fsize = file_size(&path)?;
                let offsets = &self.book.tile_offsets[attr];
                let (offset, clen) = self.book.compressed_tile_span(offsets, pos, fsize);
                self.compressed_into_scratch(&path, offset, clen as usize, attr)?;
                self.inflate_scratch_into_slot(attr, clen as usize, tile_len, false)
            }
        }
    }

    /// Load both streams of a variable attribute's current tile: the
    /// offsets tile into the fixed slot (rebased so the first offset is
    /// zero) and the variable segment into the variable slot.
    pub(crate) fn var_tile_from_disk(&mut self, attr: usize) -> Result<()> {
        let entry_idx = self.tile_pos[attr];
        let pos = self.overlapping_tiles[entry_idx].pos;
        let cell_num = self.overlapping_tiles[entry_idx].cell_num;
        let tile_len = cell_num as usize * CELL_VAR_OFFSET_SIZE;
        let full_tile_size = self.schema.tile_size(attr);
        tracing::trace!(attr, pos, tile_len, "loading variable tile");

        match self.schema.compression(attr) {
            Compression::None => {
                let offset = pos * full_tile_size as u64;
                self.raw_tile_into_slot(attr, offset, tile_len, false)?;

                let first_offset = offset_at(self.tiles[attr].data(), 0);
                let var_len = self.uncompressed_var_tile_size(attr, pos, first_offset)?;
                self.raw_tile_into_slot(attr, first_offset, var_len, true)?;
            }
            Compression::Gzip => {
                let path = self.attr_path(attr);
                let fsize = file_size(&path)?;
                let offsets = &self.book.tile_offsets[attr];
                let (offset, clen) = self.book.compressed_tile_span(offsets, pos, fsize);
                self.compressed_into_scratch(&path, offset, clen as usize, attr)?;
                self.inflate_scratch_into_slot(attr, clen as usize, tile_len, false)?;

                let var_path = self.attr_var_path(attr);
                let var_fsize = file_size(&var_path)?;
                let var_offsets = &self.book.tile_var_offsets[attr];
                let (var_off, var_clen) =
                    self.book.compressed_tile_span(var_offsets, pos, var_fsize);
                let var_len = self.book.tile_var_sizes[attr][pos as usize] as usize;
                self.compressed_into_scratch(&var_path, var_off, var_clen as usize, attr)?;
                self.inflate_scratch_into_slot(attr, var_clen as usize, var_len, true)?;
            }
        }

        // Rebase the offsets tile so the first offset is zero.
        rebase_offsets(self.tiles[attr].data_mut(), 0);
        Ok(())
    }

    /// Read the coordinate tile of one fragment position into a fresh
    /// heap buffer, leaving every slot untouched. Resolver fallback for
    /// when the shared coords slot is mid-copy.
    pub(crate) fn coords_tile_to_vec(&mut self, pos: u64, cell_num: u64) -> Result<Vec<u8>> {
        let coords_id = self.schema.coords_id();
        let tile_len = cell_num as usize * self.schema.cell_size(coords_id);
        let mut out = vec![0u8; tile_len];
        match self.schema.compression(coords_id) {
            Compression::None => {
                let offset = pos * self.schema.tile_size(coords_id) as u64;
                read_exact_at(&self.attr_path(coords_id), offset, &mut out)?;
            }
            Compression::Gzip => {
                let path = self.attr_path(coords_id);
                let fsize = file_size(&path)?;
                let offsets = &self.book.tile_offsets[coords_id];
                let (offset, clen) = self.book.compressed_tile_span(offsets, pos, fsize);
                self.compressed_into_scratch(&path, offset, clen as usize, coords_id)?;
                gunzip_into(&self.compressed.data()[..clen as usize], &mut out)?;
            }
        }
        Ok(out)
    }

    /// Logical size of an uncompressed variable tile: up to the next
    /// tile's first offset, or to the end of the variable file for the
    /// terminal tile.
    fn uncompressed_var_tile_size(&self, attr: usize, pos: u64, first_offset: u64) -> Result<usize> {
        let full_tile_size = self.schema.tile_size(attr) as u64;
        if pos + 1 != self.book.tile_num {
            let mut next_first = [0u8; CELL_VAR_OFFSET_SIZE];
            read_exact_at(
                &self.attr_path(attr),
                (pos + 1) * full_tile_size,
                &mut next_first,
            )?;
            Ok((u64::from_le_bytes(next_first) - first_offset) as usize)
        } else {
            Ok((file_size(&self.attr_var_path(attr))? - first_offset) as usize)
        }
    }

    /// Variable tile size for the direct full-tile path.
    pub(crate) fn tile_var_size(&self, attr: usize, pos: u64) -> Result<usize> {
        match self.schema.compression(attr) {
            Compression::Gzip => Ok(self.book.tile_var_sizes[attr][pos as usize] as usize),
            Compression::None => {
                let full_tile_size = self.schema.tile_size(attr) as u64;
                let mut first = [0u8; CELL_VAR_OFFSET_SIZE];
                read_exact_at(&self.attr_path(attr), pos * full_tile_size, &mut first)?;
                self.uncompressed_var_tile_size(attr, pos, u64::from_le_bytes(first))
            }
        }
    }

    /// Read an uncompressed byte range into the fixed or variable slot of
    /// an attribute, in the configured I/O mode.
    fn raw_tile_into_slot(
        &mut self,
        attr: usize,
        offset: u64,
        len: usize,
        var: bool,
    ) -> Result<()> {
        let path = if var {
            self.attr_var_path(attr)
        } else {
            self.attr_path(attr)
        };
        let capacity = if var { len } else { self.schema.tile_size(attr) };
        let io_mode = self.io_mode;
        let slot = if var {
            &mut self.tiles_var[attr]
        } else {
            &mut self.tiles[attr]
        };
        match io_mode {
            IoMode::Read => {
                let data = slot.ensure_heap(capacity.max(len));
                read_exact_at(&path, offset, &mut data[..len])?;
                slot.set_loaded(len);
            }
            IoMode::Mmap => {
                let map = map_range(&path, offset, len)?;
                slot.install_map(map, len);
            }
        }
        Ok(())
    }

    /// Stage a compressed payload in the shared scratch slot. On first
    /// heap use the scratch is sized to the gzip worst case of a full
    /// tile; it grows whenever a payload exceeds it.
    fn compressed_into_scratch(
        &mut self,
        path: &Path,
        offset: u64,
        len: usize,
        attr: usize,
    ) -> Result<()> {
        match self.io_mode {
            IoMode::Read => {
                let capacity = if self.compressed.heap_capacity() == 0 {
                    let full = self.schema.tile_size(attr);
                    let bound = full + 6 + 5 * full.div_ceil(16834);
                    bound.max(len)
                } else {
                    len
                };
                let data = self.compressed.ensure_heap(capacity);
                read_exact_at(path, offset, &mut data[..len])?;
                self.compressed.set_loaded(len);
            }
            IoMode::Mmap => {
                let map = map_range(path, offset, len)?;
                self.compressed.install_map(map, len);
            }
        }
        Ok(())
    }

    /// Inflate the scratch slot's payload into an attribute slot,
    /// verifying the decompressed size.
    fn inflate_scratch_into_slot(
        &mut self,
        attr: usize,
        compressed_len: usize,
        expected_len: usize,
        var: bool,
    ) -> Result<()> {
        let ReadState {
            compressed,
            tiles,
            tiles_var,
            schema,
            ..
        } = self;
        let slot: &mut TileSlot = if var {
            &mut tiles_var[attr]
        } else {
            &mut tiles[attr]
        };
        let capacity = if var {
            expected_len
        } else {
            schema.tile_size(attr)
        };
        let dst = slot.ensure_heap(capacity.max(expected_len));
        gunzip_into(&compressed.data()[..compressed_len], &mut dst[..expected_len])?;
        slot.set_loaded(expected_len);
        Ok(())
    }

    // ========================================================================
    // Direct disk-to-caller reads
    // ========================================================================

    /// Read an uncompressed byte range of an attribute file straight into
    /// a caller buffer. Used by the direct fast paths; both I/O modes
    /// produce identical bytes, so this always uses plain reads.
    pub(crate) fn read_direct(
        &self,
        attr: usize,
        var: bool,
        offset: u64,
        out: &mut [u8],
    ) -> Result<()> {
        let path = if var {
            self.attr_var_path(attr)
        } else {
            self.attr_path(attr)
        };
        read_exact_at(&path, offset, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression as GzLevel;
    use std::io::Write;

    #[test]
    fn gunzip_exact_roundtrip() {
        let payload: Vec<u8> = (0..200u8).collect();
        let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut out = vec![0u8; payload.len()];
        gunzip_into(&compressed, &mut out).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn gunzip_rejects_size_mismatch() {
        let payload = vec![7u8; 64];
        let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut short = vec![0u8; 32];
        assert!(matches!(
            gunzip_into(&compressed, &mut short),
            Err(ReadError::Decompress { .. })
        ));

        let mut long = vec![0u8; 65];
        assert!(matches!(
            gunzip_into(&compressed, &mut long),
            Err(ReadError::Decompress { .. })
        ));
    }

    #[test]
    fn offset_rebase_preserves_gaps() {
        let mut region = Vec::new();
        for off in [100u64, 101, 103, 106] {
            region.extend_from_slice(&off.to_le_bytes());
        }
        rebase_offsets(&mut region, 10);
        let rebased: Vec<u64> = (0..4).map(|i| offset_at(&region, i)).collect();
        assert_eq!(rebased, vec![10, 11, 13, 16]);
    }
}
