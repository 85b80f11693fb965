#![allow(dead_code)]

//! Shared fixtures for the read-engine integration tests.
//!
//! Builds on-disk fragments matching the engine's layout: one `<attr>.dat`
//! file per fixed attribute, `<attr>_var.dat` for variable segments, and
//! `__coords.dat` for sparse coordinates.

use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tilestore_core::{
    ArraySchema, Attribute, BookKeeping, CellOrder, CellVal, Compression, CoordValues, TileOrder,
    COORDS_NAME, FILE_SUFFIX, VAR_SUFFIX,
};
use tilestore_fragment::{IoMode, ReadMode, ReadQuery, ReadState};

/// 2-D dense 4x4 array, 2x2 tiles, row-major, int64 coordinates.
pub fn dense_schema(attributes: Vec<Attribute>) -> Arc<ArraySchema> {
    Arc::new(
        ArraySchema::new(
            2,
            CoordValues::Int64(vec![0, 3, 0, 3]),
            Some(CoordValues::Int64(vec![2, 2])),
            attributes,
            Compression::None,
            CellOrder::RowMajor,
            TileOrder::RowMajor,
            0,
            true,
        )
        .unwrap(),
    )
}

pub fn fixed_attr(name: &str, bytes: usize, compression: Compression) -> Attribute {
    Attribute {
        name: name.into(),
        cell_val: CellVal::Fixed(bytes),
        compression,
    }
}

pub fn var_attr(name: &str, compression: Compression) -> Attribute {
    Attribute {
        name: name.into(),
        cell_val: CellVal::Var,
        compression,
    }
}

pub fn write_attr_file(dir: &Path, name: &str, bytes: &[u8]) {
    std::fs::write(dir.join(format!("{name}{FILE_SUFFIX}")), bytes).unwrap();
}

pub fn write_var_file(dir: &Path, name: &str, bytes: &[u8]) {
    std::fs::write(dir.join(format!("{name}{VAR_SUFFIX}{FILE_SUFFIX}")), bytes).unwrap();
}

pub fn write_coords_file(dir: &Path, bytes: &[u8]) {
    write_attr_file(dir, COORDS_NAME, bytes);
}

/// Gzip tiles individually, concatenate, and return the file bytes plus
/// each tile's start offset.
pub fn gzip_tiles(tiles: &[Vec<u8>]) -> (Vec<u8>, Vec<u64>) {
    let mut file = Vec::new();
    let mut offsets = Vec::new();
    for tile in tiles {
        offsets.push(file.len() as u64);
        let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
        encoder.write_all(tile).unwrap();
        file.extend_from_slice(&encoder.finish().unwrap());
    }
    (file, offsets)
}

pub fn le_i32s(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn le_u64s(values: &[u64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn le_i64s(values: &[i64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn as_i32s(bytes: &[u8]) -> Vec<i32> {
    bytes
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

pub fn as_u64s(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

pub fn as_i64s(bytes: &[u8]) -> Vec<i64> {
    bytes
        .chunks_exact(8)
        .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
        .collect()
}

/// The dense write-example fragment: `a1` holds int32 values `0..16`
/// tile by tile, `a2` is the variable attribute `"a", "bb", "ccc",
/// "dddd", ...` with four cells per tile.
pub struct DenseExample {
    pub dir: tempfile::TempDir,
    pub schema: Arc<ArraySchema>,
    pub book: Arc<BookKeeping>,
}

pub const A2_VALUES: &str = "abbcccddddeffggghhhhijjkkkllllmnnooopppp";

pub fn dense_example(compression: Compression) -> DenseExample {
    let schema = dense_schema(vec![
        fixed_attr("a1", 4, compression),
        var_attr("a2", compression),
    ]);
    let dir = tempfile::tempdir().unwrap();

    let a1_tiles: Vec<Vec<u8>> = (0..4)
        .map(|t| le_i32s(&[4 * t, 4 * t + 1, 4 * t + 2, 4 * t + 3]))
        .collect();
    let a2_offset_tiles: Vec<Vec<u8>> = (0..4u64)
        .map(|t| le_u64s(&[10 * t, 10 * t + 1, 10 * t + 3, 10 * t + 6]))
        .collect();
    let a2_var_tiles: Vec<Vec<u8>> = (0..4)
        .map(|t| A2_VALUES.as_bytes()[10 * t..10 * (t + 1)].to_vec())
        .collect();

    let mut book = BookKeeping::dense(&schema, 4);
    match compression {
        Compression::None => {
            write_attr_file(dir.path(), "a1", &a1_tiles.concat());
            write_attr_file(dir.path(), "a2", &a2_offset_tiles.concat());
            write_var_file(dir.path(), "a2", A2_VALUES.as_bytes());
        }
        Compression::Gzip => {
            let (a1_file, a1_offsets) = gzip_tiles(&a1_tiles);
            write_attr_file(dir.path(), "a1", &a1_file);
            book.tile_offsets[0] = a1_offsets;

            let (a2_file, a2_offsets) = gzip_tiles(&a2_offset_tiles);
            write_attr_file(dir.path(), "a2", &a2_file);
            book.tile_offsets[1] = a2_offsets;

            let (a2_var_file, a2_var_offsets) = gzip_tiles(&a2_var_tiles);
            write_var_file(dir.path(), "a2", &a2_var_file);
            book.tile_var_offsets[1] = a2_var_offsets;
            book.tile_var_sizes[1] = a2_var_tiles.iter().map(|t| t.len() as u64).collect();
        }
    }

    DenseExample {
        dir,
        schema,
        book: Arc::new(book),
    }
}

pub fn forward_query(range: Vec<i64>, attributes: Vec<usize>) -> ReadQuery {
    ReadQuery {
        mode: ReadMode::Forward,
        range: CoordValues::Int64(range),
        attributes,
    }
}

/// Drive a single fixed attribute to completion with `chunk`-sized
/// buffers, concatenating the output.
pub fn read_all_fixed(state: &mut ReadState, attr_slot: usize, chunk: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut buffer = vec![0u8; chunk];
        let mut buffers: Vec<&mut [u8]> = vec![&mut buffer];
        let mut sizes = vec![chunk];
        state.read(&mut buffers, &mut sizes).unwrap();
        out.extend_from_slice(&buffer[..sizes[0]]);
        if !state.overflow(attr_slot) {
            return out;
        }
    }
}

pub fn new_state(
    example: &DenseExample,
    range: Vec<i64>,
    attributes: Vec<usize>,
    io_mode: IoMode,
) -> ReadState {
    ReadState::new(
        Arc::clone(&example.schema),
        Arc::clone(&example.book),
        example.dir.path(),
        forward_query(range, attributes),
        io_mode,
    )
    .unwrap()
}
