//! End-to-end dense reads over the write-example fragment.
//!
//! The array is 4x4 with 2x2 tiles, row-major; `a1` holds int32 values
//! `0..16` laid out tile by tile, so a full-domain read returns them in
//! order, while subrange reads pick cells tile-first.

mod common;

use common::*;
use tilestore_core::Compression;
use tilestore_fragment::{IoMode, ReadState};

#[test]
fn full_domain_read_fits_in_one_buffer() {
    let example = dense_example(Compression::None);
    let mut state = new_state(&example, vec![0, 3, 0, 3], vec![0], IoMode::Read);

    let mut buffer = vec![0u8; 64];
    let mut buffers: Vec<&mut [u8]> = vec![&mut buffer];
    let mut sizes = vec![64];
    state.read(&mut buffers, &mut sizes).unwrap();

    assert_eq!(sizes[0], 64);
    assert!(!state.overflow(0));
    assert_eq!(as_i32s(&buffer), (0..16).collect::<Vec<_>>());
}

#[test]
fn interior_range_reads_one_cell_per_tile() {
    let example = dense_example(Compression::None);
    let mut state = new_state(&example, vec![1, 2, 1, 2], vec![0], IoMode::Read);

    let mut buffer = vec![0u8; 32];
    let mut buffers: Vec<&mut [u8]> = vec![&mut buffer];
    let mut sizes = vec![32];
    state.read(&mut buffers, &mut sizes).unwrap();

    // One qualifying cell per tile, tiles in tile order.
    assert_eq!(sizes[0], 16);
    assert!(!state.overflow(0));
    assert_eq!(as_i32s(&buffer[..16]), vec![3, 6, 9, 12]);
}

#[test]
fn overflow_resumes_mid_tile() {
    let example = dense_example(Compression::None);
    let mut state = new_state(&example, vec![0, 3, 0, 3], vec![0], IoMode::Read);

    let mut buffer = vec![0u8; 20];
    let mut buffers: Vec<&mut [u8]> = vec![&mut buffer];
    let mut sizes = vec![20];
    state.read(&mut buffers, &mut sizes).unwrap();
    assert_eq!(sizes[0], 20);
    assert!(state.overflow(0));
    assert_eq!(as_i32s(&buffer[..20]), vec![0, 1, 2, 3, 4]);

    let mut rest = vec![0u8; 64];
    let mut buffers: Vec<&mut [u8]> = vec![&mut rest];
    let mut sizes = vec![64];
    state.read(&mut buffers, &mut sizes).unwrap();
    assert_eq!(sizes[0], 44);
    assert!(!state.overflow(0));
    assert_eq!(as_i32s(&rest[..44]), (5..16).collect::<Vec<_>>());
}

#[test]
fn non_contiguous_range_walks_slabs() {
    let example = dense_example(Compression::None);
    // Middle columns: two disjoint runs in every tile row.
    let mut state = new_state(&example, vec![0, 3, 1, 2], vec![0], IoMode::Read);

    let out = read_all_fixed(&mut state, 0, 64);
    assert_eq!(as_i32s(&out), vec![1, 3, 4, 6, 9, 11, 12, 14]);
}

#[test]
fn non_contiguous_read_survives_tiny_buffers() {
    let example = dense_example(Compression::None);
    let mut state = new_state(&example, vec![0, 3, 1, 2], vec![0], IoMode::Read);

    let out = read_all_fixed(&mut state, 0, 4);
    assert_eq!(as_i32s(&out), vec![1, 3, 4, 6, 9, 11, 12, 14]);
}

#[test]
fn zero_overlap_range_reads_nothing() {
    let example = dense_example(Compression::None);
    // The intersection clamps empty on dimension 1.
    let mut state = new_state(&example, vec![0, 0, 4, 5], vec![0], IoMode::Read);

    let mut buffer = vec![0u8; 64];
    let mut buffers: Vec<&mut [u8]> = vec![&mut buffer];
    let mut sizes = vec![64];
    state.read(&mut buffers, &mut sizes).unwrap();
    assert_eq!(sizes[0], 0);
    assert!(!state.overflow(0));
}

#[test]
fn empty_attribute_reads_zero_bytes() {
    let example = dense_example(Compression::None);
    std::fs::remove_file(example.dir.path().join("a1.dat")).unwrap();
    let mut state = new_state(&example, vec![0, 3, 0, 3], vec![0], IoMode::Read);

    let mut buffer = vec![0u8; 64];
    let mut buffers: Vec<&mut [u8]> = vec![&mut buffer];
    let mut sizes = vec![64];
    state.read(&mut buffers, &mut sizes).unwrap();
    assert_eq!(sizes[0], 0);
    assert!(!state.overflow(0));
}

#[test]
fn gzip_tiles_decompress_to_the_same_cells() {
    let example = dense_example(Compression::Gzip);
    let mut state = new_state(&example, vec![0, 3, 0, 3], vec![0], IoMode::Read);
    let out = read_all_fixed(&mut state, 0, 64);
    assert_eq!(as_i32s(&out), (0..16).collect::<Vec<_>>());

    let mut state = new_state(&example, vec![1, 2, 1, 2], vec![0], IoMode::Read);
    let out = read_all_fixed(&mut state, 0, 64);
    assert_eq!(as_i32s(&out), vec![3, 6, 9, 12]);
}

#[test]
fn gzip_reads_resume_after_overflow() {
    let example = dense_example(Compression::Gzip);
    let mut state = new_state(&example, vec![0, 3, 0, 3], vec![0], IoMode::Read);
    let out = read_all_fixed(&mut state, 0, 12);
    assert_eq!(as_i32s(&out), (0..16).collect::<Vec<_>>());
}

#[test]
fn mmap_mode_matches_read_mode() {
    for compression in [Compression::None, Compression::Gzip] {
        let example = dense_example(compression);
        for range in [
            vec![0i64, 3, 0, 3],
            vec![1, 2, 1, 2],
            vec![0, 3, 1, 2],
            vec![2, 3, 0, 0],
        ] {
            for chunk in [64usize, 12, 4] {
                let mut by_read =
                    new_state(&example, range.clone(), vec![0], IoMode::Read);
                let mut by_mmap =
                    new_state(&example, range.clone(), vec![0], IoMode::Mmap);
                assert_eq!(
                    read_all_fixed(&mut by_read, 0, chunk),
                    read_all_fixed(&mut by_mmap, 0, chunk),
                    "range {range:?} chunk {chunk}"
                );
            }
        }
    }
}

#[test]
fn reverse_mode_is_reserved() {
    let example = dense_example(Compression::None);
    let mut state = ReadState::new(
        std::sync::Arc::clone(&example.schema),
        std::sync::Arc::clone(&example.book),
        example.dir.path(),
        tilestore_fragment::ReadQuery {
            mode: tilestore_fragment::ReadMode::Reverse,
            range: tilestore_core::CoordValues::Int64(vec![0, 3, 0, 3]),
            attributes: vec![0],
        },
        IoMode::Read,
    )
    .unwrap();

    let mut buffer = vec![0u8; 64];
    let mut buffers: Vec<&mut [u8]> = vec![&mut buffer];
    let mut sizes = vec![64];
    state.read(&mut buffers, &mut sizes).unwrap();
    assert_eq!(sizes[0], 64, "reserved mode leaves sizes untouched");
    assert!(!state.overflow(0));
}

#[test]
fn reaper_bounds_retained_tiles() {
    let example = dense_example(Compression::None);
    let mut state = new_state(&example, vec![0, 3, 0, 3], vec![0, 1], IoMode::Read);

    loop {
        let mut a1 = vec![0u8; 16];
        let mut offsets = vec![0u8; 16];
        let mut var = vec![0u8; 8];
        let mut buffers: Vec<&mut [u8]> = vec![&mut a1, &mut offsets, &mut var];
        let mut sizes = vec![16, 16, 8];
        state.read(&mut buffers, &mut sizes).unwrap();

        // Never more than one entry beyond the attributes' drift.
        assert!(
            state.overlapping_tile_count() <= 4,
            "retained {} overlapping tiles",
            state.overlapping_tile_count()
        );
        if !state.overflow(0) && !state.overflow(1) {
            break;
        }
    }
}
