//! # Tilestore Core
//!
//! Schema model and tile geometry for the tilestore array engine.
//!
//! This crate provides:
//! - Coordinate scalar dispatch: `CoordType`, `CoordValues`, the `Coordinate`
//!   and `GridCoord` traits
//! - Cell-layout comparators for all 3 orderings (row-major, column-major,
//!   Hilbert)
//! - `ArraySchema` with the tile-grid geometry the fragment read engine
//!   consumes (overlap classification, cell positions, slab sizes)
//! - The `BookKeeping` read-only view of per-fragment metadata
//!
//! ## Design Principles
//!
//! 1. **Typed views over erased storage**: coordinate buffers are stored
//!    type-erased (`CoordValues`) and viewed through `Coordinate`, so scalar
//!    dispatch happens once per read call
//! 2. **Integer tile grids**: tile indices, cell positions, and overlap boxes
//!    relative to a tile are plain `i64`/`u64` regardless of the coordinate
//!    scalar
//! 3. **Strict total ordering**: float coordinates compare via `total_cmp`,
//!    never through a partial order

pub mod book_keeping;
pub mod cell_order;
pub mod error;
pub mod hilbert;
pub mod range;
pub mod schema;
pub mod types;

pub use book_keeping::BookKeeping;
pub use cell_order::{cmp_col_major, cmp_hilbert, cmp_row_major, CellOrder, TileOrder};
pub use error::{Result, SchemaError};
pub use range::{cell_in_range, cell_num_in_range, is_unary_range};
pub use schema::{ArraySchema, Attribute, CellVal, Compression, OverlapKind};
pub use types::{CoordType, CoordValues, Coordinate, GridCoord};

/// Byte width of one variable-cell offset in a fixed-attribute tile.
pub const CELL_VAR_OFFSET_SIZE: usize = 8;

/// Suffix of attribute data files inside a fragment directory.
pub const FILE_SUFFIX: &str = ".dat";

/// Suffix appended to an attribute name for its variable-segment file.
pub const VAR_SUFFIX: &str = "_var";

/// Name of the coordinates pseudo-attribute.
pub const COORDS_NAME: &str = "__coords";
