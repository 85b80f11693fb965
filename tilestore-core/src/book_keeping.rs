//! Read-only book-keeping view of one fragment.
//!
//! The writer persists this metadata alongside the fragment; the read
//! engine consumes the in-memory view. Offsets index the per-attribute data
//! files; MBRs and bounding coordinates drive sparse range pruning without
//! touching tile bodies.

use crate::error::{Result, SchemaError};
use crate::schema::ArraySchema;
use crate::types::CoordValues;

/// Per-fragment metadata consumed by the read engine.
#[derive(Clone, Debug)]
pub struct BookKeeping {
    /// Per attribute (coordinates slot included): file offset of each tile's
    /// compressed stream. Empty inner vectors for uncompressed attributes,
    /// whose tile `p` lives at `p * tile_size`.
    pub tile_offsets: Vec<Vec<u64>>,
    /// Per variable attribute: file offset of each variable-segment tile.
    pub tile_var_offsets: Vec<Vec<u64>>,
    /// Per variable attribute: logical (decompressed) size of each variable
    /// tile.
    pub tile_var_sizes: Vec<Vec<u64>>,
    /// Sparse only: MBR of each tile (`2*dim` bounds).
    pub mbrs: Vec<CoordValues>,
    /// Sparse only: first and last cell coordinates of each tile in cell
    /// order (`2*dim` values).
    pub bounding_coords: Vec<CoordValues>,
    /// Total tiles in the fragment.
    pub tile_num: u64,
    /// Cells in the terminal, possibly partial tile.
    pub last_tile_cell_num: u64,
}

impl BookKeeping {
    /// Book-keeping of a dense fragment.
    pub fn dense(schema: &ArraySchema, tile_num: u64) -> Self {
        let slots = schema.attribute_num() + 1;
        Self {
            tile_offsets: vec![Vec::new(); slots],
            tile_var_offsets: vec![Vec::new(); schema.attribute_num()],
            tile_var_sizes: vec![Vec::new(); schema.attribute_num()],
            mbrs: Vec::new(),
            bounding_coords: Vec::new(),
            tile_num,
            last_tile_cell_num: schema.cell_num_per_tile(),
        }
    }

    /// Book-keeping of a sparse fragment; validates index lengths.
    pub fn sparse(
        schema: &ArraySchema,
        mbrs: Vec<CoordValues>,
        bounding_coords: Vec<CoordValues>,
        last_tile_cell_num: u64,
    ) -> Result<Self> {
        if mbrs.len() != bounding_coords.len() {
            return Err(SchemaError::InvalidBookKeeping(format!(
                "{} MBRs but {} bounding coordinate pairs",
                mbrs.len(),
                bounding_coords.len()
            )));
        }
        for (i, m) in mbrs.iter().enumerate() {
            if m.len() != 2 * schema.dim_num() || m.coord_type() != schema.coord_type() {
                return Err(SchemaError::InvalidBookKeeping(format!(
                    "MBR {} does not match the schema",
                    i
                )));
            }
        }
        for (i, b) in bounding_coords.iter().enumerate() {
            if b.len() != 2 * schema.dim_num() || b.coord_type() != schema.coord_type() {
                return Err(SchemaError::InvalidBookKeeping(format!(
                    "bounding coordinates {} do not match the schema",
                    i
                )));
            }
        }
        let tile_num = mbrs.len() as u64;
        let slots = schema.attribute_num() + 1;
        Ok(Self {
            tile_offsets: vec![Vec::new(); slots],
            tile_var_offsets: vec![Vec::new(); schema.attribute_num()],
            tile_var_sizes: vec![Vec::new(); schema.attribute_num()],
            mbrs,
            bounding_coords,
            tile_num,
            last_tile_cell_num,
        })
    }

    /// Cells in tile `pos`.
    pub fn tile_cell_num(&self, schema: &ArraySchema, pos: u64) -> u64 {
        if !schema.dense() && pos + 1 == self.tile_num {
            self.last_tile_cell_num
        } else {
            schema.cell_num_per_tile()
        }
    }

    /// Compressed byte span of tile `pos` of an attribute stream, given the
    /// total file size.
    pub fn compressed_tile_span(&self, offsets: &[u64], pos: u64, file_size: u64) -> (u64, u64) {
        let start = offsets[pos as usize];
        let end = if pos + 1 == self.tile_num {
            file_size
        } else {
            offsets[pos as usize + 1]
        };
        (start, end - start)
    }
}
