//! Error types for the fragment read engine.
//!
//! Every variant is fatal to the current `read` call. Buffer overflow,
//! empty attributes, and zero-overlap queries are not errors: the engine
//! returns success with zero or partial bytes written and the overflow flag
//! set appropriately.

use std::io;
use thiserror::Error;
use tilestore_core::CoordType;

#[derive(Error, Debug)]
pub enum ReadError {
    /// The query mode is neither forward nor reverse read. Reserved for
    /// hosts that drive the engine from untyped mode flags.
    #[error("invalid read mode")]
    InvalidMode,

    /// Dispatch found no read path for the schema's coordinate kind.
    #[error("no read path for coordinate type {0}")]
    InvalidCoordType(CoordType),

    /// File open, seek, read, or map failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A tile inflated to an unexpected byte count.
    #[error("decompressed tile is {actual} bytes, expected {expected}")]
    Decompress { expected: usize, actual: usize },

    /// Internal invariant violation.
    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}

pub type Result<T> = std::result::Result<T, ReadError>;
