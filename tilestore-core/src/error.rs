//! Error types for tilestore-core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("invalid book-keeping: {0}")]
    InvalidBookKeeping(String),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
