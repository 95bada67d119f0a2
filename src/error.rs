//! Error taxonomy for the ZeroIPC substrate.
//!
//! Lifecycle operations (`create`, `open`, `Table::add`) return a real
//! [`Error`] so callers can distinguish retriable conditions (`Full`,
//! `Empty`, `Timeout`) from permanent ones (`Invalid`, `NameTooLong`,
//! ...). Hot-path data-structure operations (enqueue/dequeue/push/pop/
//! acquire/...) signal failure with `bool`/`Option` instead, per the
//! propagation policy.

use thiserror::Error;

/// Errors surfaced by segment, table, and lifecycle operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("segment or entry not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    Exists(String),

    #[error("invalid segment: {0}")]
    Invalid(String),

    #[error("name too long (max 31 bytes): {0}")]
    NameTooLong(String),

    #[error("metadata table is full")]
    TableFull,

    #[error("out of space in segment")]
    OutOfSpace,

    #[error("index {index} out of bounds (capacity {capacity})")]
    OutOfBounds { index: u64, capacity: u64 },

    #[error("structure is full")]
    Full,

    #[error("structure is empty")]
    Empty,

    #[error("operation timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
