use thiserror::Error;

use crate::grid::Column;

/// Fatal errors: config problems and structural ledger violations.
///
/// Row numbers in structural variants are sheet rows (data index plus the
/// layout offset), so they can be looked up directly in the workbook.
#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (bad short code, empty stage list, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// A header row appeared while the previous block was still open.
    #[error("{file}: block starting at row {open_start} is not terminated before the header at row {row}")]
    OverlappingBlock { file: String, open_start: usize, row: usize },
    /// The grid ended inside an open block.
    #[error("{file}: block starting at row {start} has no 'Entered By :' terminator")]
    IncompleteBlock { file: String, start: usize },
}

/// Structural violation found by the block identifier, in data-row indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("header at index {row} while block from index {open_start} is open")]
    Overlapping { open_start: usize, row: usize },
    #[error("block from index {start} is never terminated")]
    Incomplete { start: usize },
}

/// Per-block header problems. Never fatal: the block is excluded from
/// matching and an audit note is recorded against its header row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("invalid header: both debit and credit are populated")]
    BothSides,
    #[error("invalid header: neither debit nor credit is populated")]
    NeitherSide,
    #[error("invalid amount '{value}' in column {column}")]
    InvalidAmount { column: Column, value: String },
}
