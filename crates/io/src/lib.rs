// Ledger workbook loading

pub mod xlsx;
pub mod xlsx_styles;

pub use xlsx::{load_grid, LoadOptions};

/// Failures while turning a workbook into a ledger grid.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to open workbook: {0}")]
    Open(String),

    #[error("workbook contains no sheets")]
    NoSheets,

    #[error("sheet '{0}' not found")]
    SheetNotFound(String),

    #[error("failed to read sheet '{sheet}': {message}")]
    Sheet { sheet: String, message: String },

    #[error("failed to read styles: {0}")]
    Styles(String),
}
