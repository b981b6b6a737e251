//! Read-only annotated grid: cell values plus bold/italic flags.
//!
//! The engine never touches a spreadsheet API. Loaders (see `interunit-io`)
//! build a [`Grid`]; anything else that can answer [`AnnotatedGrid`] queries
//! works too.

use std::borrow::Cow;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// The fixed ledger column set. D and E carry nothing the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Column {
    /// Date
    A,
    /// Dr/Cr marker, "Entered By :", "Opening Balance"
    B,
    /// Particulars: account name, ledger rows, narration, preparer
    C,
    /// Voucher type
    F,
    /// Voucher number
    G,
    /// Debit
    H,
    /// Credit
    I,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::A,
        Column::B,
        Column::C,
        Column::F,
        Column::G,
        Column::H,
        Column::I,
    ];

    /// Zero-based sheet column index (A = 0).
    pub fn sheet_index(self) -> u16 {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
            Self::F => 5,
            Self::G => 6,
            Self::H => 7,
            Self::I => 8,
        }
    }

    pub fn from_sheet_index(idx: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.sheet_index() == idx)
    }

    fn slot(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
            Self::F => 3,
            Self::G => 4,
            Self::H => 5,
            Self::I => 6,
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::F => "F",
            Self::G => "G",
            Self::H => "H",
            Self::I => "I",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl CellValue {
    /// Empty cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Display text of the cell, trimmed. `None` when blank.
    ///
    /// Whole numbers render without a fractional part so a numeric voucher
    /// cell `70625.0` reads as `70625`.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Empty => None,
            Self::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then_some(Cow::Borrowed(t))
            }
            Self::Number(n) => Some(Cow::Owned(format_number(*n))),
            Self::Date(d) => Some(Cow::Owned(d.format("%d/%b/%Y").to_string())),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cell {
    pub value: CellValue,
    pub bold: bool,
    pub italic: bool,
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Self { value: CellValue::Text(s.into()), ..Self::default() }
    }

    pub fn number(n: f64) -> Self {
        Self { value: CellValue::Number(n), ..Self::default() }
    }

    pub fn date(d: NaiveDate) -> Self {
        Self { value: CellValue::Date(d), ..Self::default() }
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Grid capability
// ---------------------------------------------------------------------------

static BLANK: Cell = Cell { value: CellValue::Empty, bold: false, italic: false };

/// Per-cell value and emphasis queries over data rows (index 0 is the first
/// data row, not the first sheet row). Out-of-range lookups read as blank.
pub trait AnnotatedGrid: Sync {
    fn row_count(&self) -> usize;

    fn cell(&self, row: usize, col: Column) -> &Cell;

    fn value(&self, row: usize, col: Column) -> &CellValue {
        &self.cell(row, col).value
    }

    /// Primary emphasis (bold).
    fn is_emphasis(&self, row: usize, col: Column) -> bool {
        self.cell(row, col).bold
    }

    /// Secondary emphasis (italic).
    fn is_alternate_emphasis(&self, row: usize, col: Column) -> bool {
        self.cell(row, col).italic
    }

    fn text(&self, row: usize, col: Column) -> Option<Cow<'_, str>> {
        self.value(row, col).as_text()
    }

    fn is_blank(&self, row: usize, col: Column) -> bool {
        self.value(row, col).is_blank()
    }
}

/// One data row: the seven ledger columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: [Cell; 7],
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, col: Column, cell: Cell) -> Self {
        self.set(col, cell);
        self
    }

    pub fn set(&mut self, col: Column, cell: Cell) {
        self.cells[col.slot()] = cell;
    }

    pub fn get(&self, col: Column) -> &Cell {
        &self.cells[col.slot()]
    }
}

/// In-memory annotated grid. Frozen once built: the engine only reads it.
#[derive(Debug, Clone, Default)]
pub struct Grid {
    rows: Vec<Row>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

impl AnnotatedGrid for Grid {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn cell(&self, row: usize, col: Column) -> &Cell {
        self.rows.get(row).map(|r| r.get(col)).unwrap_or(&BLANK)
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Where data rows start in the sheet. Ledger exports carry 8 metadata rows
/// and a column-label row, so data begins at sheet row 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub data_start_row: usize,
}

impl Default for Layout {
    fn default() -> Self {
        Self { data_start_row: 10 }
    }
}

impl Layout {
    /// 1-based sheet row for a data-row index.
    pub fn sheet_row(&self, index: usize) -> usize {
        index + self.data_start_row
    }

    /// Data-row index for a 1-based sheet row, if it is a data row.
    pub fn data_index(&self, sheet_row: usize) -> Option<usize> {
        sheet_row.checked_sub(self.data_start_row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_reads_blank() {
        let grid = Grid::from_rows(vec![Row::new().with(Column::C, Cell::text("x").bold())]);
        assert!(grid.is_emphasis(0, Column::C));
        assert!(grid.is_blank(5, Column::C));
        assert!(!grid.is_emphasis(5, Column::C));
    }

    #[test]
    fn numeric_voucher_reads_as_integer_text() {
        assert_eq!(CellValue::Number(70625.0).as_text().as_deref(), Some("70625"));
        assert_eq!(CellValue::Number(12.5).as_text().as_deref(), Some("12.5"));
        assert_eq!(CellValue::Text("  ".into()).as_text(), None);
    }

    #[test]
    fn layout_offset() {
        let layout = Layout::default();
        assert_eq!(layout.sheet_row(0), 10);
        assert_eq!(layout.data_index(12), Some(2));
        assert_eq!(layout.data_index(3), None);
    }

    #[test]
    fn column_sheet_indices() {
        assert_eq!(Column::from_sheet_index(7), Some(Column::H));
        assert_eq!(Column::from_sheet_index(3), None);
    }
}
