//! Transaction block identification.
//!
//! A block is a header row (date, Dr/Cr, bold voucher type, plain voucher
//! number, bold amount) followed by body rows and closed by an
//! "Entered By :" row. Formatting decides what a row is; values alone do not.

use chrono::NaiveDate;

use crate::error::BlockError;
use crate::grid::{AnnotatedGrid, CellValue, Column};
use crate::model::TransactionBlock;

/// Text date formats seen in ledger exports when column A is not a real date cell.
const DATE_FORMATS: &[&str] = &["%d/%b/%Y", "%d-%b-%Y", "%d-%b-%y", "%d/%m/%Y", "%Y-%m-%d"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Header,
    OpeningBalance,
    Terminator,
    Other,
}

/// Classify one row. This is the only definition of a header and a terminator.
pub fn classify_row(grid: &dyn AnnotatedGrid, row: usize) -> RowKind {
    let marker = grid.text(row, Column::B);
    let marker = marker.as_deref().unwrap_or("");

    if is_terminator_marker(marker) {
        return RowKind::Terminator;
    }
    if marker.to_ascii_lowercase().contains("opening balance") {
        return RowKind::OpeningBalance;
    }
    if is_header(grid, row, marker) {
        RowKind::Header
    } else {
        RowKind::Other
    }
}

pub fn is_header_row(grid: &dyn AnnotatedGrid, row: usize) -> bool {
    classify_row(grid, row) == RowKind::Header
}

fn is_header(grid: &dyn AnnotatedGrid, row: usize, marker: &str) -> bool {
    let dr_cr = marker.eq_ignore_ascii_case("dr") || marker.eq_ignore_ascii_case("cr");
    if !dr_cr || !has_date(grid.value(row, Column::A)) {
        return false;
    }

    let voucher_type = !grid.is_blank(row, Column::F) && grid.is_emphasis(row, Column::F);
    let voucher_number = !grid.is_blank(row, Column::G)
        && !grid.is_emphasis(row, Column::G)
        && !grid.is_alternate_emphasis(row, Column::G);
    let amount = [Column::H, Column::I]
        .into_iter()
        .any(|c| !grid.is_blank(row, c) && grid.is_emphasis(row, c));

    voucher_type && voucher_number && amount
}

fn is_terminator_marker(marker: &str) -> bool {
    let squashed: String = marker
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    squashed == "enteredby:"
}

fn has_date(value: &CellValue) -> bool {
    match value {
        CellValue::Date(_) => true,
        CellValue::Text(s) => parse_text_date(s).is_some(),
        _ => false,
    }
}

pub fn parse_text_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

// ---------------------------------------------------------------------------
// Identification
// ---------------------------------------------------------------------------

enum State {
    SeekingHeader,
    InBody { start: usize },
}

/// Split the grid into ordered, non-overlapping blocks.
///
/// A header inside an open block or a grid that ends inside a block is a
/// structural error. A terminator with no open block is skipped.
pub fn identify_blocks(grid: &dyn AnnotatedGrid) -> Result<Vec<TransactionBlock>, BlockError> {
    let mut blocks = Vec::new();
    let mut state = State::SeekingHeader;

    for row in 0..grid.row_count() {
        let kind = classify_row(grid, row);
        state = match (state, kind) {
            (State::SeekingHeader, RowKind::Header) => State::InBody { start: row },
            (State::SeekingHeader, RowKind::Terminator) => {
                log::debug!("stray terminator at index {row}, no open block");
                State::SeekingHeader
            }
            (State::SeekingHeader, _) => State::SeekingHeader,
            (State::InBody { start }, RowKind::Header) => {
                return Err(BlockError::Overlapping { open_start: start, row });
            }
            (State::InBody { start }, RowKind::Terminator) => {
                blocks.push(TransactionBlock { start, end: row });
                State::SeekingHeader
            }
            (in_body, _) => in_body,
        };
    }

    if let State::InBody { start } = state {
        return Err(BlockError::Incomplete { start });
    }
    Ok(blocks)
}

/// Nearest header at or above `row`. Used when only a row inside a block is
/// known and the owning block's header is needed.
pub fn find_block_header_for(grid: &dyn AnnotatedGrid, row: usize) -> Option<usize> {
    if grid.row_count() == 0 {
        return None;
    }
    let row = row.min(grid.row_count() - 1);
    (0..=row).rev().find(|&r| is_header_row(grid, r))
}

// ---------------------------------------------------------------------------
// Block text
// ---------------------------------------------------------------------------

/// Italic, non-bold column-C text of the body rows, joined with single spaces.
pub fn narration(grid: &dyn AnnotatedGrid, block: &TransactionBlock) -> String {
    let parts: Vec<String> = block
        .body()
        .filter(|&r| grid.is_alternate_emphasis(r, Column::C) && !grid.is_emphasis(r, Column::C))
        .filter_map(|r| grid.text(r, Column::C).map(|t| t.into_owned()))
        .collect();
    parts.join(" ")
}

/// Bold, non-italic column-C body rows: the ledger accounts posted by the
/// voucher.
pub fn ledger_rows(grid: &dyn AnnotatedGrid, block: &TransactionBlock) -> Vec<(usize, String)> {
    block
        .body()
        .filter(|&r| grid.is_emphasis(r, Column::C) && !grid.is_alternate_emphasis(r, Column::C))
        .filter_map(|r| grid.text(r, Column::C).map(|t| (r, t.into_owned())))
        .collect()
}

/// Header particulars plus narration: the text the voucher cross-reference searches.
pub fn block_text(grid: &dyn AnnotatedGrid, block: &TransactionBlock, narration: &str) -> String {
    match grid.text(block.header(), Column::C) {
        Some(particulars) if narration.is_empty() => particulars.into_owned(),
        Some(particulars) => format!("{particulars} {narration}"),
        None => narration.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Cell, Grid, Row};

    fn header_row(marker: &str) -> Row {
        Row::new()
            .with(Column::A, Cell::date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()))
            .with(Column::B, Cell::text(marker))
            .with(Column::C, Cell::text("Brac Bank PLC").bold())
            .with(Column::F, Cell::text("JV").bold())
            .with(Column::G, Cell::text("VCH123"))
            .with(Column::I, Cell::number(75_000_000.0).bold())
    }

    fn narration_row(text: &str) -> Row {
        Row::new().with(Column::C, Cell::text(text).italic())
    }

    fn ledger_row(text: &str) -> Row {
        Row::new().with(Column::C, Cell::text(text).bold())
    }

    fn terminator() -> Row {
        Row::new()
            .with(Column::B, Cell::text("Entered By :"))
            .with(Column::C, Cell::text("clerk").bold().italic())
    }

    #[test]
    fn single_block() {
        let grid = Grid::from_rows(vec![
            header_row("Cr"),
            ledger_row("Midland Bank"),
            narration_row("Transfer ref MDB#0331"),
            terminator(),
        ]);
        let blocks = identify_blocks(&grid).unwrap();
        assert_eq!(blocks, vec![TransactionBlock { start: 0, end: 3 }]);
        assert_eq!(narration(&grid, &blocks[0]), "Transfer ref MDB#0331");
        assert_eq!(ledger_rows(&grid, &blocks[0]), vec![(1, "Midland Bank".to_string())]);
        assert_eq!(
            block_text(&grid, &blocks[0], "Transfer ref MDB#0331"),
            "Brac Bank PLC Transfer ref MDB#0331"
        );
    }

    #[test]
    fn opening_balance_is_never_a_block() {
        let mut opening = header_row("Opening Balance");
        opening.set(Column::F, Cell::default());
        let grid = Grid::from_rows(vec![opening, header_row("Dr"), terminator()]);
        assert_eq!(classify_row(&grid, 0), RowKind::OpeningBalance);
        assert_eq!(identify_blocks(&grid).unwrap(), vec![TransactionBlock { start: 1, end: 2 }]);
    }

    #[test]
    fn header_needs_formatting_cues() {
        let mut plain_type = header_row("Dr");
        plain_type.set(Column::F, Cell::text("JV"));
        let mut bold_number = header_row("Dr");
        bold_number.set(Column::G, Cell::text("VCH1").bold());
        let mut italic_number = header_row("Dr");
        italic_number.set(Column::G, Cell::text("VCH1").italic());
        let mut plain_amount = header_row("Dr");
        plain_amount.set(Column::I, Cell::number(5.0));
        let mut no_date = header_row("Dr");
        no_date.set(Column::A, Cell::text("Particulars"));

        let grid = Grid::from_rows(vec![plain_type, bold_number, italic_number, plain_amount, no_date]);
        for row in 0..grid.row_count() {
            assert_eq!(classify_row(&grid, row), RowKind::Other, "row {row}");
        }
    }

    #[test]
    fn text_dates_and_case_insensitive_markers() {
        let row = header_row("cr").with(Column::A, Cell::text("01/Jan/2025"));
        let grid = Grid::from_rows(vec![row]);
        assert!(is_header_row(&grid, 0));
        assert!(parse_text_date("2025-01-31").is_some());
        assert!(parse_text_date("Particulars").is_none());
    }

    #[test]
    fn terminator_ignores_case_and_spacing() {
        let grid = Grid::from_rows(vec![
            Row::new().with(Column::B, Cell::text(" ENTERED  BY: ")),
            Row::new().with(Column::B, Cell::text("Entered")),
        ]);
        assert_eq!(classify_row(&grid, 0), RowKind::Terminator);
        assert_eq!(classify_row(&grid, 1), RowKind::Other);
    }

    #[test]
    fn overlapping_header_fails_fast() {
        let grid = Grid::from_rows(vec![header_row("Dr"), narration_row("x"), header_row("Cr"), terminator()]);
        assert_eq!(identify_blocks(&grid), Err(BlockError::Overlapping { open_start: 0, row: 2 }));
    }

    #[test]
    fn unterminated_block_is_reported() {
        let grid = Grid::from_rows(vec![header_row("Dr"), terminator(), header_row("Cr"), narration_row("x")]);
        assert_eq!(identify_blocks(&grid), Err(BlockError::Incomplete { start: 2 }));
    }

    #[test]
    fn stray_terminator_is_skipped() {
        let grid = Grid::from_rows(vec![terminator(), header_row("Dr"), terminator()]);
        assert_eq!(identify_blocks(&grid).unwrap(), vec![TransactionBlock { start: 1, end: 2 }]);
    }

    #[test]
    fn backward_header_search() {
        let grid = Grid::from_rows(vec![
            Row::new(),
            header_row("Dr"),
            narration_row("a"),
            terminator(),
            header_row("Cr"),
            narration_row("b"),
            terminator(),
        ]);
        assert_eq!(find_block_header_for(&grid, 0), None);
        assert_eq!(find_block_header_for(&grid, 3), Some(1));
        assert_eq!(find_block_header_for(&grid, 5), Some(4));
        assert_eq!(find_block_header_for(&grid, 100), Some(4));
    }

    #[test]
    fn ledger_rows_skip_bold_italic() {
        let grid = Grid::from_rows(vec![
            header_row("Dr"),
            Row::new().with(Column::C, Cell::text("Prepared by accounts").bold().italic()),
            ledger_row("Midland Bank"),
            terminator(),
        ]);
        let blocks = identify_blocks(&grid).unwrap();
        assert_eq!(ledger_rows(&grid, &blocks[0]), vec![(2, "Midland Bank".to_string())]);
    }

    #[test]
    fn narration_skips_bold_italic() {
        let grid = Grid::from_rows(vec![
            header_row("Dr"),
            narration_row("first"),
            Row::new().with(Column::C, Cell::text("bold italic").bold().italic()),
            narration_row("second"),
            terminator(),
        ]);
        let block = TransactionBlock { start: 0, end: 4 };
        assert_eq!(narration(&grid, &block), "first second");
    }
}
