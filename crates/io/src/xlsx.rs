// Ledger worksheet import (xlsx, xls, xlsb, ods values; emphasis from xlsx)
//
// One-way conversion into the engine's in-memory grid. Only the columns the
// block identifier reads are kept.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{Days, NaiveDate};
use interunit_recon::{Cell, CellValue, Column, Grid, Row};

use crate::xlsx_styles::{self, SheetEmphasis};
use crate::LoadError;

/// Which sheet to read and where the ledger body starts.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Worksheet name. First sheet when absent.
    pub sheet: Option<String>,
    /// 1-based sheet row of the first data row.
    pub data_start_row: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { sheet: None, data_start_row: 10 }
    }
}

/// Load one ledger worksheet as a [`Grid`]. Row 0 of the grid is sheet row
/// `data_start_row`; trailing rows past the last used row are not produced.
pub fn load_grid(path: &Path, options: &LoadOptions) -> Result<Grid, LoadError> {
    let mut workbook: Sheets<_> = open_workbook_auto(path).map_err(|e| LoadError::Open(e.to_string()))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let sheet_name = match &options.sheet {
        Some(name) if sheet_names.iter().any(|s| s == name) => name.clone(),
        Some(name) => return Err(LoadError::SheetNotFound(name.clone())),
        None => sheet_names.first().cloned().ok_or(LoadError::NoSheets)?,
    };

    let range = workbook.worksheet_range(&sheet_name).map_err(|e| LoadError::Sheet {
        sheet: sheet_name.clone(),
        message: e.to_string(),
    })?;

    let emphasis = if is_xlsx(path) {
        xlsx_styles::read_sheet_emphasis(path, &sheet_name)?
    } else {
        log::warn!("{}: not an xlsx archive, bold/italic flags unavailable", path.display());
        SheetEmphasis::default()
    };

    let first_row = options.data_start_row.saturating_sub(1);
    let last_row = range.end().map(|(r, _)| r as usize);
    let mut grid = Grid::new();

    if let Some(last_row) = last_row {
        for row in first_row..=last_row {
            let mut cells = Row::new();
            for col in Column::ALL {
                let sheet_col = col.sheet_index() as usize;
                let value = range
                    .get_value((row as u32, sheet_col as u32))
                    .map(cell_value)
                    .unwrap_or_default();
                let flags = emphasis.get(row, sheet_col);
                cells.set(col, Cell { value, bold: flags.bold, italic: flags.italic });
            }
            grid.push(cells);
        }
    }

    log::info!(
        "{}: sheet '{}', {} data rows from row {} ({} emphasised cells)",
        path.display(),
        sheet_name,
        grid.rows().len(),
        options.data_start_row,
        emphasis.len()
    );
    Ok(grid)
}

fn is_xlsx(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx") || e.eq_ignore_ascii_case("xlsm"))
}

fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.trim().is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        // Store as TRUE/FALSE text
        Data::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::Error(e) => CellValue::Text(format!("#{:?}", e)),
        Data::DateTime(dt) => match serial_to_date(dt.as_f64()) {
            Some(d) => CellValue::Date(d),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => s
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .map_or_else(|| CellValue::Text(s.clone()), CellValue::Date),
        Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

/// Excel serial (1900 date system) to a calendar date, time of day dropped.
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    // Day 0 is 1899-12-30 once the phantom 1900-02-29 is accounted for
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.floor() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use interunit_recon::blocks::identify_blocks;
    use interunit_recon::AnnotatedGrid;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    fn write_ledger(path: &Path, sheet: &str) {
        let mut workbook = Workbook::new();
        let ws = workbook.add_worksheet();
        ws.set_name(sheet).unwrap();

        let bold = Format::new().set_bold();
        let italic = Format::new().set_italic();
        let date = Format::new().set_num_format("dd/mmm/yyyy");

        ws.write_string(0, 0, "Unit A Ltd.").unwrap();
        ws.write_string(8, 0, "Date").unwrap();

        // Sheet row 10: header
        let day = ExcelDateTime::from_ymd(2025, 1, 15).unwrap();
        ws.write_datetime_with_format(9, 0, &day, &date).unwrap();
        ws.write_string(9, 1, "Dr").unwrap();
        ws.write_string_with_format(9, 2, "Interunit Current Account", &bold).unwrap();
        ws.write_string_with_format(9, 5, "JV", &bold).unwrap();
        ws.write_string(9, 6, "70625").unwrap();
        ws.write_number_with_format(9, 7, 75_000_000.0, &bold).unwrap();
        // Sheet row 11: narration
        ws.write_string_with_format(10, 2, "Loan to sister concern MDB#0331", &italic).unwrap();
        // Sheet row 12: terminator
        ws.write_string(11, 1, "Entered By :").unwrap();

        workbook.save(path).unwrap();
    }

    #[test]
    fn test_load_grid_reads_values_and_emphasis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unit_a.xlsx");
        write_ledger(&path, "Ledger");

        let grid = load_grid(&path, &LoadOptions::default()).unwrap();
        assert_eq!(grid.row_count(), 3);

        assert_eq!(grid.value(0, Column::A), &CellValue::Date(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()));
        assert_eq!(grid.text(0, Column::B).as_deref(), Some("Dr"));
        assert!(grid.is_emphasis(0, Column::C));
        assert!(grid.is_emphasis(0, Column::F));
        assert!(!grid.is_emphasis(0, Column::G));
        assert_eq!(grid.value(0, Column::H), &CellValue::Number(75_000_000.0));
        assert!(grid.is_emphasis(0, Column::H));

        assert!(grid.is_alternate_emphasis(1, Column::C));
        assert!(!grid.is_emphasis(1, Column::C));

        let blocks = identify_blocks(&grid).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!((blocks[0].start, blocks[0].end), (0, 2));
    }

    #[test]
    fn test_load_grid_named_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unit_a.xlsx");
        write_ledger(&path, "Ledger");

        let options = LoadOptions { sheet: Some("Ledger".into()), data_start_row: 11 };
        let grid = load_grid(&path, &options).unwrap();
        assert_eq!(grid.row_count(), 2);
        assert!(grid.is_alternate_emphasis(0, Column::C));

        let missing = LoadOptions { sheet: Some("Other".into()), ..LoadOptions::default() };
        assert!(matches!(load_grid(&path, &missing), Err(LoadError::SheetNotFound(name)) if name == "Other"));
    }

    #[test]
    fn test_load_grid_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_grid(&dir.path().join("nope.xlsx"), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LoadError::Open(_)));
    }

    #[test]
    fn test_serial_to_date() {
        assert_eq!(serial_to_date(45672.0), NaiveDate::from_ymd_opt(2025, 1, 15));
        assert_eq!(serial_to_date(45672.75), NaiveDate::from_ymd_opt(2025, 1, 15));
        assert_eq!(serial_to_date(0.5), None);
    }
}
