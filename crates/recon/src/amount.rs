//! Header amount and role resolution.
//!
//! Amounts live on the header row only: column H (debit) or column I
//! (credit). Body rows may contain numbers but are never read here.

use crate::error::ResolveError;
use crate::grid::{AnnotatedGrid, CellValue, Column};
use crate::model::{Amount, ResolvedAmount, Role, TransactionBlock};

/// Resolve a block's amount and role from its header row.
pub fn resolve(grid: &dyn AnnotatedGrid, block: &TransactionBlock) -> Result<ResolvedAmount, ResolveError> {
    let row = block.header();
    let debit = read_amount(grid.value(row, Column::H), Column::H)?;
    let credit = read_amount(grid.value(row, Column::I), Column::I)?;

    let (amount, role) = match (debit, credit) {
        (Some(d), None) => (d, Role::Lender),
        (None, Some(c)) => (c, Role::Borrower),
        (Some(_), Some(_)) => return Err(ResolveError::BothSides),
        (None, None) => return Err(ResolveError::NeitherSide),
    };

    Ok(ResolvedAmount { amount, role, source_row: row })
}

/// `None` for blank or zero cells.
fn read_amount(value: &CellValue, column: Column) -> Result<Option<Amount>, ResolveError> {
    let invalid = |raw: String| ResolveError::InvalidAmount { column, value: raw };

    let parsed = match value {
        CellValue::Empty => return Ok(None),
        CellValue::Text(s) if s.trim().is_empty() => return Ok(None),
        CellValue::Text(s) => parse_amount(s).ok_or_else(|| invalid(s.trim().to_string()))?,
        CellValue::Number(n) => number_to_amount(*n).ok_or_else(|| invalid(n.to_string()))?,
        CellValue::Date(d) => return Err(invalid(d.to_string())),
    };

    Ok((parsed.minor() != 0).then_some(parsed))
}

/// Largest distance from a whole cent still treated as float noise.
const CENT_EPSILON: f64 = 1e-6;

/// Numeric cell to minor units. Formula results carry binary noise
/// (`99.99000000000099`), so a value within [`CENT_EPSILON`] of a whole cent
/// rounds to it; anything further off really has more than two decimals.
fn number_to_amount(n: f64) -> Option<Amount> {
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    let cents = n * 100.0;
    let rounded = cents.round();
    if (cents - rounded).abs() >= CENT_EPSILON || rounded > i64::MAX as f64 {
        return None;
    }
    Some(Amount(rounded as i64))
}

/// Parse a non-negative decimal with at most two fractional digits.
/// Thousands separators are accepted: `75,000,000.00`.
pub fn parse_amount(raw: &str) -> Option<Amount> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    let (whole, frac) = match cleaned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (cleaned, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if frac.len() > 2 {
        return None;
    }

    let whole_minor = if whole.is_empty() {
        0
    } else {
        whole.parse::<i64>().ok()?.checked_mul(100)?
    };
    let frac_minor = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse::<i64>().ok()?,
    };

    whole_minor.checked_add(frac_minor).map(Amount)
}
