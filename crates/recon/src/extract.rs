//! Reference extractors over narration text.
//!
//! Every extractor is pure, keeps first-seen order and drops duplicates.
//! No match is an empty result, never an error.

use std::sync::OnceLock;

use regex::Regex;

use crate::blocks::ledger_rows;
use crate::grid::{AnnotatedGrid, Column};
use crate::model::TransactionBlock;

macro_rules! cached_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).unwrap())
        }
    };
}

cached_regex!(lc_re, r"(?i)\b(?:L/C|LC)[-\s]?\d+[/\s]?\d*\b");
cached_regex!(po_re, r"(?i)\bP/?O\s*[-#]?\s*(\d{5,})");
cached_regex!(employee_id_re, r"(?i)(?:\bEmployee\s*[-\s]?\s*)?\bID\s*[:\-#]?\s*(\d{5})\b");
cached_regex!(final_settlement_re, r"(?i)\bfinal\s+settlement\b");
cached_regex!(usd_re, r"(?i)(?:\bUSD|\bUS\$|\$)\s*\.?\s*(\d[\d,]*(?:\.\d+)?)");
cached_regex!(salary_keyword_re, r"\b(?:SALARY|REMUNERATION)\b");
cached_regex!(
    salary_period_re,
    r"\b(?:MONTH|SALARY|REMUNERATION)\s+OF\s+(JANUARY|FEBRUARY|MARCH|APRIL|MAY|JUNE|JULY|AUGUST|SEPTEMBER|OCTOBER|NOVEMBER|DECEMBER)\s*-?\s*(20\d{2}|\d{2})\b"
);
cached_regex!(bonus_keyword_re, r"\bFESTIVAL\s+BONUS\b");
cached_regex!(eid_re, r"\bEID(?:\s*-?\s*UL)?\s*-?\s*(FITR|AZHA)\s*-?\s*(20\d{2})\b");

fn push_unique(out: &mut Vec<String>, value: String) {
    if !out.contains(&value) {
        out.push(value);
    }
}

// ---------------------------------------------------------------------------
// Voucher cross-reference
// ---------------------------------------------------------------------------

/// Whether `voucher` occurs verbatim in `text`. Vouchers shorter than
/// `min_len` characters never match.
pub fn voucher_in_text(voucher: &str, text: &str, min_len: usize) -> bool {
    let voucher = voucher.trim();
    voucher.chars().count() >= min_len.max(1) && text.contains(voucher)
}

// ---------------------------------------------------------------------------
// LC / PO / employee / USD
// ---------------------------------------------------------------------------

/// LC numbers, upper-cased and trimmed (`LC-1234/5`, `L/C 889`).
pub fn lc_numbers(narration: &str) -> Vec<String> {
    let mut out = Vec::new();
    for m in lc_re().find_iter(narration) {
        push_unique(&mut out, m.as_str().trim().to_uppercase());
    }
    out
}

/// PO numbers in canonical `PO-<digits>` form, so `PO#30298`, `P/O 30298`
/// and `PO-30298` compare equal.
pub fn po_numbers(narration: &str) -> Vec<String> {
    let mut out = Vec::new();
    for caps in po_re().captures_iter(narration) {
        push_unique(&mut out, format!("PO-{}", &caps[1]));
    }
    out
}

/// Five-digit employee ids introduced by `ID`, `Employee ID` or `Employee-ID`.
pub fn employee_ids(narration: &str) -> Vec<String> {
    let mut out = Vec::new();
    for caps in employee_id_re().captures_iter(narration) {
        push_unique(&mut out, caps[1].to_string());
    }
    out
}

pub fn has_final_settlement(narration: &str) -> bool {
    final_settlement_re().is_match(narration)
}

/// USD literals after `USD`, `US$` or `$`, commas removed and insignificant
/// zeros trimmed. Compared as text: `1,500.00` and `1500` are equal,
/// `1500.01` is not.
pub fn usd_amounts(narration: &str) -> Vec<String> {
    let mut out = Vec::new();
    for caps in usd_re().captures_iter(narration) {
        push_unique(&mut out, canonical_decimal(&caps[1]));
    }
    out
}

fn canonical_decimal(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| *c != ',').collect();
    let (whole, frac) = digits.split_once('.').unwrap_or((digits.as_str(), ""));
    let whole = whole.trim_start_matches('0');
    let whole = if whole.is_empty() { "0" } else { whole };
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{frac}")
    }
}

// ---------------------------------------------------------------------------
// Salary / festival bonus periods
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeriodKey {
    /// Month name in title case ("January").
    Salary { month: String, year: i32 },
    /// Eid tag ("EID_UL_FITR" or "EID_UL_AZHA").
    FestivalBonus { eid: String, year: i32 },
}

impl PeriodKey {
    pub fn period(&self) -> &str {
        match self {
            Self::Salary { month, .. } => month,
            Self::FestivalBonus { eid, .. } => eid,
        }
    }

    pub fn year(&self) -> i32 {
        match self {
            Self::Salary { year, .. } | Self::FestivalBonus { year, .. } => *year,
        }
    }
}

impl std::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.period(), self.year())
    }
}

/// Upper-case and blank out everything except letters, digits, `-` and spaces.
fn normalize_period_text(text: &str) -> String {
    text.chars()
        .map(|c| {
            let c = c.to_ascii_uppercase();
            if c.is_ascii_alphanumeric() || c == '-' || c == ' ' {
                c
            } else {
                ' '
            }
        })
        .collect()
}

fn title_case(upper: &str) -> String {
    let mut chars = upper.chars();
    match chars.next() {
        Some(first) => first.to_string() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn normalize_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    Some(if raw.len() == 2 { 2000 + year } else { year })
}

/// Salary month keys and festival-bonus Eid keys. A month key needs the
/// SALARY or REMUNERATION keyword; an Eid key needs FESTIVAL BONUS.
pub fn period_keys(narration: &str) -> Vec<PeriodKey> {
    let text = normalize_period_text(narration);
    let mut out = Vec::new();

    if salary_keyword_re().is_match(&text) {
        for caps in salary_period_re().captures_iter(&text) {
            if let Some(year) = normalize_year(&caps[2]) {
                let key = PeriodKey::Salary { month: title_case(&caps[1]), year };
                if !out.contains(&key) {
                    out.push(key);
                }
            }
        }
    }

    if bonus_keyword_re().is_match(&text) {
        for caps in eid_re().captures_iter(&text) {
            if let Some(year) = normalize_year(&caps[2]) {
                let key = PeriodKey::FestivalBonus { eid: format!("EID_UL_{}", &caps[1]), year };
                if !out.contains(&key) {
                    out.push(key);
                }
            }
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Bank account short codes
// ---------------------------------------------------------------------------

const AS_PER_DETAILS: &str = "as per details";

/// Full bank-account name → short codes, read-only for a run.
#[derive(Debug, Clone, Default)]
pub struct BankAccountMapping {
    /// Longest name first, so an account whose name contains another's wins.
    accounts: Vec<(String, Vec<String>)>,
}

/// The account a block resolved to and the short codes it is known by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountCodes<'a> {
    pub account: &'a str,
    pub codes: &'a [String],
}

impl BankAccountMapping {
    pub fn new<I>(accounts: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut accounts: Vec<_> = accounts.into_iter().collect();
        accounts.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        Self { accounts }
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// First configured account name found in `text`, ignoring case.
    pub fn lookup(&self, text: &str) -> Option<AccountCodes<'_>> {
        let haystack = text.to_lowercase();
        self.accounts
            .iter()
            .find(|(name, _)| haystack.contains(&name.to_lowercase()))
            .map(|(name, codes)| AccountCodes { account: name, codes })
    }

    /// Account named by a block: the header particulars, or when they read
    /// "as per details", the first bold body row naming a known account.
    pub fn codes_for_block(&self, grid: &dyn AnnotatedGrid, block: &TransactionBlock) -> Option<AccountCodes<'_>> {
        let particulars = grid.text(block.header(), Column::C)?;
        if particulars.to_lowercase().contains(AS_PER_DETAILS) {
            return ledger_rows(grid, block)
                .iter()
                .find_map(|(_, text)| self.lookup(text));
        }
        self.lookup(&particulars)
    }
}

impl AccountCodes<'_> {
    /// First short code occurring verbatim in `narration`.
    pub fn find_in(&self, narration: &str) -> Option<&str> {
        self.codes
            .iter()
            .find(|code| narration.contains(code.as_str()))
            .map(String::as_str)
    }
}
