use std::collections::BTreeMap;
use std::ops::{Range, RangeInclusive};

use serde::{Deserialize, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// Inclusive data-row range `[start, end]`: header at `start`, terminator at
/// `end`, body strictly between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TransactionBlock {
    pub start: usize,
    pub end: usize,
}

impl TransactionBlock {
    pub fn header(&self) -> usize {
        self.start
    }

    pub fn terminator(&self) -> usize {
        self.end
    }

    pub fn body(&self) -> Range<usize> {
        self.start + 1..self.end
    }

    pub fn rows(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }

    pub fn contains(&self, row: usize) -> bool {
        self.start <= row && row <= self.end
    }

    /// Second-to-last row: where exports put the audit text.
    pub fn narration_row(&self) -> usize {
        if self.end > self.start {
            self.end - 1
        } else {
            self.start
        }
    }
}

/// Which side of the reconciliation a block belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSide {
    File1,
    File2,
}

impl FileSide {
    pub fn other(self) -> Self {
        match self {
            Self::File1 => Self::File2,
            Self::File2 => Self::File1,
        }
    }
}

impl std::fmt::Display for FileSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File1 => write!(f, "file1"),
            Self::File2 => write!(f, "file2"),
        }
    }
}

// ---------------------------------------------------------------------------
// Amounts + roles
// ---------------------------------------------------------------------------

/// Exact amount in minor units (two decimal places). Never compared as float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Amount(pub i64);

impl Amount {
    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub fn minor(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Lender = debit populated on the header, Borrower = credit populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Lender,
    Borrower,
}

impl Role {
    pub fn opposite(self) -> Self {
        match self {
            Self::Lender => Self::Borrower,
            Self::Borrower => Self::Lender,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lender => write!(f, "lender"),
            Self::Borrower => write!(f, "borrower"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedAmount {
    pub amount: Amount,
    pub role: Role,
    /// Header data-row index the amount was read from.
    pub source_row: usize,
}

impl ResolvedAmount {
    pub fn debit(&self) -> Option<Amount> {
        (self.role == Role::Lender).then_some(self.amount)
    }

    pub fn credit(&self) -> Option<Amount> {
        (self.role == Role::Borrower).then_some(self.amount)
    }
}

// ---------------------------------------------------------------------------
// Matches
// ---------------------------------------------------------------------------

/// Matching stages in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Narration,
    Lc,
    Po,
    Interunit,
    Salary,
    Settlement,
    Usd,
    AggregatedPo,
}

impl MatchKind {
    pub const PRIORITY: [MatchKind; 8] = [
        MatchKind::Narration,
        MatchKind::Lc,
        MatchKind::Po,
        MatchKind::Interunit,
        MatchKind::Salary,
        MatchKind::Settlement,
        MatchKind::Usd,
        MatchKind::AggregatedPo,
    ];

    /// Heading used in audit text.
    pub fn label(self) -> &'static str {
        match self {
            Self::Narration => "Narration Match",
            Self::Lc => "LC Match",
            Self::Po => "PO Match",
            Self::Interunit => "Interunit Loan Match",
            Self::Salary => "Salary Match",
            Self::Settlement => "Final Settlement Match",
            Self::Usd => "USD Match",
            Self::AggregatedPo => "Aggregated PO Match",
        }
    }
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Narration => write!(f, "narration"),
            Self::Lc => write!(f, "lc"),
            Self::Po => write!(f, "po"),
            Self::Interunit => write!(f, "interunit"),
            Self::Salary => write!(f, "salary"),
            Self::Settlement => write!(f, "settlement"),
            Self::Usd => write!(f, "usd"),
            Self::AggregatedPo => write!(f, "aggregated_po"),
        }
    }
}

/// Stage-specific evidence for a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDetail {
    /// Voucher number found in the other block's text, and which file it came from.
    Narration { voucher: String, voucher_from: FileSide },
    Lc { lc: String },
    Po { po: String },
    /// Lender account short code found in the borrower narration.
    Interunit { account: String, short_code: String, lender: FileSide },
    /// `period` is a month name ("January") or an Eid tag ("EID_UL_FITR").
    Salary { period: String, year: i32 },
    Settlement { employee_id: String, final_settlement: bool },
    Usd { usd: String },
    AggregatedPo { pos: Vec<String>, bulk: FileSide },
}

/// One block's view inside a match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchSide {
    #[serde(skip)]
    pub block: TransactionBlock,
    /// Sheet rows of the header and terminator.
    pub first_row: usize,
    pub last_row: usize,
    pub date: Option<String>,
    pub voucher: Option<String>,
    pub narration: String,
    pub debit: Option<Amount>,
    pub credit: Option<Amount>,
    pub amount: Amount,
    pub role: Role,
}

/// A reconciled link between blocks of the two files. Aggregated matches
/// carry one bulk block on one side and two or more parts on the other.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub id: String,
    pub kind: MatchKind,
    pub file1: Vec<MatchSide>,
    pub file2: Vec<MatchSide>,
    pub amount: Amount,
    pub detail: MatchDetail,
    pub audit_info: String,
}

impl Match {
    pub fn sides(&self, file: FileSide) -> &[MatchSide] {
        match file {
            FileSide::File1 => &self.file1,
            FileSide::File2 => &self.file2,
        }
    }
}

// ---------------------------------------------------------------------------
// Notes + annotations
// ---------------------------------------------------------------------------

/// Recovered per-block condition: excluded header, rejected aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditNote {
    pub file: FileSide,
    /// Sheet row of the block header.
    pub row: usize,
    pub message: String,
}

/// Export-facing row annotation. The match id goes on every row of a matched
/// block; audit text only on the block's narration row. Unmatched blocks get
/// a single row, the narration row, carrying the reasons and no id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowAnnotation {
    pub sheet_row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_info: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Annotations {
    pub file1: Vec<RowAnnotation>,
    pub file2: Vec<RowAnnotation>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconSummary {
    pub blocks_file1: usize,
    pub blocks_file2: usize,
    pub excluded_file1: usize,
    pub excluded_file2: usize,
    pub matched_blocks_file1: usize,
    pub matched_blocks_file2: usize,
    pub unmatched_file1: usize,
    pub unmatched_file2: usize,
    pub total_matches: usize,
    pub distinct_ids: usize,
    pub by_kind: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub file1: String,
    pub file2: String,
    pub stages: Vec<MatchKind>,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: ReconSummary,
    pub matches: Vec<Match>,
    pub notes: Vec<AuditNote>,
    pub annotations: Annotations,
}
