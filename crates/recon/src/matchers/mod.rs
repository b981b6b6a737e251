//! Matching stages.
//!
//! Every stage sees only the residual pool left by higher-priority stages,
//! consumes the blocks it matches, and draws ids from the run-wide
//! [`MatchIds`] counter. Stages 1-7 pair one file-1 block with one file-2
//! block; the aggregated PO stage links one bulk block to several parts.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::cache::{BlockEntry, LedgerIndex};
use crate::extract::BankAccountMapping;
use crate::grid::AnnotatedGrid;
use crate::model::{Amount, AuditNote, FileSide, Match, MatchDetail, MatchKind, MatchSide, ResolvedAmount, Role};

pub mod aggregated_po;
pub mod interunit;
pub mod lc;
pub mod narration;
pub mod po;
pub mod salary;
pub mod settlement;
pub mod usd;

// ---------------------------------------------------------------------------
// Ids
// ---------------------------------------------------------------------------

/// Run-wide match id counter: `M001`, `M002`, ... with no gaps. Passed
/// explicitly into every stage.
#[derive(Debug, Default)]
pub struct MatchIds {
    issued: usize,
}

impl MatchIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> String {
        self.issued += 1;
        format!("M{:03}", self.issued)
    }

    pub fn issued(&self) -> usize {
        self.issued
    }
}

// ---------------------------------------------------------------------------
// Residual pool
// ---------------------------------------------------------------------------

/// Unmatched, resolvable blocks per file, by position in the file's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidualPool {
    file1: BTreeSet<usize>,
    file2: BTreeSet<usize>,
}

impl ResidualPool {
    /// Every block whose header resolved. Unresolvable blocks never enter.
    pub fn new(file1: &LedgerIndex, file2: &LedgerIndex) -> Self {
        let resolvable = |index: &LedgerIndex| -> BTreeSet<usize> {
            index
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.resolved.is_ok())
                .map(|(i, _)| i)
                .collect()
        };
        Self { file1: resolvable(file1), file2: resolvable(file2) }
    }

    fn set(&self, side: FileSide) -> &BTreeSet<usize> {
        match side {
            FileSide::File1 => &self.file1,
            FileSide::File2 => &self.file2,
        }
    }

    pub fn contains(&self, side: FileSide, idx: usize) -> bool {
        self.set(side).contains(&idx)
    }

    /// Remaining block positions in row order.
    pub fn remaining(&self, side: FileSide) -> Vec<usize> {
        self.set(side).iter().copied().collect()
    }

    pub fn len(&self, side: FileSide) -> usize {
        self.set(side).len()
    }

    /// Remove a block. Returns false if it was already gone.
    pub fn consume(&mut self, side: FileSide, idx: usize) -> bool {
        match side {
            FileSide::File1 => self.file1.remove(&idx),
            FileSide::File2 => self.file2.remove(&idx),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage plumbing
// ---------------------------------------------------------------------------

/// Read-only inputs shared by all stages of one run.
pub struct StageContext<'a> {
    pub file1: &'a LedgerIndex,
    pub file2: &'a LedgerIndex,
    pub grid1: &'a dyn AnnotatedGrid,
    pub grid2: &'a dyn AnnotatedGrid,
    pub bank: &'a BankAccountMapping,
    pub min_voucher_len: usize,
}

impl<'a> StageContext<'a> {
    pub fn index(&self, side: FileSide) -> &'a LedgerIndex {
        match side {
            FileSide::File1 => self.file1,
            FileSide::File2 => self.file2,
        }
    }

    pub fn grid(&self, side: FileSide) -> &'a dyn AnnotatedGrid {
        match side {
            FileSide::File1 => self.grid1,
            FileSide::File2 => self.grid2,
        }
    }
}

/// Why a stage passed over a residual block. `idx` is the block's position
/// in its file's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub file: FileSide,
    pub idx: usize,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct StageOutput {
    pub matches: Vec<Match>,
    pub notes: Vec<AuditNote>,
    pub rejections: Vec<Rejection>,
}

pub trait Stage {
    fn kind(&self) -> MatchKind;

    fn run(&self, ctx: &StageContext<'_>, pool: &mut ResidualPool, ids: &mut MatchIds) -> StageOutput;
}

pub fn stage_for(kind: MatchKind) -> Box<dyn Stage> {
    match kind {
        MatchKind::Narration => Box::new(narration::NarrationStage),
        MatchKind::Lc => Box::new(lc::LcStage),
        MatchKind::Po => Box::new(po::PoStage),
        MatchKind::Interunit => Box::new(interunit::InterunitStage),
        MatchKind::Salary => Box::new(salary::SalaryStage),
        MatchKind::Settlement => Box::new(settlement::SettlementStage),
        MatchKind::Usd => Box::new(usd::UsdStage),
        MatchKind::AggregatedPo => Box::new(aggregated_po::AggregatedPoStage),
    }
}

// ---------------------------------------------------------------------------
// One-to-one driver
// ---------------------------------------------------------------------------

/// Opposite roles and exactly equal amounts. Every stage requires it.
pub fn universal_rule(a: &ResolvedAmount, b: &ResolvedAmount) -> bool {
    a.role != b.role && a.amount == b.amount
}

/// A residual block plus whatever a stage extracted from it up front.
pub(crate) struct Candidate<'a, P> {
    pub side: FileSide,
    pub idx: usize,
    pub entry: &'a BlockEntry,
    pub resolved: ResolvedAmount,
    pub prepared: P,
}

/// Why a pair matched.
pub(crate) struct Evidence {
    /// Natural key; with the amount it forms the dedup key.
    pub key: String,
    pub detail: MatchDetail,
    /// Extra audit lines after the heading.
    pub notes: Vec<String>,
}

impl Evidence {
    pub fn new(key: impl Into<String>, detail: MatchDetail) -> Self {
        Self { key: key.into(), detail, notes: Vec::new() }
    }
}

pub(crate) fn candidates<'a, P>(
    ctx: &StageContext<'a>,
    pool: &ResidualPool,
    side: FileSide,
    prepare: &impl Fn(FileSide, &'a BlockEntry) -> P,
) -> Vec<Candidate<'a, P>> {
    let index = ctx.index(side);
    pool.remaining(side)
        .into_iter()
        .filter_map(|idx| {
            let entry = index.entries.get(idx)?;
            let resolved = *entry.resolved.as_ref().ok()?;
            Some(Candidate { side, idx, entry, resolved, prepared: prepare(side, entry) })
        })
        .collect()
}

/// Walk file-1 residual blocks in row order; pair each with the first
/// file-2 residual block that passes the universal rule and `accept`.
/// Blocks left over that share a key with a residual partner get a
/// [`Rejection`] naming the partner.
pub(crate) fn pair_stage<'a, P>(
    kind: MatchKind,
    ctx: &StageContext<'a>,
    pool: &mut ResidualPool,
    ids: &mut MatchIds,
    prepare: impl Fn(FileSide, &'a BlockEntry) -> P,
    accept: impl Fn(&Candidate<'a, P>, &Candidate<'a, P>) -> Option<Evidence>,
) -> StageOutput {
    let left = candidates(ctx, pool, FileSide::File1, &prepare);
    let mut right: Vec<Option<Candidate<'a, P>>> = candidates(ctx, pool, FileSide::File2, &prepare)
        .into_iter()
        .map(Some)
        .collect();

    let mut dedup: HashMap<(String, Amount), String> = HashMap::new();
    let mut matches = Vec::new();

    for a in &left {
        let mut found = None;
        for (pos, slot) in right.iter().enumerate() {
            let Some(b) = slot else { continue };
            if !universal_rule(&a.resolved, &b.resolved) {
                continue;
            }
            if let Some(evidence) = accept(a, b) {
                found = Some((pos, evidence));
                break;
            }
        }
        let Some((pos, evidence)) = found else { continue };
        let Some(b) = right[pos].take() else { continue };

        pool.consume(FileSide::File1, a.idx);
        pool.consume(FileSide::File2, b.idx);

        let id = dedup
            .entry((evidence.key.clone(), a.resolved.amount))
            .or_insert_with(|| ids.next())
            .clone();

        let s1 = match_side(ctx.file1, a.entry, &a.resolved);
        let s2 = match_side(ctx.file2, b.entry, &b.resolved);
        log::debug!(
            "{kind} {id}: file1 row {} <-> file2 row {} on '{}'",
            s1.first_row,
            s2.first_row,
            evidence.key
        );
        let audit_info = audit_text(kind, &evidence.key, &evidence.notes, &[&s1, &s2]);
        matches.push(Match {
            id,
            kind,
            amount: a.resolved.amount,
            detail: evidence.detail,
            audit_info,
            file1: vec![s1],
            file2: vec![s2],
        });
    }

    let rejections = near_misses(kind, ctx, pool, &left, &right, &accept);
    StageOutput { matches, notes: Vec::new(), rejections }
}

/// Residual pairs that share the stage's key but fail the universal rule.
/// Each block gets at most one reason per stage, naming its first such
/// partner.
fn near_misses<'a, P>(
    kind: MatchKind,
    ctx: &StageContext<'a>,
    pool: &ResidualPool,
    left: &[Candidate<'a, P>],
    right: &[Option<Candidate<'a, P>>],
    accept: &impl Fn(&Candidate<'a, P>, &Candidate<'a, P>) -> Option<Evidence>,
) -> Vec<Rejection> {
    let mut out = Vec::new();
    let mut noted: HashSet<usize> = HashSet::new();

    for a in left.iter().filter(|a| pool.contains(FileSide::File1, a.idx)) {
        let miss = right
            .iter()
            .flatten()
            .filter(|b| !universal_rule(&a.resolved, &b.resolved))
            .find_map(|b| accept(a, b).map(|evidence| (b, evidence.key)));
        let Some((b, key)) = miss else { continue };

        out.push(rejection(kind, ctx, &key, a, b));
        if noted.insert(b.idx) {
            out.push(rejection(kind, ctx, &key, b, a));
        }
    }
    out
}

fn rejection<P>(
    kind: MatchKind,
    ctx: &StageContext<'_>,
    key: &str,
    this: &Candidate<'_, P>,
    other: &Candidate<'_, P>,
) -> Rejection {
    let other_row = ctx.index(other.side).layout.sheet_row(other.entry.block.start);
    let why = if this.resolved.role == other.resolved.role {
        format!("both blocks are {}", this.resolved.role)
    } else {
        format!("amounts differ ({} vs {})", this.resolved.amount, other.resolved.amount)
    };
    Rejection {
        file: this.side,
        idx: this.idx,
        reason: format!("{}: {key} with {} row {other_row}, {why}", kind.label(), other.side),
    }
}

/// First key of `left` that also appears in `right`.
pub(crate) fn common_key<'k, K: PartialEq>(left: &'k [K], right: &[K]) -> Option<&'k K> {
    left.iter().find(|k| right.contains(k))
}

// ---------------------------------------------------------------------------
// Match records
// ---------------------------------------------------------------------------

pub(crate) fn match_side(index: &LedgerIndex, entry: &BlockEntry, resolved: &ResolvedAmount) -> MatchSide {
    MatchSide {
        block: entry.block,
        first_row: index.layout.sheet_row(entry.block.start),
        last_row: index.layout.sheet_row(entry.block.end),
        date: entry.date.clone(),
        voucher: entry.voucher.clone(),
        narration: entry.narration.clone(),
        debit: resolved.debit(),
        credit: resolved.credit(),
        amount: resolved.amount,
        role: resolved.role,
    }
}

/// Audit text: heading, stage-specific lines, then amounts per role.
pub(crate) fn audit_text(kind: MatchKind, key: &str, notes: &[String], sides: &[&MatchSide]) -> String {
    let mut lines = vec![format!("{}: {key}", kind.label())];
    lines.extend(notes.iter().cloned());
    for (role, label) in [(Role::Lender, "Lender"), (Role::Borrower, "Borrower")] {
        let amounts: Vec<String> = sides
            .iter()
            .filter(|s| s.role == role)
            .map(|s| s.amount.to_string())
            .collect();
        if !amounts.is_empty() {
            lines.push(format!("{label} Amount: {}", amounts.join(" + ")));
        }
    }
    lines.join("\n")
}
