use std::collections::{BTreeMap, BTreeSet};

use crate::cache::LedgerIndex;
use crate::model::{FileSide, Match, ReconSummary, TransactionBlock};

/// Compute summary statistics from the matches of one run.
pub fn compute_summary(file1: &LedgerIndex, file2: &LedgerIndex, matches: &[Match]) -> ReconSummary {
    let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
    let mut ids: BTreeSet<&str> = BTreeSet::new();
    let mut matched1: BTreeSet<TransactionBlock> = BTreeSet::new();
    let mut matched2: BTreeSet<TransactionBlock> = BTreeSet::new();

    for m in matches {
        *by_kind.entry(m.kind.to_string()).or_insert(0) += 1;
        ids.insert(m.id.as_str());
        matched1.extend(m.sides(FileSide::File1).iter().map(|s| s.block));
        matched2.extend(m.sides(FileSide::File2).iter().map(|s| s.block));
    }

    let excluded = |index: &LedgerIndex| index.entries.iter().filter(|e| e.resolved.is_err()).count();
    let excluded_file1 = excluded(file1);
    let excluded_file2 = excluded(file2);

    ReconSummary {
        blocks_file1: file1.len(),
        blocks_file2: file2.len(),
        excluded_file1,
        excluded_file2,
        matched_blocks_file1: matched1.len(),
        matched_blocks_file2: matched2.len(),
        unmatched_file1: file1.len().saturating_sub(excluded_file1 + matched1.len()),
        unmatched_file2: file2.len().saturating_sub(excluded_file2 + matched2.len()),
        total_matches: matches.len(),
        distinct_ids: ids.len(),
        by_kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::grid::Layout;
    use crate::cache::BlockEntry;
    use crate::model::{Amount, MatchDetail, MatchKind, MatchSide, ResolvedAmount, Role};

    fn entry(start: usize, resolved: Result<ResolvedAmount, ResolveError>) -> BlockEntry {
        BlockEntry {
            block: TransactionBlock { start, end: start + 1 },
            resolved,
            narration: String::new(),
            text: String::new(),
            voucher: None,
            date: None,
        }
    }

    fn ok(start: usize, role: Role) -> Result<ResolvedAmount, ResolveError> {
        Ok(ResolvedAmount { amount: Amount(100), role, source_row: start })
    }

    fn side(start: usize, role: Role) -> MatchSide {
        MatchSide {
            block: TransactionBlock { start, end: start + 1 },
            first_row: start + 10,
            last_row: start + 11,
            date: None,
            voucher: None,
            narration: String::new(),
            debit: None,
            credit: None,
            amount: Amount(100),
            role,
        }
    }

    fn matched(id: &str, kind: MatchKind, f1: usize, f2: usize) -> Match {
        Match {
            id: id.into(),
            kind,
            file1: vec![side(f1, Role::Lender)],
            file2: vec![side(f2, Role::Borrower)],
            amount: Amount(100),
            detail: MatchDetail::Po { po: "PO-10001".into() },
            audit_info: String::new(),
        }
    }

    #[test]
    fn summary_counts() {
        let file1 = LedgerIndex {
            file_id: "a".into(),
            layout: Layout::default(),
            entries: vec![
                entry(0, ok(0, Role::Lender)),
                entry(2, ok(2, Role::Lender)),
                entry(4, Err(ResolveError::BothSides)),
            ],
        };
        let file2 = LedgerIndex {
            file_id: "b".into(),
            layout: Layout::default(),
            entries: vec![entry(0, ok(0, Role::Borrower)), entry(2, ok(2, Role::Borrower))],
        };
        let matches = vec![
            matched("M001", MatchKind::Po, 0, 0),
            matched("M001", MatchKind::Po, 2, 2),
        ];

        let summary = compute_summary(&file1, &file2, &matches);
        assert_eq!(summary.blocks_file1, 3);
        assert_eq!(summary.excluded_file1, 1);
        assert_eq!(summary.matched_blocks_file1, 2);
        assert_eq!(summary.unmatched_file1, 0);
        assert_eq!(summary.unmatched_file2, 0);
        assert_eq!(summary.total_matches, 2);
        assert_eq!(summary.distinct_ids, 1);
        assert_eq!(summary.by_kind.get("po"), Some(&2));
    }
}
