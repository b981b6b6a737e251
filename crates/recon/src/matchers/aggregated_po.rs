//! Stage 8: one bulk block settled by several PO-specific blocks.
//!
//! A bulk block lists two or more POs in its narration. For each listed PO
//! the first unclaimed opposite-role block on the other file carrying that
//! PO is taken as a part. The aggregate is accepted only when every PO is
//! covered and the parts sum exactly to the bulk amount; otherwise nothing
//! is matched and the bulk block gets an audit note. File 1 bulk blocks are
//! tried first, then file 2.

use std::collections::{HashMap, HashSet};

use crate::extract::po_numbers;
use crate::model::{Amount, AuditNote, FileSide, Match, MatchDetail, MatchKind, MatchSide};

use super::{
    audit_text, candidates, match_side, Candidate, MatchIds, Rejection, ResidualPool, Stage, StageContext, StageOutput,
};

pub struct AggregatedPoStage;

impl Stage for AggregatedPoStage {
    fn kind(&self) -> MatchKind {
        MatchKind::AggregatedPo
    }

    fn run(&self, ctx: &StageContext<'_>, pool: &mut ResidualPool, ids: &mut MatchIds) -> StageOutput {
        let mut out = StageOutput::default();
        let mut dedup: HashMap<(String, Amount), String> = HashMap::new();
        for bulk_side in [FileSide::File1, FileSide::File2] {
            aggregate(ctx, pool, ids, bulk_side, &mut dedup, &mut out);
        }
        out
    }
}

fn aggregate(
    ctx: &StageContext<'_>,
    pool: &mut ResidualPool,
    ids: &mut MatchIds,
    bulk_side: FileSide,
    dedup: &mut HashMap<(String, Amount), String>,
    out: &mut StageOutput,
) {
    let parts_side = bulk_side.other();
    let extract = |_: FileSide, entry: &crate::cache::BlockEntry| po_numbers(&entry.narration);
    let bulks = candidates(ctx, pool, bulk_side, &extract);
    let parts = candidates(ctx, pool, parts_side, &extract);
    let mut claimed: HashSet<usize> = HashSet::new();

    for bulk in bulks.iter().filter(|b| b.prepared.len() >= 2) {
        let bulk_row = ctx.index(bulk_side).layout.sheet_row(bulk.entry.block.start);
        let mut chosen: Vec<&Candidate<'_, Vec<String>>> = Vec::new();
        let mut missing: Vec<&str> = Vec::new();

        for po in &bulk.prepared {
            if chosen.iter().any(|c| c.prepared.contains(po)) {
                continue;
            }
            let part = parts.iter().find(|p| {
                p.resolved.role == bulk.resolved.role.opposite()
                    && !claimed.contains(&p.idx)
                    && !chosen.iter().any(|c| c.idx == p.idx)
                    && p.prepared.contains(po)
            });
            match part {
                Some(p) => chosen.push(p),
                None => missing.push(po),
            }
        }

        if !missing.is_empty() {
            if !chosen.is_empty() {
                let message = format!(
                    "Aggregated PO rejected: {} not found in {parts_side}",
                    missing.join(", ")
                );
                log::debug!("{bulk_side} row {bulk_row}: {message}");
                reject(out, bulk_side, bulk.idx, bulk_row, message);
            }
            continue;
        }
        if chosen.len() < 2 {
            continue;
        }

        let total = chosen
            .iter()
            .try_fold(Amount::default(), |acc, p| acc.checked_add(p.resolved.amount));
        if total != Some(bulk.resolved.amount) {
            let parts_total = total.map_or_else(|| "overflow".to_string(), |t| t.to_string());
            let message = format!(
                "Aggregated PO rejected: parts sum to {parts_total}, bulk amount is {}",
                bulk.resolved.amount
            );
            log::debug!("{bulk_side} row {bulk_row}: {message}");
            reject(out, bulk_side, bulk.idx, bulk_row, message);
            continue;
        }

        pool.consume(bulk_side, bulk.idx);
        for p in &chosen {
            pool.consume(parts_side, p.idx);
            claimed.insert(p.idx);
        }

        let key = bulk.prepared.join(", ");
        let id = dedup
            .entry((key.clone(), bulk.resolved.amount))
            .or_insert_with(|| ids.next())
            .clone();

        let bulk_match_side = match_side(ctx.index(bulk_side), bulk.entry, &bulk.resolved);
        let part_sides: Vec<MatchSide> = chosen
            .iter()
            .map(|p| match_side(ctx.index(parts_side), p.entry, &p.resolved))
            .collect();

        let mut all_sides: Vec<&MatchSide> = vec![&bulk_match_side];
        all_sides.extend(part_sides.iter());
        let notes = vec![format!("Parts: {}", part_sides.len())];
        let audit_info = audit_text(MatchKind::AggregatedPo, &key, &notes, &all_sides);

        log::debug!("aggregated_po {id}: {bulk_side} row {bulk_row} settled by {} parts", part_sides.len());

        let (file1, file2) = match bulk_side {
            FileSide::File1 => (vec![bulk_match_side], part_sides),
            FileSide::File2 => (part_sides, vec![bulk_match_side]),
        };
        out.matches.push(Match {
            id,
            kind: MatchKind::AggregatedPo,
            file1,
            file2,
            amount: bulk.resolved.amount,
            detail: MatchDetail::AggregatedPo { pos: bulk.prepared.clone(), bulk: bulk_side },
            audit_info,
        });
    }
}

/// A rejected aggregate is both a run note and the bulk block's unmatched reason.
fn reject(out: &mut StageOutput, file: FileSide, idx: usize, row: usize, message: String) {
    out.rejections.push(Rejection { file, idx, reason: message.clone() });
    out.notes.push(AuditNote { file, row, message });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::BankAccountMapping;
    use crate::matchers::testutil::{block, grid, run_stage};
    use crate::model::Role;

    const BULK: &str = "Payment against PO#10001, PO#10002, PO#10003";

    #[test]
    fn bulk_settled_by_three_parts() {
        let g1 = grid(&[block(Role::Lender, "600.00", "A1001", BULK)]);
        let g2 = grid(&[
            block(Role::Borrower, "100.00", "B2001", "PO-10001"),
            block(Role::Borrower, "200.00", "B2002", "PO-10002"),
            block(Role::Borrower, "300.00", "B2003", "PO-10003"),
        ]);
        let (out, pool, ids) = run_stage(&AggregatedPoStage, &g1, &g2, &BankAccountMapping::default());
        assert_eq!(out.matches.len(), 1);
        let m = &out.matches[0];
        assert_eq!(m.id, "M001");
        assert_eq!(m.file1.len(), 1);
        assert_eq!(m.file2.len(), 3);
        assert_eq!(m.amount, Amount(60_000));
        assert_eq!(
            m.audit_info,
            "Aggregated PO Match: PO-10001, PO-10002, PO-10003\nParts: 3\nLender Amount: 600.00\nBorrower Amount: 100.00 + 200.00 + 300.00"
        );
        assert_eq!(pool.len(FileSide::File1), 0);
        assert_eq!(pool.len(FileSide::File2), 0);
        assert_eq!(ids.issued(), 1);
        assert!(out.notes.is_empty());
    }

    #[test]
    fn cent_short_rejects_everything() {
        let g1 = grid(&[block(Role::Lender, "600.00", "A1001", BULK)]);
        let g2 = grid(&[
            block(Role::Borrower, "100.00", "B2001", "PO-10001"),
            block(Role::Borrower, "200.00", "B2002", "PO-10002"),
            block(Role::Borrower, "299.99", "B2003", "PO-10003"),
        ]);
        let (out, pool, ids) = run_stage(&AggregatedPoStage, &g1, &g2, &BankAccountMapping::default());
        assert!(out.matches.is_empty());
        assert_eq!(ids.issued(), 0);
        assert_eq!(pool.len(FileSide::File2), 3);
        assert_eq!(out.notes.len(), 1);
        assert!(out.notes[0].message.contains("599.99"), "{}", out.notes[0].message);
    }

    #[test]
    fn missing_po_rejects_everything() {
        let g1 = grid(&[block(Role::Lender, "300.00", "A1001", BULK)]);
        let g2 = grid(&[
            block(Role::Borrower, "100.00", "B2001", "PO-10001"),
            block(Role::Borrower, "200.00", "B2002", "PO-10002"),
        ]);
        let (out, pool, _) = run_stage(&AggregatedPoStage, &g1, &g2, &BankAccountMapping::default());
        assert!(out.matches.is_empty());
        assert_eq!(pool.len(FileSide::File1), 1);
        assert_eq!(out.notes[0].message, "Aggregated PO rejected: PO-10003 not found in file2");
        assert_eq!(out.notes[0].row, 10);
        assert_eq!(out.rejections[0].idx, 0);
        assert_eq!(out.rejections[0].reason, out.notes[0].message);
    }

    #[test]
    fn bulk_in_file2() {
        let g1 = grid(&[
            block(Role::Lender, "100.00", "A1001", "PO-10001"),
            block(Role::Lender, "50.00", "A1002", "PO-10002"),
        ]);
        let g2 = grid(&[block(Role::Borrower, "150.00", "B2001", "PO#10001 & PO#10002")]);
        let (out, _, _) = run_stage(&AggregatedPoStage, &g1, &g2, &BankAccountMapping::default());
        assert_eq!(out.matches.len(), 1);
        assert_eq!(out.matches[0].file1.len(), 2);
        assert_eq!(out.matches[0].file2.len(), 1);
        assert!(matches!(out.matches[0].detail, MatchDetail::AggregatedPo { bulk: FileSide::File2, .. }));
    }

    #[test]
    fn same_role_parts_are_ignored() {
        let g1 = grid(&[block(Role::Lender, "150.00", "A1001", "PO#10001 PO#10002")]);
        let g2 = grid(&[
            block(Role::Lender, "100.00", "B2001", "PO-10001"),
            block(Role::Borrower, "100.00", "B2002", "PO-10001"),
            block(Role::Borrower, "50.00", "B2003", "PO-10002"),
        ]);
        let (out, _, _) = run_stage(&AggregatedPoStage, &g1, &g2, &BankAccountMapping::default());
        assert_eq!(out.matches.len(), 1);
        let vouchers: Vec<_> = out.matches[0].file2.iter().map(|s| s.voucher.as_deref()).collect();
        assert_eq!(vouchers, vec![Some("B2002"), Some("B2003")]);
    }
}
