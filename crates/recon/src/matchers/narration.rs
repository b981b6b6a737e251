//! Stage 1: voucher number cross-reference.

use crate::extract::voucher_in_text;
use crate::model::{FileSide, MatchDetail, MatchKind};

use super::{pair_stage, Evidence, MatchIds, ResidualPool, Stage, StageContext, StageOutput};

/// One block's voucher number appears verbatim in the other block's
/// particulars or narration. File 1's voucher is tried first.
pub struct NarrationStage;

impl Stage for NarrationStage {
    fn kind(&self) -> MatchKind {
        MatchKind::Narration
    }

    fn run(&self, ctx: &StageContext<'_>, pool: &mut ResidualPool, ids: &mut MatchIds) -> StageOutput {
        let min_len = ctx.min_voucher_len;
        pair_stage(
            self.kind(),
            ctx,
            pool,
            ids,
            |_, _| (),
            |a, b| {
                let directions = [(a, b, FileSide::File1), (b, a, FileSide::File2)];
                directions.into_iter().find_map(|(from, into, voucher_from)| {
                    let voucher = from.entry.voucher.as_deref()?;
                    voucher_in_text(voucher, &into.entry.text, min_len).then(|| {
                        Evidence::new(
                            voucher.trim(),
                            MatchDetail::Narration { voucher: voucher.trim().to_string(), voucher_from },
                        )
                    })
                })
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::BankAccountMapping;
    use crate::matchers::testutil::{block, grid, run_stage, run_stage_with};
    use crate::model::Role;

    #[test]
    fn file1_voucher_in_file2_narration() {
        let g1 = grid(&[block(Role::Lender, "500", "70625", "fund transfer")]);
        let g2 = grid(&[block(Role::Borrower, "500", "JV-9", "Received against voucher 70625")]);
        let (out, _, _) = run_stage(&NarrationStage, &g1, &g2, &BankAccountMapping::default());
        assert_eq!(out.matches.len(), 1);
        assert_eq!(
            out.matches[0].detail,
            MatchDetail::Narration { voucher: "70625".into(), voucher_from: FileSide::File1 }
        );
    }

    #[test]
    fn file2_voucher_in_file1_narration() {
        let g1 = grid(&[block(Role::Borrower, "500", "JV-9", "paid per 88123")]);
        let g2 = grid(&[block(Role::Lender, "500", "88123", "")]);
        let (out, _, _) = run_stage(&NarrationStage, &g1, &g2, &BankAccountMapping::default());
        assert_eq!(out.matches.len(), 1);
        assert!(matches!(
            out.matches[0].detail,
            MatchDetail::Narration { voucher_from: FileSide::File2, .. }
        ));
    }

    #[test]
    fn three_digit_voucher_matches_by_default() {
        let g1 = grid(&[block(Role::Lender, "500", "123", "")]);
        let g2 = grid(&[block(Role::Borrower, "500", "JV-9", "against voucher 123")]);
        let (out, _, _) = run_stage(&NarrationStage, &g1, &g2, &BankAccountMapping::default());
        assert_eq!(out.matches.len(), 1);
        assert_eq!(
            out.matches[0].detail,
            MatchDetail::Narration { voucher: "123".into(), voucher_from: FileSide::File1 }
        );
    }

    #[test]
    fn configured_minimum_skips_short_vouchers() {
        let g1 = grid(&[block(Role::Lender, "500", "12", "")]);
        let g2 = grid(&[block(Role::Borrower, "500", "X", "invoice 12 settled")]);
        let (out, _, _) = run_stage_with(&NarrationStage, &g1, &g2, &BankAccountMapping::default(), 4);
        assert!(out.matches.is_empty());
    }

    #[test]
    fn cent_difference_rejects() {
        let g1 = grid(&[block(Role::Lender, "500.00", "70625", "")]);
        let g2 = grid(&[block(Role::Borrower, "500.01", "JV-9", "voucher 70625")]);
        let (out, _, _) = run_stage(&NarrationStage, &g1, &g2, &BankAccountMapping::default());
        assert!(out.matches.is_empty());
    }
}
