//! Stage 2: letter of credit numbers.

use crate::extract::lc_numbers;
use crate::model::{MatchDetail, MatchKind};

use super::{common_key, pair_stage, Evidence, MatchIds, ResidualPool, Stage, StageContext, StageOutput};

pub struct LcStage;

impl Stage for LcStage {
    fn kind(&self) -> MatchKind {
        MatchKind::Lc
    }

    fn run(&self, ctx: &StageContext<'_>, pool: &mut ResidualPool, ids: &mut MatchIds) -> StageOutput {
        pair_stage(
            self.kind(),
            ctx,
            pool,
            ids,
            |_, entry| lc_numbers(&entry.narration),
            |a, b| {
                let lc = common_key(&a.prepared, &b.prepared)?;
                Some(Evidence::new(lc.as_str(), MatchDetail::Lc { lc: lc.clone() }))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::BankAccountMapping;
    use crate::matchers::testutil::{block, grid, run_stage};
    use crate::model::Role;

    #[test]
    fn shared_lc_matches() {
        let g1 = grid(&[block(Role::Lender, "900", "A1001", "Margin for LC 0412/25")]);
        let g2 = grid(&[block(Role::Borrower, "900", "B2002", "lc 0412/25 margin received")]);
        let (out, _, _) = run_stage(&LcStage, &g1, &g2, &BankAccountMapping::default());
        assert_eq!(out.matches.len(), 1);
        assert_eq!(out.matches[0].detail, MatchDetail::Lc { lc: "LC 0412/25".into() });
    }

    #[test]
    fn lc_in_particulars_only_does_not_count() {
        let mut lender = block(Role::Lender, "900", "A1001", "");
        lender.particulars = "LC 0412 account";
        let g1 = grid(&[lender]);
        let g2 = grid(&[block(Role::Borrower, "900", "B2002", "LC 0412")]);
        let (out, _, _) = run_stage(&LcStage, &g1, &g2, &BankAccountMapping::default());
        assert!(out.matches.is_empty());
    }
}
