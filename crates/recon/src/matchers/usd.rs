//! Stage 7: USD literals.

use crate::extract::usd_amounts;
use crate::model::{MatchDetail, MatchKind};

use super::{common_key, pair_stage, Evidence, MatchIds, ResidualPool, Stage, StageContext, StageOutput};

/// A shared USD literal on top of the exact BDT amount. No conversion.
pub struct UsdStage;

impl Stage for UsdStage {
    fn kind(&self) -> MatchKind {
        MatchKind::Usd
    }

    fn run(&self, ctx: &StageContext<'_>, pool: &mut ResidualPool, ids: &mut MatchIds) -> StageOutput {
        pair_stage(
            self.kind(),
            ctx,
            pool,
            ids,
            |_, entry| usd_amounts(&entry.narration),
            |a, b| {
                let usd = common_key(&a.prepared, &b.prepared)?;
                Some(Evidence::new(format!("USD {usd}"), MatchDetail::Usd { usd: usd.clone() }))
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
    fn equal_usd_and_bdt() {
        let g1 = grid(&[block(Role::Lender, "180000", "A1001", "Import bill USD 1,500.00")]);
        let g2 = grid(&[block(Role::Borrower, "180000", "B2002", "Paid USD 1,500.00")]);
        let (out, _, _) = run_stage(&UsdStage, &g1, &g2, &BankAccountMapping::default());
        assert_eq!(out.matches.len(), 1);
        assert_eq!(out.matches[0].detail, MatchDetail::Usd { usd: "1500".into() });
    }

    #[test]
    fn usd_cent_difference_rejects() {
        let g1 = grid(&[block(Role::Lender, "180000", "A1001", "USD 1500.00")]);
        let g2 = grid(&[block(Role::Borrower, "180000", "B2002", "USD 1500.01")]);
        let (out, _, _) = run_stage(&UsdStage, &g1, &g2, &BankAccountMapping::default());
        assert!(out.matches.is_empty());
    }

    #[test]
    fn bdt_difference_rejects() {
        let g1 = grid(&[block(Role::Lender, "180000.00", "A1001", "USD 1500")]);
        let g2 = grid(&[block(Role::Borrower, "180000.01", "B2002", "USD 1500")]);
        let (out, _, _) = run_stage(&UsdStage, &g1, &g2, &BankAccountMapping::default());
        assert!(out.matches.is_empty());
    }
}
