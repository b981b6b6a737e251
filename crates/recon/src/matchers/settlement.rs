//! Stage 6: employee final settlements.

use crate::extract::{employee_ids, has_final_settlement};
use crate::model::{MatchDetail, MatchKind};

use super::{common_key, pair_stage, Evidence, MatchIds, ResidualPool, Stage, StageContext, StageOutput};

pub struct SettlementStage;

impl Stage for SettlementStage {
    fn kind(&self) -> MatchKind {
        MatchKind::Settlement
    }

    fn run(&self, ctx: &StageContext<'_>, pool: &mut ResidualPool, ids: &mut MatchIds) -> StageOutput {
        pair_stage(
            self.kind(),
            ctx,
            pool,
            ids,
            |_, entry| employee_ids(&entry.narration),
            |a, b| {
                let id = common_key(&a.prepared, &b.prepared)?;
                let final_settlement =
                    has_final_settlement(&a.entry.narration) || has_final_settlement(&b.entry.narration);
                let mut evidence = Evidence::new(
                    id.as_str(),
                    MatchDetail::Settlement { employee_id: id.clone(), final_settlement },
                );
                if final_settlement {
                    evidence.notes.push("Final settlement noted in narration".to_string());
                }
                Some(evidence)
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
    fn employee_id_match() {
        let g1 = grid(&[block(Role::Lender, "88000", "A1001", "Final settlement Employee ID: 10423")]);
        let g2 = grid(&[block(Role::Borrower, "88000", "B2002", "settlement paid ID-10423")]);
        let (out, _, _) = run_stage(&SettlementStage, &g1, &g2, &BankAccountMapping::default());
        assert_eq!(
            out.matches[0].detail,
            MatchDetail::Settlement { employee_id: "10423".into(), final_settlement: true }
        );
        assert!(out.matches[0].audit_info.contains("Final settlement noted"));
    }

    #[test]
    fn different_ids_do_not_match() {
        let g1 = grid(&[block(Role::Lender, "1", "A1001", "ID 10423")]);
        let g2 = grid(&[block(Role::Borrower, "1", "B2002", "ID 10424")]);
        let (out, _, _) = run_stage(&SettlementStage, &g1, &g2, &BankAccountMapping::default());
        assert!(out.matches.is_empty());
    }
}
