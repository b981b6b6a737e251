//! Stage 4: interunit loans via bank-account short codes.

use crate::model::{MatchDetail, MatchKind, Role};

use super::{pair_stage, Evidence, MatchIds, ResidualPool, Stage, StageContext, StageOutput};

/// The lender block's bank account maps to short codes; one of them must
/// appear verbatim in the borrower's narration. Never the other way round.
pub struct InterunitStage;

impl Stage for InterunitStage {
    fn kind(&self) -> MatchKind {
        MatchKind::Interunit
    }

    fn run(&self, ctx: &StageContext<'_>, pool: &mut ResidualPool, ids: &mut MatchIds) -> StageOutput {
        if ctx.bank.is_empty() {
            log::debug!("interunit: no bank accounts configured, skipping");
            return StageOutput::default();
        }

        let bank = ctx.bank;
        pair_stage(
            self.kind(),
            ctx,
            pool,
            ids,
            |side, entry| match &entry.resolved {
                Ok(r) if r.role == Role::Lender => bank.codes_for_block(ctx.grid(side), &entry.block),
                _ => None,
            },
            |a, b| {
                let (lender, borrower) = if a.resolved.role == Role::Lender { (a, b) } else { (b, a) };
                let codes = lender.prepared.as_ref()?;
                let code = codes.find_in(&borrower.entry.narration)?;
                let mut evidence = Evidence::new(
                    code,
                    MatchDetail::Interunit {
                        account: codes.account.to_string(),
                        short_code: code.to_string(),
                        lender: lender.side,
                    },
                );
                evidence.notes.push(format!("Lender Account: {}", codes.account));
                Some(evidence)
            },
        )
    }
}
