//! Stage 5: salary months and festival bonuses.

use crate::extract::period_keys;
use crate::model::{MatchDetail, MatchKind};

use super::{common_key, pair_stage, Evidence, MatchIds, ResidualPool, Stage, StageContext, StageOutput};

pub struct SalaryStage;

impl Stage for SalaryStage {
    fn kind(&self) -> MatchKind {
        MatchKind::Salary
    }

    fn run(&self, ctx: &StageContext<'_>, pool: &mut ResidualPool, ids: &mut MatchIds) -> StageOutput {
        pair_stage(
            self.kind(),
            ctx,
            pool,
            ids,
            |_, entry| period_keys(&entry.narration),
            |a, b| {
                let key = common_key(&a.prepared, &b.prepared)?;
                Some(Evidence::new(
                    key.to_string(),
                    MatchDetail::Salary { period: key.period().to_string(), year: key.year() },
                ))
            },
        )
    }
}
