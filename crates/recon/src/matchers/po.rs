//! Stage 3: purchase order numbers.

use crate::extract::po_numbers;
use crate::model::{MatchDetail, MatchKind};

use super::{common_key, pair_stage, Evidence, MatchIds, ResidualPool, Stage, StageContext, StageOutput};

pub struct PoStage;

impl Stage for PoStage {
    fn kind(&self) -> MatchKind {
        MatchKind::Po
    }

    fn run(&self, ctx: &StageContext<'_>, pool: &mut ResidualPool, ids: &mut MatchIds) -> StageOutput {
        pair_stage(
            self.kind(),
            ctx,
            pool,
            ids,
            |_, entry| po_numbers(&entry.narration),
            |a, b| {
                let po = common_key(&a.prepared, &b.prepared)?;
                Some(Evidence::new(po.as_str(), MatchDetail::Po { po: po.clone() }))
            },
        )
    }
}
