use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{BlockCache, ClearOnDrop, Ledger, LedgerIndex};
use crate::config::ReconConfig;
use crate::error::ReconError;
use crate::evidence::compute_summary;
use crate::grid::Layout;
use crate::matchers::{stage_for, MatchIds, ResidualPool, StageContext};
use crate::model::{Annotations, AuditNote, FileSide, Match, ReconMeta, ReconResult, RowAnnotation};

/// Pipeline switches that do not change results.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Serve block indexes from the run's cache. When off, every stage
    /// rebuilds both indexes from the grids.
    pub use_cache: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self { use_cache: true }
    }
}

/// Run reconciliation per config with a fresh cache.
pub fn run(config: &ReconConfig, file1: Ledger<'_>, file2: Ledger<'_>) -> Result<ReconResult, ReconError> {
    let mut cache = BlockCache::new();
    run_with(config, &mut cache, PipelineOptions::default(), file1, file2)
}

/// Run reconciliation using `cache` for this run only. The cache is cleared
/// before returning, on success and on error.
pub fn run_with(
    config: &ReconConfig,
    cache: &mut BlockCache,
    options: PipelineOptions,
    file1: Ledger<'_>,
    file2: Ledger<'_>,
) -> Result<ReconResult, ReconError> {
    let guard = ClearOnDrop(cache);
    let layout = config.layout.layout();
    let mut source = IndexSource { cache: &mut *guard.0, use_cache: options.use_cache, layout };

    if options.use_cache {
        source.cache.precompute_pair(file1, file2, layout)?;
    }
    let (index1, index2) = source.pair(file1, file2)?;
    log::info!(
        "{}: {} blocks, {}: {} blocks",
        file1.id,
        index1.len(),
        file2.id,
        index2.len()
    );

    let mut notes = excluded_block_notes(&index1, FileSide::File1);
    notes.extend(excluded_block_notes(&index2, FileSide::File2));

    let bank = config.bank_mapping();
    let mut pool = ResidualPool::new(&index1, &index2);
    let mut ids = MatchIds::new();
    let mut matches: Vec<Match> = Vec::new();
    let mut reasons = UnmatchedReasons::default();
    let stages = config.stages.ordered();

    for &kind in &stages {
        let (i1, i2) = source.pair(file1, file2)?;
        let ctx = StageContext {
            file1: &i1,
            file2: &i2,
            grid1: file1.grid,
            grid2: file2.grid,
            bank: &bank,
            min_voucher_len: config.narration.min_voucher_len,
        };
        let output = stage_for(kind).run(&ctx, &mut pool, &mut ids);
        log::info!(
            "{kind}: {} matches, residual {} / {}",
            output.matches.len(),
            pool.len(FileSide::File1),
            pool.len(FileSide::File2)
        );
        matches.extend(output.matches);
        notes.extend(output.notes);
        for r in output.rejections {
            reasons.add(r.file, r.idx, r.reason);
        }
    }

    let annotations = Annotations {
        file1: annotate_file(&matches, &index1, &pool, &reasons, FileSide::File1),
        file2: annotate_file(&matches, &index2, &pool, &reasons, FileSide::File2),
    };
    let summary = compute_summary(&index1, &index2, &matches);

    Ok(ReconResult {
        meta: ReconMeta {
            config_name: config.name.clone(),
            file1: file1.id.to_string(),
            file2: file2.id.to_string(),
            stages,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        matches,
        notes,
        annotations,
    })
}

/// Where stages get block indexes from: the run cache, or a fresh build.
struct IndexSource<'c> {
    cache: &'c mut BlockCache,
    use_cache: bool,
    layout: Layout,
}

impl IndexSource<'_> {
    fn get(&mut self, ledger: Ledger<'_>) -> Result<Arc<LedgerIndex>, ReconError> {
        if self.use_cache {
            self.cache.precompute(ledger, self.layout)
        } else {
            Ok(Arc::new(LedgerIndex::build(ledger, self.layout)?))
        }
    }

    fn pair(&mut self, a: Ledger<'_>, b: Ledger<'_>) -> Result<(Arc<LedgerIndex>, Arc<LedgerIndex>), ReconError> {
        Ok((self.get(a)?, self.get(b)?))
    }
}

fn excluded_block_notes(index: &LedgerIndex, file: FileSide) -> Vec<AuditNote> {
    index
        .entries
        .iter()
        .filter_map(|entry| {
            let err = entry.resolved.as_ref().err()?;
            let row = index.layout.sheet_row(entry.block.header());
            log::warn!("{}: block at row {row} excluded: {err}", index.file_id);
            Some(AuditNote { file, row, message: format!("Excluded from matching: {err}") })
        })
        .collect()
}

/// Reasons stages gave for passing over residual blocks, in stage order and
/// without repeats.
#[derive(Debug, Default)]
pub struct UnmatchedReasons {
    by_block: HashMap<(FileSide, usize), Vec<String>>,
}

impl UnmatchedReasons {
    pub fn add(&mut self, file: FileSide, idx: usize, reason: String) {
        let list = self.by_block.entry((file, idx)).or_default();
        if !list.contains(&reason) {
            list.push(reason);
        }
    }

    pub fn get(&self, file: FileSide, idx: usize) -> &[String] {
        self.by_block.get(&(file, idx)).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Audit text for a block no stage matched.
pub fn unmatched_audit(reasons: &[String]) -> String {
    if reasons.is_empty() {
        return "No match found - No matching criteria met".to_string();
    }
    let mut lines = vec!["Unmatched Record".to_string(), "Reasons:".to_string()];
    lines.extend(reasons.iter().enumerate().map(|(i, r)| format!("{}. {r}", i + 1)));
    lines.join("\n")
}

/// Row annotations for one file: the match id on every row of each matched
/// block, audit text on the narration row only. Sorted by sheet row.
pub fn annotate(matches: &[Match], layout: &Layout, file: FileSide) -> Vec<RowAnnotation> {
    let mut rows: Vec<RowAnnotation> = matches
        .iter()
        .flat_map(|m| m.sides(file).iter().map(move |side| (m, side)))
        .flat_map(|(m, side)| {
            let narration_row = side.block.narration_row();
            side.block.rows().map(move |row| RowAnnotation {
                sheet_row: layout.sheet_row(row),
                match_id: Some(m.id.clone()),
                audit_info: (row == narration_row).then(|| m.audit_info.clone()),
            })
        })
        .collect();
    rows.sort_by_key(|r| r.sheet_row);
    rows
}

/// Matched rows plus one audit row per block left unmatched: excluded
/// headers and blocks still in the residual pool.
fn annotate_file(
    matches: &[Match],
    index: &LedgerIndex,
    pool: &ResidualPool,
    reasons: &UnmatchedReasons,
    file: FileSide,
) -> Vec<RowAnnotation> {
    let mut rows = annotate(matches, &index.layout, file);
    for (idx, entry) in index.entries.iter().enumerate() {
        let audit = match &entry.resolved {
            Err(err) => unmatched_audit(&[format!("Excluded from matching: {err}")]),
            Ok(_) if pool.contains(file, idx) => unmatched_audit(reasons.get(file, idx)),
            Ok(_) => continue,
        };
        rows.push(RowAnnotation {
            sheet_row: index.layout.sheet_row(entry.block.narration_row()),
            match_id: None,
            audit_info: Some(audit),
        });
    }
    rows.sort_by_key(|r| r.sheet_row);
    rows
}
