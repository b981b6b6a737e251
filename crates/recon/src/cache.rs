//! Per-run block cache.
//!
//! Identification, header resolution and narration assembly happen once per
//! file. Stages and the annotation pass read the resulting [`LedgerIndex`]
//! instead of rescanning the grid.

use std::collections::HashMap;
use std::sync::Arc;

use crate::amount::resolve;
use crate::blocks::{block_text, identify_blocks, narration};
use crate::error::{BlockError, ReconError, ResolveError};
use crate::grid::{AnnotatedGrid, Column, Layout};
use crate::model::{ResolvedAmount, TransactionBlock};

/// One ledger file handed to the engine.
#[derive(Clone, Copy)]
pub struct Ledger<'a> {
    /// Cache identity, normally the workbook path.
    pub id: &'a str,
    pub grid: &'a dyn AnnotatedGrid,
}

impl<'a> Ledger<'a> {
    pub fn new(id: &'a str, grid: &'a dyn AnnotatedGrid) -> Self {
        Self { id, grid }
    }
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

/// Everything the stages need to know about one block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockEntry {
    pub block: TransactionBlock,
    pub resolved: Result<ResolvedAmount, ResolveError>,
    pub narration: String,
    /// Header particulars plus narration.
    pub text: String,
    pub voucher: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, PartialEq)]
pub struct LedgerIndex {
    pub file_id: String,
    pub layout: Layout,
    pub entries: Vec<BlockEntry>,
}

impl LedgerIndex {
    pub fn build(ledger: Ledger<'_>, layout: Layout) -> Result<Self, ReconError> {
        let grid = ledger.grid;
        let blocks = identify_blocks(grid).map_err(|e| match e {
            BlockError::Overlapping { open_start, row } => ReconError::OverlappingBlock {
                file: ledger.id.to_string(),
                open_start: layout.sheet_row(open_start),
                row: layout.sheet_row(row),
            },
            BlockError::Incomplete { start } => ReconError::IncompleteBlock {
                file: ledger.id.to_string(),
                start: layout.sheet_row(start),
            },
        })?;

        let entries = blocks
            .into_iter()
            .map(|block| {
                let narration = narration(grid, &block);
                let text = block_text(grid, &block, &narration);
                BlockEntry {
                    resolved: resolve(grid, &block),
                    voucher: grid.text(block.header(), Column::G).map(|t| t.into_owned()),
                    date: grid.text(block.header(), Column::A).map(|t| t.into_owned()),
                    block,
                    narration,
                    text,
                }
            })
            .collect::<Vec<_>>();

        log::debug!("{}: indexed {} blocks", ledger.id, entries.len());
        Ok(Self { file_id: ledger.id.to_string(), layout, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, idx: usize) -> &BlockEntry {
        &self.entries[idx]
    }

    pub fn blocks(&self) -> impl Iterator<Item = &TransactionBlock> {
        self.entries.iter().map(|e| &e.block)
    }

    /// Position of the block whose row range contains `row`.
    pub fn block_containing(&self, row: usize) -> Option<usize> {
        let idx = self.entries.partition_point(|e| e.block.start <= row).checked_sub(1)?;
        self.entries[idx].block.contains(row).then_some(idx)
    }

    /// Nearest header at or above `row`: the indexed form of
    /// [`crate::blocks::find_block_header_for`].
    pub fn header_for(&self, row: usize) -> Option<usize> {
        let idx = self.entries.partition_point(|e| e.block.start <= row).checked_sub(1)?;
        Some(self.entries[idx].block.header())
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Block indexes keyed by file identity. Lives for exactly one run.
#[derive(Debug, Default)]
pub struct BlockCache {
    files: HashMap<String, Arc<LedgerIndex>>,
    clears: usize,
}

impl BlockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and store a file's index. No-op when the file is already warm.
    pub fn precompute(&mut self, ledger: Ledger<'_>, layout: Layout) -> Result<Arc<LedgerIndex>, ReconError> {
        if let Some(index) = self.files.get(ledger.id) {
            log::debug!("{}: block cache hit", ledger.id);
            return Ok(Arc::clone(index));
        }
        let index = Arc::new(LedgerIndex::build(ledger, layout)?);
        self.files.insert(ledger.id.to_string(), Arc::clone(&index));
        Ok(index)
    }

    /// Warm both files, building cold indexes concurrently.
    pub fn precompute_pair(&mut self, a: Ledger<'_>, b: Ledger<'_>, layout: Layout) -> Result<(), ReconError> {
        if a.id == b.id || self.is_warm(a.id) || self.is_warm(b.id) {
            self.precompute(a, layout)?;
            self.precompute(b, layout)?;
            return Ok(());
        }

        let (ra, rb) = std::thread::scope(|s| {
            let ha = s.spawn(|| LedgerIndex::build(a, layout));
            let rb = LedgerIndex::build(b, layout);
            (ha.join(), rb)
        });
        let ra = ra.unwrap_or_else(|panic| std::panic::resume_unwind(panic));

        self.files.insert(a.id.to_string(), Arc::new(ra?));
        self.files.insert(b.id.to_string(), Arc::new(rb?));
        Ok(())
    }

    pub fn get(&self, file_id: &str) -> Option<Arc<LedgerIndex>> {
        self.files.get(file_id).cloned()
    }

    pub fn is_warm(&self, file_id: &str) -> bool {
        self.files.contains_key(file_id)
    }

    /// Drop every index.
    pub fn clear(&mut self) {
        self.files.clear();
        self.clears += 1;
    }

    /// How many times [`BlockCache::clear`] has run.
    pub fn clear_count(&self) -> usize {
        self.clears
    }
}

/// Clears the cache when dropped, so a run leaves nothing behind whether it
/// returns normally or through `?`.
pub(crate) struct ClearOnDrop<'a>(pub &'a mut BlockCache);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}
