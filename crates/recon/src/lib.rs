//! `interunit-recon`: interunit ledger reconciliation engine.
//!
//! Pure engine crate: receives annotated grids, splits them into
//! transaction blocks and links blocks across the two ledgers through a
//! fixed sequence of matching stages. No CLI or file I/O dependencies.

pub mod amount;
pub mod blocks;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod extract;
pub mod grid;
pub mod matchers;
pub mod model;

pub use cache::{BlockCache, Ledger, LedgerIndex};
pub use config::ReconConfig;
pub use engine::{run, run_with, PipelineOptions};
pub use error::{ReconError, ResolveError};
pub use grid::{AnnotatedGrid, Cell, CellValue, Column, Grid, Layout, Row};
pub use model::{Match, MatchKind, ReconResult, TransactionBlock};
