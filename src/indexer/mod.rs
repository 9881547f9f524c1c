//! Library indexing engine
//!
//! Classification, chapter reconciliation and duplicate resolution for one
//! title at a time, the per-library indexer that drives them on a schedule,
//! and the manager that keeps one indexer per enabled library.

pub mod classify;
pub mod duplicates;
pub mod error;
pub mod library;
pub mod manager;
pub mod reconcile;

pub use classify::{ContentKind, classify};
pub use duplicates::{DuplicateResolver, Resolution};
pub use error::IndexerError;
pub use library::{
    IndexerContext, IndexerSettings, IndexerState, LibraryIndexer, PassRegistry, PassReport,
    SweepReport,
};
pub use manager::{IndexerManager, IndexerStatus};
pub use reconcile::{ChapterReconciler, Reconciliation};
