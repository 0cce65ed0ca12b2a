//! `appcat-catalog`: application catalog engine.
//!
//! Pure engine crate: receives pre-loaded tables and store handles, returns
//! classified buckets, reconciliation summaries and overlap groups.
//! No CLI, filesystem or network dependencies.

pub mod classify;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod model;
pub mod normalize;
pub mod overlap;
pub mod store;
pub mod table;
pub mod validate;
pub mod vendor;
pub mod vocab;

pub use classify::{classify, classify_entry, ClassifiedCatalog, TierView};
pub use engine::{plan_reconcile, reconcile, ReconcileOptions};
pub use enrich::{
    enrich_missing, CompletionClient, CompletionError, CompletionRequest, EnrichOptions, EnrichSummary,
};
pub use error::{CatalogError, IssueKind, RowIssue};
pub use model::{CatalogEntry, Field, ImportMode, ReconcileSummary};
pub use overlap::{detect_overlaps, estimate_savings, OverlapGroup, OverlapMember};
pub use store::{AuditRecord, AuditSink, CatalogStore, MemoryAudit, SheetStore};
pub use table::{ImportBatch, Table};
pub use validate::{validate_catalog, validate_rows, Issue, Severity};
