// ============================================================================
// commentsweep Library
// ============================================================================
//
// Browsing and quota-gated bulk deletion over a personal comment history:
//
// - `query`: specifications and the windowed query engine
// - `storage`: record store contract and the in-memory, journaled store
// - `quota`: local ledger and the remote quota authority contract
// - `selection`: ordered selection queue
// - `deletion`: remote gateway and the deletion session orchestrator
// - `facade`: `CommentWorkspace`, tying the pieces together

pub mod config;
pub mod core;
pub mod deletion;
pub mod facade;
pub mod query;
pub mod quota;
pub mod selection;
pub mod storage;

pub use config::{
    DeletionPolicy, QuotaPolicy, SelectionWindowPolicy, StoragePolicy, SweepConfig, WindowPolicy,
};
pub use core::{Classification, CommentId, CommentRecord, EnrichmentState, Result, SweepError, labels};
pub use deletion::{
    BulkDeleteResult, CancellationHandle, CredentialSource, DeleteFailure, DeleteResult,
    DeletionGateway, DeletionOrchestrator, DryRunGateway, HttpDeletionGateway, ItemStatus,
    OutcomeMap, ProgressFn, SessionReport, SessionState, StaticCredential, StatusListener,
};
pub use facade::CommentWorkspace;
pub use query::{
    DateRange, NumericRange, QuerySpec, SearchQuery, SearchScope, SortDirection, SortField, Window,
    WindowedQueryEngine,
};
pub use quota::{
    BatchVerdict, CostTable, LocalQuotaAuthority, QuotaAuthority, QuotaLedger, QuotaOperation,
    QuotaSnapshot, QuotaUsage, QuotaUsageFile, SessionGrant, SharedLedger,
};
pub use selection::SelectionQueue;
pub use storage::{DurabilityMode, InMemoryRecordStore, RecordStore};
