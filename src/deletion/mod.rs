pub mod gateway;
pub mod http;
pub mod orchestrator;
pub mod outcome;

pub use gateway::{
    BulkDeleteResult, DeleteFailure, DeleteResult, DeletionGateway, DryRunGateway, ProgressFn,
};
pub use http::{CredentialSource, HttpDeletionGateway, StaticCredential};
pub use orchestrator::{CancellationHandle, DeletionOrchestrator, StatusListener};
pub use outcome::{ItemStatus, OutcomeMap, SessionReport, SessionState};
