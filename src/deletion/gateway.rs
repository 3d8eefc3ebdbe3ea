use crate::core::CommentId;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Mutex;
use thiserror::Error;

/// Error markers the remote API uses when the daily budget is gone
const QUOTA_MARKERS: [&str; 3] = ["quotaExceeded", "dailyLimitExceeded", "rateLimitExceeded"];

/// Why a single remote delete did not go through.
///
/// These are data, recorded against the item; they never abort a batch on
/// their own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeleteFailure {
    #[error("comment not found")]
    NotFound,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl DeleteFailure {
    /// Whether this failure means the budget is spent.
    ///
    /// Besides the explicit variant this falls back to matching the error
    /// text, which is an approximation.
    pub fn is_quota_exhaustion(&self) -> bool {
        match self {
            DeleteFailure::QuotaExceeded(_) => true,
            DeleteFailure::NotFound | DeleteFailure::Unauthorized(_) => false,
            DeleteFailure::Forbidden(message)
            | DeleteFailure::Transport(message)
            | DeleteFailure::Api { message, .. } => message_signals_quota(message),
        }
    }
}

pub fn message_signals_quota(message: &str) -> bool {
    QUOTA_MARKERS.iter().any(|marker| message.contains(marker))
        || message.to_lowercase().contains("quota")
}

pub type DeleteResult = std::result::Result<(), DeleteFailure>;

/// Per-item progress callback for [`DeletionGateway::delete_many`]
pub type ProgressFn<'a> = dyn Fn(&str, &DeleteResult) + Send + Sync + 'a;

/// Outcome of a bulk delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkDeleteResult {
    pub succeeded: Vec<CommentId>,
    pub failed: Vec<(CommentId, DeleteFailure)>,
}

/// Remote deletion endpoint
#[async_trait]
pub trait DeletionGateway: Send + Sync {
    async fn delete_one(&self, id: &str) -> DeleteResult;

    /// Delete with at most `max_parallel` requests outstanding.
    ///
    /// `on_progress` fires once per completed item, in completion order.
    async fn delete_many(
        &self,
        ids: &[CommentId],
        max_parallel: usize,
        on_progress: &ProgressFn<'_>,
    ) -> BulkDeleteResult {
        let pending: Vec<_> = ids
            .iter()
            .map(|id| async move { (id, self.delete_one(id).await) })
            .collect();
        let mut completed = stream::iter(pending).buffer_unordered(max_parallel.max(1));

        let mut result = BulkDeleteResult::default();
        while let Some((id, outcome)) = completed.next().await {
            on_progress(id.as_str(), &outcome);
            match outcome {
                Ok(()) => result.succeeded.push(id.clone()),
                Err(failure) => result.failed.push((id.clone(), failure)),
            }
        }
        result
    }
}

/// Gateway that deletes nothing remotely; used for dry runs.
///
/// Every id succeeds unless it was registered with [`fail_with`].
///
/// [`fail_with`]: DryRunGateway::fail_with
#[derive(Debug, Default)]
pub struct DryRunGateway {
    failures: Vec<(CommentId, DeleteFailure)>,
    seen: Mutex<HashSet<CommentId>>,
}

impl DryRunGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(mut self, id: impl Into<CommentId>, failure: DeleteFailure) -> Self {
        self.failures.push((id.into(), failure));
        self
    }

    /// Ids a delete was attempted for
    pub fn attempted(&self) -> Vec<CommentId> {
        let mut ids: Vec<CommentId> = self
            .seen
            .lock()
            .map(|seen| seen.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

#[async_trait]
impl DeletionGateway for DryRunGateway {
    async fn delete_one(&self, id: &str) -> DeleteResult {
        if let Ok(mut seen) = self.seen.lock() {
            seen.insert(id.to_string());
        }
        match self.failures.iter().find(|(failing, _)| failing == id) {
            Some((_, failure)) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}
