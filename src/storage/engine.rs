use crate::core::{CommentId, CommentRecord, Result};
use crate::query::QuerySpec;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Record store contract consumed by the window engine and the workspace.
///
/// Offsets always refer to the total order defined by the given
/// [`QuerySpec`]. Implementations are assumed single-writer.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Number of records matching `spec`
    async fn count(&self, spec: &QuerySpec) -> Result<usize>;

    /// Records at offsets `[offset, offset + limit)`; shorter at the end of the set
    async fn query_range(
        &self,
        spec: &QuerySpec,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CommentRecord>>;

    /// Every matching id in order, not limited to any window
    async fn ids_matching(&self, spec: &QuerySpec) -> Result<Vec<CommentId>>;

    /// Offset of `id` under `spec`, `None` if it does not qualify
    async fn position_of(&self, spec: &QuerySpec, id: &str) -> Result<Option<usize>>;

    async fn get(&self, id: &str) -> Result<Option<CommentRecord>>;

    /// Insert or replace; returns the number of records written
    async fn upsert_many(&self, records: Vec<CommentRecord>) -> Result<usize>;

    /// Returns the number of records actually removed
    async fn delete_many(&self, ids: &[CommentId]) -> Result<usize>;

    /// Attach a deletion failure to a record; `false` if the id is unknown
    async fn mark_delete_failed(&self, id: &str, reason: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Total number of records, ignoring any filter
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
