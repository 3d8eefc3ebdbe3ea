use super::RecordStore;
use super::persistence::{JournalEntry, PersistenceManager};
use crate::config::StoragePolicy;
use crate::core::{CommentId, CommentRecord, Result, SweepError};
use crate::query::{PatternCache, QuerySpec, RecordComparator, SearchMatcher};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, RwLock};

type OrderedIds = Arc<Vec<CommentId>>;

/// Record store held in memory, optionally backed by a journal + snapshot.
///
/// The ordered id list of each recently used [`QuerySpec`] is cached; any
/// mutation drops every cached order.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use commentsweep::{CommentRecord, InMemoryRecordStore, QuerySpec, RecordStore};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryRecordStore::new();
/// store
///     .upsert_many(vec![CommentRecord::new("c1", "v1", "first!", Utc::now())])
///     .await
///     .unwrap();
/// assert_eq!(store.count(&QuerySpec::new()).await.unwrap(), 1);
/// # });
/// ```
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<CommentId, CommentRecord>>,
    order_cache: Mutex<LruCache<QuerySpec, OrderedIds>>,
    patterns: PatternCache,
    persistence: Option<AsyncMutex<PersistenceManager>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::with_policy(&StoragePolicy::default())
    }

    pub fn with_policy(policy: &StoragePolicy) -> Self {
        let capacity = NonZeroUsize::new(policy.order_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            records: RwLock::new(HashMap::new()),
            order_cache: Mutex::new(LruCache::new(capacity)),
            patterns: PatternCache::new(policy.pattern_cache_capacity),
            persistence: None,
        }
    }

    pub fn from_records(records: impl IntoIterator<Item = CommentRecord>) -> Self {
        let mut store = Self::new();
        *store.records.get_mut() = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        store
    }

    /// Open a durable store in `data_dir`, recovering whatever was written before
    pub async fn open(data_dir: impl AsRef<Path>, policy: &StoragePolicy) -> Result<Self> {
        let mut manager = PersistenceManager::new(data_dir.as_ref(), policy.durability)?;
        manager
            .journal_mut()
            .set_checkpoint_threshold(policy.checkpoint_threshold);

        let recovered = manager.recover()?.unwrap_or_default();
        debug!(
            "Opened record store at {} with {} records",
            data_dir.as_ref().display(),
            recovered.len()
        );

        let mut store = Self::with_policy(policy);
        *store.records.get_mut() = recovered;
        store.persistence = Some(AsyncMutex::new(manager));
        Ok(store)
    }

    /// Force a snapshot and truncate the journal
    pub async fn checkpoint(&self) -> Result<()> {
        if let Some(persistence) = &self.persistence {
            let records = self.records.read().await;
            persistence.lock().await.checkpoint(&records)?;
        }
        Ok(())
    }

    fn cached_order(&self, spec: &QuerySpec) -> Result<Option<OrderedIds>> {
        let mut cache = self.order_cache.lock()?;
        Ok(cache.get(spec).cloned())
    }

    fn ordered_ids(
        &self,
        records: &HashMap<CommentId, CommentRecord>,
        spec: &QuerySpec,
    ) -> Result<OrderedIds> {
        if let Some(ids) = self.cached_order(spec)? {
            return Ok(ids);
        }

        let matcher = match &spec.search {
            Some(query) => Some(SearchMatcher::compile(query, &self.patterns)?),
            None => None,
        };

        let mut matching: Vec<&CommentRecord> = records
            .values()
            .filter(|record| spec.matches_filters(record))
            .filter(|record| matcher.as_ref().is_none_or(|m| m.matches(record)))
            .collect();
        RecordComparator::new(spec.sort_field, spec.sort_direction).sort(&mut matching);

        let ids: OrderedIds = Arc::new(matching.into_iter().map(|r| r.id.clone()).collect());
        self.order_cache.lock()?.put(spec.clone(), Arc::clone(&ids));
        Ok(ids)
    }

    fn invalidate_orders(&self) -> Result<()> {
        self.order_cache.lock()?.clear();
        Ok(())
    }

    async fn persist(
        &self,
        entry: JournalEntry,
        records: &HashMap<CommentId, CommentRecord>,
    ) -> Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        let mut manager = persistence.lock().await;
        manager.log(&entry)?;
        if manager.needs_checkpoint() {
            manager.checkpoint(records)?;
        }
        Ok(())
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn count(&self, spec: &QuerySpec) -> Result<usize> {
        let records = self.records.read().await;
        Ok(self.ordered_ids(&records, spec)?.len())
    }

    async fn query_range(
        &self,
        spec: &QuerySpec,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<CommentRecord>> {
        let records = self.records.read().await;
        let ids = self.ordered_ids(&records, spec)?;
        let start = offset.min(ids.len());
        let end = offset.saturating_add(limit).min(ids.len());

        ids[start..end]
            .iter()
            .map(|id| {
                records
                    .get(id)
                    .cloned()
                    .ok_or_else(|| SweepError::StoreError(format!("Order cache references missing record '{}'", id)))
            })
            .collect()
    }

    async fn ids_matching(&self, spec: &QuerySpec) -> Result<Vec<CommentId>> {
        let records = self.records.read().await;
        Ok(self.ordered_ids(&records, spec)?.as_ref().clone())
    }

    async fn position_of(&self, spec: &QuerySpec, id: &str) -> Result<Option<usize>> {
        let records = self.records.read().await;
        if !records.contains_key(id) {
            return Ok(None);
        }
        let ids = self.ordered_ids(&records, spec)?;
        Ok(ids.iter().position(|candidate| candidate == id))
    }

    async fn get(&self, id: &str) -> Result<Option<CommentRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn upsert_many(&self, batch: Vec<CommentRecord>) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut records = self.records.write().await;
        let written = batch.len();
        for record in &batch {
            records.insert(record.id.clone(), record.clone());
        }
        self.invalidate_orders()?;
        self.persist(JournalEntry::Upsert(batch), &records).await?;
        Ok(written)
    }

    async fn delete_many(&self, ids: &[CommentId]) -> Result<usize> {
        let mut records = self.records.write().await;
        let removed: Vec<CommentId> = ids
            .iter()
            .filter(|id| records.remove(id.as_str()).is_some())
            .cloned()
            .collect();
        if removed.is_empty() {
            return Ok(0);
        }
        self.invalidate_orders()?;
        let count = removed.len();
        self.persist(JournalEntry::Delete(removed), &records).await?;
        Ok(count)
    }

    async fn mark_delete_failed(&self, id: &str, reason: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(id) else {
            return Ok(false);
        };
        record.record_delete_failure(reason, at);
        // labels changed, so label filters may now match differently
        self.invalidate_orders()?;
        self.persist(
            JournalEntry::MarkDeleteFailed {
                id: id.to_string(),
                reason: reason.to_string(),
                at,
            },
            &records,
        )
        .await?;
        Ok(true)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}
