mod common;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use commentsweep::{
    CommentId, CommentRecord, InMemoryRecordStore, NumericRange, QuerySpec, RecordStore, Result,
    SortDirection, SortField, SweepError, WindowPolicy, WindowedQueryEngine,
};
use common::seed_records;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn small_policy() -> WindowPolicy {
    WindowPolicy {
        min_window: 10,
        buffer: 4,
        edge_threshold: 2,
        chunk: 4,
        max_window: 30,
    }
}

fn oldest_first() -> QuerySpec {
    QuerySpec::new().sort_by(SortField::PublishedAt, SortDirection::Ascending)
}

fn store_with(n: usize) -> Arc<InMemoryRecordStore> {
    Arc::new(InMemoryRecordStore::from_records(seed_records(n)))
}

fn window_ids(engine: &WindowedQueryEngine<InMemoryRecordStore>) -> Vec<CommentId> {
    engine
        .current_window()
        .records()
        .iter()
        .map(|r| r.id.clone())
        .collect()
}

async fn assert_window_matches_store(
    engine: &WindowedQueryEngine<InMemoryRecordStore>,
    store: &InMemoryRecordStore,
) {
    let window = engine.current_window();
    let expected: Vec<CommentId> = store
        .query_range(engine.spec(), window.start(), window.len())
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(window_ids(engine), expected, "window [{}, {})", window.start(), window.end());
}

#[tokio::test]
async fn test_count_matches_filtered_records() {
    let records = seed_records(300);
    let store = InMemoryRecordStore::from_records(records.clone());

    let spec = QuerySpec::new()
        .like_count(NumericRange::at_least(3))
        .channel("b");
    let expected = records
        .iter()
        .filter(|r| r.like_count >= 3 && r.channel_id.as_deref() == Some("b"))
        .count();
    assert_eq!(store.count(&spec).await.unwrap(), expected);
    assert_eq!(store.count(&QuerySpec::new()).await.unwrap(), 300);
}

#[tokio::test]
async fn test_small_result_set_is_materialized_whole() {
    let store = store_with(8);
    let mut engine = WindowedQueryEngine::new(store.clone(), small_policy()).unwrap();
    engine.set_specification(oldest_first(), None).await.unwrap();

    let window = engine.current_window();
    assert!(!window.is_virtualized());
    assert_eq!(window.start(), 0);
    assert_eq!(window.len(), 8);
    assert!(!engine.report_viewport_index(7).await.unwrap());
    assert_window_matches_store(&engine, &store).await;
}

#[tokio::test]
async fn test_empty_result_set() {
    let store = store_with(50);
    let mut engine = WindowedQueryEngine::new(store, small_policy()).unwrap();
    let spec = QuerySpec::new().like_count(NumericRange::at_least(100));
    engine.set_specification(spec, None).await.unwrap();

    assert_eq!(engine.total(), 0);
    assert!(engine.current_window().is_empty());
    assert!(!engine.report_viewport_index(5).await.unwrap());
    assert_eq!(engine.viewport(), 0);
}

#[tokio::test]
async fn test_initial_window_centers_on_kept_record() {
    let store = store_with(200);
    let mut engine = WindowedQueryEngine::new(store.clone(), small_policy()).unwrap();
    engine
        .set_specification(oldest_first(), Some("c0100"))
        .await
        .unwrap();

    let window = engine.current_window();
    assert!(window.is_virtualized());
    assert_eq!(window.len(), small_policy().initial_len());
    assert_eq!(window.start(), 91);
    assert_eq!(engine.viewport(), 100);
    assert_eq!(window.get(100).map(|r| r.id.as_str()), Some("c0100"));
}

#[tokio::test]
async fn test_window_tracks_store_while_scrolling() {
    let store = store_with(200);
    let policy = small_policy();
    let mut engine = WindowedQueryEngine::new(store.clone(), policy.clone()).unwrap();
    engine.set_specification(oldest_first(), None).await.unwrap();

    for index in 0..200 {
        engine.report_viewport_index(index).await.unwrap();
        let window = engine.current_window();
        assert!(window.contains(index), "index {} outside window", index);
        assert!(window.len() <= policy.max_window);
        assert_window_matches_store(&engine, &store).await;
    }
    assert_eq!(engine.current_window().end(), 200);

    for index in (0..200).rev() {
        engine.report_viewport_index(index).await.unwrap();
        let window = engine.current_window();
        assert!(window.contains(index), "index {} outside window", index);
        assert!(window.len() <= policy.max_window);
        assert_window_matches_store(&engine, &store).await;
    }
    assert_eq!(engine.current_window().start(), 0);
}

#[tokio::test]
async fn test_jump_rebuilds_around_index() {
    let store = store_with(200);
    let mut engine = WindowedQueryEngine::new(store.clone(), small_policy()).unwrap();
    engine.set_specification(oldest_first(), None).await.unwrap();

    assert!(engine.report_viewport_index(150).await.unwrap());
    let window = engine.current_window();
    assert_eq!(window.start(), 141);
    assert!(window.contains(150));
    assert_window_matches_store(&engine, &store).await;
}

#[tokio::test]
async fn test_out_of_range_index_is_clamped() {
    let store = store_with(200);
    let mut engine = WindowedQueryEngine::new(store.clone(), small_policy()).unwrap();
    engine.set_specification(oldest_first(), None).await.unwrap();

    engine.report_viewport_index(10_000).await.unwrap();
    assert_eq!(engine.viewport(), 199);
    assert_eq!(engine.current_window().end(), 200);
    assert_window_matches_store(&engine, &store).await;
}

#[tokio::test]
async fn test_specification_change_discards_old_offsets() {
    let store = store_with(200);
    let mut engine = WindowedQueryEngine::new(store.clone(), small_policy()).unwrap();
    engine.set_specification(oldest_first(), None).await.unwrap();
    engine.report_viewport_index(150).await.unwrap();
    let before = engine.generation();

    let popular = QuerySpec::new()
        .like_count(NumericRange::at_least(5))
        .sort_by(SortField::LikeCount, SortDirection::Descending);
    engine.set_specification(popular, None).await.unwrap();

    let window = engine.current_window();
    assert!(engine.generation() > before);
    assert_eq!(window.generation(), engine.generation());
    assert_eq!(engine.total(), 56);
    assert_eq!(window.start(), 0);
    assert!(window.end() <= engine.total());
    assert!(window.records().iter().all(|r| r.like_count >= 5));
    assert_window_matches_store(&engine, &store).await;
}

#[tokio::test]
async fn test_kept_record_that_no_longer_qualifies_starts_at_top() {
    let store = store_with(200);
    let mut engine = WindowedQueryEngine::new(store, small_policy()).unwrap();
    let popular = QuerySpec::new().like_count(NumericRange::at_least(5));
    // c0001 has one like
    engine.set_specification(popular, Some("c0001")).await.unwrap();
    assert_eq!(engine.current_window().start(), 0);
    assert_eq!(engine.viewport(), 0);
}

#[tokio::test]
async fn test_reload_observes_deletions() {
    let store = store_with(200);
    let mut engine = WindowedQueryEngine::new(store.clone(), small_policy()).unwrap();
    engine.set_specification(oldest_first(), None).await.unwrap();
    engine.report_viewport_index(100).await.unwrap();

    let doomed: Vec<CommentId> = (90..110).map(|i| format!("c{:04}", i)).collect();
    store.delete_many(&doomed).await.unwrap();
    // not observed until reload
    assert_eq!(engine.total(), 200);

    engine.reload().await.unwrap();
    assert_eq!(engine.total(), 180);
    assert!(engine.current_window().contains(100));
    assert_window_matches_store(&engine, &store).await;
}

#[tokio::test]
async fn test_reset_clears_window() {
    let store = store_with(50);
    let mut engine = WindowedQueryEngine::new(store, small_policy()).unwrap();
    engine.set_specification(oldest_first(), None).await.unwrap();
    let before = engine.generation();

    engine.reset();
    assert_eq!(engine.total(), 0);
    assert!(engine.current_window().is_empty());
    assert_eq!(engine.spec(), &QuerySpec::default());
    assert!(engine.generation() > before);
}

#[tokio::test]
async fn test_invalid_policy_is_rejected() {
    let policy = WindowPolicy {
        edge_threshold: 10,
        ..small_policy()
    };
    assert!(matches!(
        WindowedQueryEngine::new(store_with(1), policy),
        Err(SweepError::InvalidConfig(_))
    ));
}

/// Store whose range queries can be made to fail
struct FlakyStore {
    inner: InMemoryRecordStore,
    failing: AtomicBool,
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn count(&self, spec: &QuerySpec) -> Result<usize> {
        self.inner.count(spec).await
    }

    async fn query_range(&self, spec: &QuerySpec, offset: usize, limit: usize) -> Result<Vec<CommentRecord>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SweepError::StoreError("backend unavailable".into()));
        }
        self.inner.query_range(spec, offset, limit).await
    }

    async fn ids_matching(&self, spec: &QuerySpec) -> Result<Vec<CommentId>> {
        self.inner.ids_matching(spec).await
    }

    async fn position_of(&self, spec: &QuerySpec, id: &str) -> Result<Option<usize>> {
        self.inner.position_of(spec, id).await
    }

    async fn get(&self, id: &str) -> Result<Option<CommentRecord>> {
        self.inner.get(id).await
    }

    async fn upsert_many(&self, records: Vec<CommentRecord>) -> Result<usize> {
        self.inner.upsert_many(records).await
    }

    async fn delete_many(&self, ids: &[CommentId]) -> Result<usize> {
        self.inner.delete_many(ids).await
    }

    async fn mark_delete_failed(&self, id: &str, reason: &str, at: DateTime<Utc>) -> Result<bool> {
        self.inner.mark_delete_failed(id, reason, at).await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }
}

#[tokio::test]
async fn test_store_error_keeps_previous_specification() {
    let store = Arc::new(FlakyStore {
        inner: InMemoryRecordStore::from_records(seed_records(200)),
        failing: AtomicBool::new(false),
    });
    let mut engine = WindowedQueryEngine::new(store.clone(), small_policy()).unwrap();
    engine.set_specification(oldest_first(), None).await.unwrap();
    let generation = engine.generation();
    let start = engine.current_window().start();

    store.failing.store(true, Ordering::SeqCst);
    let result = engine
        .set_specification(QuerySpec::new().like_count(NumericRange::at_least(5)), None)
        .await;
    assert!(matches!(result, Err(SweepError::StoreError(_))));
    assert_eq!(engine.spec(), &oldest_first());
    assert_eq!(engine.generation(), generation);
    assert_eq!(engine.current_window().start(), start);
    assert_eq!(engine.total(), 200);

    assert!(engine.report_viewport_index(150).await.is_err());
}
