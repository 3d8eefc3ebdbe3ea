use crate::config::SweepConfig;
use crate::core::{CommentId, Result};
use crate::deletion::{CancellationHandle, DeletionGateway, DeletionOrchestrator, SessionReport, StatusListener};
use crate::query::{QuerySpec, Window, WindowedQueryEngine};
use crate::quota::{QuotaAuthority, QuotaLedger, QuotaSnapshot, SharedLedger};
use crate::selection::SelectionQueue;
use crate::storage::RecordStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{Level, event};

/// One user's comment history: browsing window, selection queue, quota and
/// deletion sessions over a shared record store.
///
/// Deletion takes `&mut self`, so only one session can be open at a time.
pub struct CommentWorkspace {
    store: Arc<dyn RecordStore>,
    engine: WindowedQueryEngine<dyn RecordStore>,
    selection: SelectionQueue,
    ledger: SharedLedger,
    orchestrator: DeletionOrchestrator,
}

impl CommentWorkspace {
    pub fn new(
        store: Arc<dyn RecordStore>,
        gateway: Arc<dyn DeletionGateway>,
        authority: Arc<dyn QuotaAuthority>,
        config: &SweepConfig,
    ) -> Result<Self> {
        config.validate()?;
        let ledger = QuotaLedger::new(&config.quota, Utc::now()).shared();
        let engine = WindowedQueryEngine::new(Arc::clone(&store), config.window.clone())?;
        let orchestrator = DeletionOrchestrator::new(
            gateway,
            authority,
            Arc::clone(&ledger),
            config.deletion.clone(),
        );

        Ok(Self {
            store,
            engine,
            selection: SelectionQueue::with_policy(config.selection.clone()),
            ledger,
            orchestrator,
        })
    }

    pub fn with_listener(mut self, listener: StatusListener) -> Self {
        self.orchestrator = self.orchestrator.with_listener(listener);
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn engine(&self) -> &WindowedQueryEngine<dyn RecordStore> {
        &self.engine
    }

    pub fn selection(&self) -> &SelectionQueue {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionQueue {
        &mut self.selection
    }

    // ========================================================================
    // Browsing
    // ========================================================================

    pub async fn set_specification(&mut self, spec: QuerySpec, keep_in_view: Option<&str>) -> Result<&Window> {
        self.engine.set_specification(spec, keep_in_view).await
    }

    pub async fn report_viewport_index(&mut self, index: usize) -> Result<bool> {
        self.engine.report_viewport_index(index).await
    }

    pub fn current_window(&self) -> &Window {
        self.engine.current_window()
    }

    pub async fn reload(&mut self) -> Result<&Window> {
        self.engine.reload().await
    }

    // ========================================================================
    // Selection
    // ========================================================================

    pub fn select(&mut self, id: impl Into<CommentId>) -> bool {
        self.selection.select(id)
    }

    pub fn deselect(&mut self, id: &str) -> bool {
        self.selection.deselect(id)
    }

    pub fn select_many(&mut self, ids: impl IntoIterator<Item = CommentId>) -> usize {
        self.selection.select_many(ids)
    }

    pub fn deselect_all(&mut self) {
        self.selection.deselect_all();
    }

    /// Select every record matching the active specification, not just the
    /// materialized window
    pub async fn select_all_matching(&mut self) -> Result<usize> {
        let ids = self.store.ids_matching(self.engine.spec()).await?;
        Ok(self.selection.select_many(ids))
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.orchestrator.cancellation_handle()
    }

    pub async fn quota(&self) -> QuotaSnapshot {
        self.ledger.lock().await.snapshot()
    }

    /// Delete the front of the selection queue, at most `limit` ids.
    ///
    /// Successes leave the store and the selection. Failures stay selected,
    /// move to the back of the queue and get their reason attached to the
    /// record. Ids never attempted keep their place.
    pub async fn delete_selected(&mut self, limit: Option<usize>) -> Result<SessionReport> {
        let count = limit.unwrap_or(self.selection.len());
        let ids = self.selection.take_front(count);
        let report = self.orchestrator.run(ids).await;

        let succeeded = report.succeeded();
        if !succeeded.is_empty() {
            self.store.delete_many(&succeeded).await?;
            self.selection.deselect_many(&succeeded);
        }

        let failed = report.failed();
        let now = Utc::now();
        for (id, reason) in &failed {
            if !self.store.mark_delete_failed(id, reason, now).await? {
                event!(Level::DEBUG, id = %id, "failed record no longer in store");
            }
        }
        self.selection.move_to_back(failed.iter().map(|(id, _)| id));

        self.engine.reload().await?;
        event!(
            Level::INFO,
            state = %report.state,
            summary = %report.summary(),
            selected = self.selection.len(),
            "selection deletion finished"
        );
        Ok(report)
    }
}
