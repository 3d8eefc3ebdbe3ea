use super::gateway::{DeleteFailure, DeleteResult, DeletionGateway};
use super::outcome::{ItemStatus, OutcomeMap, SessionReport, SessionState};
use crate::config::DeletionPolicy;
use crate::core::CommentId;
use crate::quota::{QuotaAuthority, QuotaOperation, SharedLedger};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{Instrument, Level, event, info_span};
use uuid::Uuid;

/// Callback receiving every status transition of a session item
pub type StatusListener = Arc<dyn Fn(&str, &ItemStatus) + Send + Sync>;

/// Cooperative cancellation flag shared between the caller and a session
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Reason a batch stopped before all of its items were dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
enum Halt {
    Cancelled,
    QuotaExhausted(String),
    Unauthorized(String),
}

#[derive(Debug, Default)]
struct BatchOutcome {
    succeeded: usize,
    failed: usize,
    halt: Option<Halt>,
}

enum ItemVerdict {
    Success,
    Failed(String),
    Halt(Halt),
}

/// Runs deletion sessions against the remote gateway, paced by the quota
/// authority.
///
/// At most one session may run per client at a time; callers serialize
/// [`run`](DeletionOrchestrator::run).
pub struct DeletionOrchestrator {
    gateway: Arc<dyn DeletionGateway>,
    authority: Arc<dyn QuotaAuthority>,
    ledger: SharedLedger,
    policy: DeletionPolicy,
    cancellation: CancellationHandle,
    listener: Option<StatusListener>,
}

impl DeletionOrchestrator {
    pub fn new(
        gateway: Arc<dyn DeletionGateway>,
        authority: Arc<dyn QuotaAuthority>,
        ledger: SharedLedger,
        policy: DeletionPolicy,
    ) -> Self {
        Self {
            gateway,
            authority,
            ledger,
            policy,
            cancellation: CancellationHandle::new(),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: StatusListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn cancellation_handle(&self) -> CancellationHandle {
        self.cancellation.clone()
    }

    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    pub fn policy(&self) -> &DeletionPolicy {
        &self.policy
    }

    /// Delete `requested` ids, front first, within the remaining budget.
    ///
    /// Session-level problems end the state machine and are reported in the
    /// returned [`SessionReport`]; they are never raised as errors. Ids never
    /// attempted stay pending. The cancellation flag is cleared when the
    /// session starts.
    pub async fn run(&self, requested: Vec<CommentId>) -> SessionReport {
        let session_id = Uuid::new_v4();
        let span = info_span!(
            "sweep.session",
            session_id = %session_id,
            requested = requested.len()
        );
        self.run_session(session_id, requested).instrument(span).await
    }

    async fn run_session(&self, session_id: Uuid, requested: Vec<CommentId>) -> SessionReport {
        self.cancellation.reset();
        let mut outcomes = OutcomeMap::new(requested);
        let report = |state: SessionState, outcomes: OutcomeMap, batches: usize, message: Option<String>| {
            event!(
                Level::INFO,
                state = %state,
                succeeded = outcomes.succeeded_count(),
                failed = outcomes.failed_count(),
                untouched = outcomes.untouched_count(),
                "deletion session finished"
            );
            SessionReport {
                session_id,
                state,
                outcomes,
                batches,
                message,
            }
        };

        let mut state = SessionState::Idle;
        transition(&mut state, SessionState::SessionRequested);
        self.refresh_ledger().await;

        let targets: Vec<CommentId>;
        let per_item;
        let total_cost;
        {
            let mut ledger = self.ledger.lock().await;
            per_item = ledger.cost_of(QuotaOperation::DeleteComment, 1);
            let allowed = ledger.max_deletable().min(outcomes.len());
            targets = outcomes.iter().take(allowed).map(|(id, _)| id.clone()).collect();
            if targets.is_empty() {
                drop(ledger);
                let message = if outcomes.is_empty() {
                    state = SessionState::Completed;
                    None
                } else {
                    state = SessionState::QuotaExhausted;
                    Some("daily quota exhausted".to_string())
                };
                return report(state, outcomes, 0, message);
            }
            total_cost = ledger.cost_of(QuotaOperation::DeleteComment, targets.len());
            if let Err(err) = ledger.reserve(total_cost) {
                return report(SessionState::QuotaExhausted, outcomes, 0, Some(err.to_string()));
            }
        }
        event!(
            Level::DEBUG,
            targets = targets.len(),
            total_cost,
            "quota reserved for session"
        );

        let grant = match self.authority.open_session(total_cost).await {
            Ok(grant) => grant,
            Err(err) => {
                event!(Level::ERROR, error = %err, "quota session could not be opened");
                self.ledger.lock().await.release(total_cost);
                self.refresh_ledger().await;
                return report(SessionState::Failed, outcomes, 0, Some(err.to_string()));
            }
        };
        if !grant.granted {
            event!(Level::WARN, "quota authority denied the session");
            self.ledger.lock().await.release(total_cost);
            self.refresh_ledger().await;
            return report(
                SessionState::QuotaExhausted,
                outcomes,
                0,
                Some("quota authority denied the session".to_string()),
            );
        }

        let mut reserved = total_cost;
        let mut batch_units = grant.batch_size;
        let mut parallelism = grant.max_parallelism.max(1);
        let mut cursor = 0;
        let mut batches = 0;
        let mut message = None;

        loop {
            if self.cancellation.is_cancelled() {
                transition(&mut state, SessionState::Cancelled);
                break;
            }
            let remaining = targets.len() - cursor;
            let batch_len = if per_item == 0 {
                remaining
            } else {
                ((batch_units / per_item) as usize).min(remaining)
            };
            if batch_len == 0 {
                transition(&mut state, SessionState::QuotaExhausted);
                break;
            }

            transition(&mut state, SessionState::BatchExecuting);
            batches += 1;
            let batch = &targets[cursor..cursor + batch_len];
            cursor += batch_len;

            let parallel = self.policy.allow_parallel && parallelism > 1 && batch.len() > 1;
            let span = info_span!("sweep.batch", batch = batches, items = batch.len(), parallel);
            let outcome = if parallel {
                self.execute_parallel(batch, parallelism, &mut outcomes)
                    .instrument(span)
                    .await
            } else {
                self.execute_sequential(batch, &mut outcomes).instrument(span).await
            };

            let batch_cost = per_item.saturating_mul(batch_len as u64);
            let consumed = per_item.saturating_mul((outcome.succeeded + outcome.failed) as u64);
            self.ledger.lock().await.settle(batch_cost, consumed);
            reserved = reserved.saturating_sub(batch_cost);

            let verdict = if outcome.succeeded + outcome.failed > 0 || outcome.halt.is_none() {
                transition(&mut state, SessionState::BatchReported);
                match self
                    .authority
                    .report_batch(outcome.succeeded, outcome.failed)
                    .await
                {
                    Ok(verdict) => Some(verdict),
                    Err(err) => {
                        event!(Level::ERROR, error = %err, "batch report failed, assuming quota exhausted");
                        message = Some(format!("batch report failed: {}", err));
                        transition(&mut state, SessionState::QuotaExhausted);
                        None
                    }
                }
            } else {
                None
            };

            if let Some(halt) = outcome.halt {
                match halt {
                    Halt::Cancelled => transition(&mut state, SessionState::Cancelled),
                    Halt::QuotaExhausted(reason) => {
                        message = Some(reason);
                        transition(&mut state, SessionState::QuotaExhausted);
                    }
                    Halt::Unauthorized(reason) => {
                        message = Some(reason);
                        transition(&mut state, SessionState::Failed);
                    }
                }
                break;
            }
            let Some(verdict) = verdict else {
                break;
            };
            if cursor >= targets.len() {
                if targets.len() < outcomes.len() {
                    message = Some(format!(
                        "daily quota covered {} of {} requested",
                        targets.len(),
                        outcomes.len()
                    ));
                    transition(&mut state, SessionState::QuotaExhausted);
                } else {
                    transition(&mut state, SessionState::Completed);
                }
                break;
            }
            if self.cancellation.is_cancelled() {
                transition(&mut state, SessionState::Cancelled);
                break;
            }
            if !verdict.should_continue || verdict.next_batch_size == 0 || verdict.next_batch_size < per_item {
                message = Some("quota authority stopped the session".to_string());
                transition(&mut state, SessionState::QuotaExhausted);
                break;
            }
            batch_units = verdict.next_batch_size;
            parallelism = verdict.max_parallelism.max(1);
        }

        self.ledger.lock().await.release(reserved);
        if let Err(err) = self.authority.close_session().await {
            event!(Level::WARN, error = %err, "quota session close failed");
        }
        self.refresh_ledger().await;
        debug_assert!(state.is_terminal());

        report(state, outcomes, batches, message)
    }

    async fn execute_sequential(&self, batch: &[CommentId], outcomes: &mut OutcomeMap) -> BatchOutcome {
        let mut result = BatchOutcome::default();
        for (position, id) in batch.iter().enumerate() {
            if position > 0 {
                if self.cancellation.is_cancelled() {
                    result.halt = Some(Halt::Cancelled);
                    break;
                }
                if self.policy.item_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(self.policy.item_delay_ms)).await;
                }
            }

            self.mark_in_flight(id, outcomes);
            let verdict = self.classify(self.gateway.delete_one(id).await);
            if let Some(halt) = self.apply(id, verdict, outcomes, &mut result) {
                result.halt = Some(halt);
                break;
            }
        }
        result
    }

    /// Bounded dispatch over `delete_one`.
    ///
    /// `DeletionGateway::delete_many` drives every id to completion, but a
    /// quota or credential halt here has to stop dispatching and abandon the
    /// calls still outstanding.
    async fn execute_parallel(
        &self,
        batch: &[CommentId],
        parallelism: usize,
        outcomes: &mut OutcomeMap,
    ) -> BatchOutcome {
        let dispatch = |id: CommentId| {
            let gateway = Arc::clone(&self.gateway);
            async move {
                let result = gateway.delete_one(&id).await;
                (id, result)
            }
        };

        let mut result = BatchOutcome::default();
        let mut queued = batch.iter();
        let mut running = FuturesUnordered::new();
        let mut in_flight: HashSet<CommentId> = HashSet::new();

        for id in queued.by_ref().take(parallelism) {
            self.mark_in_flight(id, outcomes);
            in_flight.insert(id.clone());
            running.push(dispatch(id.clone()));
        }

        while let Some((id, delete_result)) = running.next().await {
            in_flight.remove(&id);
            let verdict = self.classify(delete_result);
            if let Some(halt) = self.apply(&id, verdict, outcomes, &mut result) {
                result.halt = Some(halt);
                break;
            }
            if let Some(next) = queued.next() {
                self.mark_in_flight(next, outcomes);
                in_flight.insert(next.clone());
                running.push(dispatch(next.clone()));
            }
        }

        // outstanding requests are abandoned; their items go back to pending
        drop(running);
        for id in in_flight {
            if outcomes.revert_to_pending(&id) {
                self.notify(&id, &ItemStatus::Pending);
            }
        }
        result
    }

    fn classify(&self, result: DeleteResult) -> ItemVerdict {
        match result {
            Ok(()) => ItemVerdict::Success,
            Err(DeleteFailure::NotFound) if self.policy.treat_not_found_as_success => ItemVerdict::Success,
            Err(DeleteFailure::Unauthorized(reason)) => {
                ItemVerdict::Halt(Halt::Unauthorized(format!("unauthorized: {}", reason)))
            }
            Err(failure) if failure.is_quota_exhaustion() => {
                ItemVerdict::Halt(Halt::QuotaExhausted(failure.to_string()))
            }
            Err(failure) => ItemVerdict::Failed(failure.to_string()),
        }
    }

    /// Record one item's verdict; returns the halt reason if the session must stop
    fn apply(
        &self,
        id: &str,
        verdict: ItemVerdict,
        outcomes: &mut OutcomeMap,
        result: &mut BatchOutcome,
    ) -> Option<Halt> {
        match verdict {
            ItemVerdict::Success => {
                if outcomes.record_success(id) {
                    result.succeeded += 1;
                    self.notify(id, &ItemStatus::Success);
                }
                None
            }
            ItemVerdict::Failed(reason) => {
                event!(Level::DEBUG, id, reason = %reason, "delete failed");
                if outcomes.record_failure(id, reason.clone()) {
                    result.failed += 1;
                    self.notify(id, &ItemStatus::Failed(reason));
                }
                None
            }
            ItemVerdict::Halt(halt) => {
                event!(Level::WARN, id, halt = ?halt, "session halted by item failure");
                if outcomes.revert_to_pending(id) {
                    self.notify(id, &ItemStatus::Pending);
                }
                Some(halt)
            }
        }
    }

    fn mark_in_flight(&self, id: &str, outcomes: &mut OutcomeMap) {
        if outcomes.mark_in_flight(id) {
            self.notify(id, &ItemStatus::InFlight);
        }
    }

    fn notify(&self, id: &str, status: &ItemStatus) {
        if let Some(listener) = &self.listener {
            listener(id, status);
        }
    }

    /// Pull authoritative usage into the ledger; failures only get logged
    async fn refresh_ledger(&self) {
        let usage = self.authority.current_usage().await;
        let mut ledger = self.ledger.lock().await;
        ledger.roll_over_if_due(Utc::now());
        match usage {
            Ok(usage) => {
                ledger.reconcile(usage.used, Some(usage.daily_limit));
                if let Some(reset_at) = usage.reset_at {
                    ledger.set_reset_at(reset_at);
                }
            }
            Err(err) => {
                event!(Level::WARN, error = %err, "quota usage refresh failed, keeping local ledger");
            }
        }
    }
}

fn transition(state: &mut SessionState, next: SessionState) {
    event!(Level::DEBUG, from = %state, to = %next, "session transition");
    *state = next;
}
