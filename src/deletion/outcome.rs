use crate::core::CommentId;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// UI-facing status of one id within a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum ItemStatus {
    Pending,
    InFlight,
    Success,
    Failed(String),
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Success | ItemStatus::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    SessionRequested,
    BatchExecuting,
    BatchReported,
    Completed,
    QuotaExhausted,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed
                | SessionState::QuotaExhausted
                | SessionState::Cancelled
                | SessionState::Failed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::SessionRequested => "session_requested",
            SessionState::BatchExecuting => "batch_executing",
            SessionState::BatchReported => "batch_reported",
            SessionState::Completed => "completed",
            SessionState::QuotaExhausted => "quota_exhausted",
            SessionState::Cancelled => "cancelled",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-id outcomes, keyed by id and never by position.
///
/// Terminal outcomes are recorded once; a repeated report for the same id is
/// ignored so totals cannot be counted twice.
#[derive(Debug, Clone, Default)]
pub struct OutcomeMap {
    order: Vec<CommentId>,
    statuses: HashMap<CommentId, ItemStatus>,
    succeeded: usize,
    failed: usize,
}

impl OutcomeMap {
    /// Every id starts out pending; duplicates are dropped
    pub fn new(ids: impl IntoIterator<Item = CommentId>) -> Self {
        let mut map = Self::default();
        for id in ids {
            if !map.statuses.contains_key(&id) {
                map.statuses.insert(id.clone(), ItemStatus::Pending);
                map.order.push(id);
            }
        }
        map
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn status(&self, id: &str) -> Option<&ItemStatus> {
        self.statuses.get(id)
    }

    pub fn mark_in_flight(&mut self, id: &str) -> bool {
        match self.statuses.get_mut(id) {
            Some(status) if *status == ItemStatus::Pending => {
                *status = ItemStatus::InFlight;
                true
            }
            _ => false,
        }
    }

    /// Put an in-flight id back to pending; terminal ids are left alone
    pub fn revert_to_pending(&mut self, id: &str) -> bool {
        match self.statuses.get_mut(id) {
            Some(status) if *status == ItemStatus::InFlight => {
                *status = ItemStatus::Pending;
                true
            }
            _ => false,
        }
    }

    pub fn record_success(&mut self, id: &str) -> bool {
        self.record(id, ItemStatus::Success)
    }

    pub fn record_failure(&mut self, id: &str, reason: impl Into<String>) -> bool {
        self.record(id, ItemStatus::Failed(reason.into()))
    }

    fn record(&mut self, id: &str, outcome: ItemStatus) -> bool {
        let Some(status) = self.statuses.get_mut(id) else {
            return false;
        };
        if status.is_terminal() {
            return false;
        }
        match &outcome {
            ItemStatus::Success => self.succeeded += 1,
            ItemStatus::Failed(_) => self.failed += 1,
            _ => {}
        }
        *status = outcome;
        true
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded
    }

    pub fn failed_count(&self) -> usize {
        self.failed
    }

    /// Ids with no terminal outcome
    pub fn untouched_count(&self) -> usize {
        self.order.len() - self.succeeded - self.failed
    }

    /// All ids with their status, in request order
    pub fn iter(&self) -> impl Iterator<Item = (&CommentId, &ItemStatus)> {
        self.order
            .iter()
            .filter_map(|id| self.statuses.get(id).map(|status| (id, status)))
    }

    pub fn succeeded(&self) -> Vec<CommentId> {
        self.iter()
            .filter(|(_, status)| **status == ItemStatus::Success)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn failed(&self) -> Vec<(CommentId, String)> {
        self.iter()
            .filter_map(|(id, status)| match status {
                ItemStatus::Failed(reason) => Some((id.clone(), reason.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn untouched(&self) -> Vec<CommentId> {
        self.iter()
            .filter(|(_, status)| !status.is_terminal())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// What a deletion session hands back to its caller
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub state: SessionState,
    pub outcomes: OutcomeMap,
    pub batches: usize,
    pub message: Option<String>,
}

impl SessionReport {
    pub fn succeeded(&self) -> Vec<CommentId> {
        self.outcomes.succeeded()
    }

    pub fn failed(&self) -> Vec<(CommentId, String)> {
        self.outcomes.failed()
    }

    pub fn untouched(&self) -> Vec<CommentId> {
        self.outcomes.untouched()
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes.succeeded_count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.failed_count()
    }

    pub fn untouched_count(&self) -> usize {
        self.outcomes.untouched_count()
    }

    pub fn attempted_count(&self) -> usize {
        self.succeeded_count() + self.failed_count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} failed, {} left in queue",
            self.succeeded_count(),
            self.failed_count(),
            self.untouched_count()
        )
    }
}
