use crate::config::QuotaPolicy;
use crate::core::{Result, SweepError};
use chrono::{DateTime, Duration, FixedOffset, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// API operations that consume quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaOperation {
    DeleteComment,
    ListComments,
    ListVideos,
    ListChannels,
}

/// Unit cost per operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostTable {
    pub delete_comment: u64,
    pub list_comments: u64,
    pub list_videos: u64,
    pub list_channels: u64,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            delete_comment: 50,
            list_comments: 1,
            list_videos: 1,
            list_channels: 1,
        }
    }
}

impl CostTable {
    pub fn unit_cost(&self, operation: QuotaOperation) -> u64 {
        match operation {
            QuotaOperation::DeleteComment => self.delete_comment,
            QuotaOperation::ListComments => self.list_comments,
            QuotaOperation::ListVideos => self.list_videos,
            QuotaOperation::ListChannels => self.list_channels,
        }
    }
}

/// Point-in-time view of the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub daily_limit: u64,
    pub used: u64,
    pub pending: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

pub type SharedLedger = Arc<Mutex<QuotaLedger>>;

/// Local cache of the server-held daily budget.
///
/// `used` is only authoritative after [`reconcile`](QuotaLedger::reconcile);
/// `pending` is an optimistic reservation owned by the one open session.
#[derive(Debug, Clone)]
pub struct QuotaLedger {
    daily_limit: u64,
    used: u64,
    pending: u64,
    reset_at: DateTime<Utc>,
    reset_offset: FixedOffset,
    costs: CostTable,
}

impl QuotaLedger {
    pub fn new(policy: &QuotaPolicy, now: DateTime<Utc>) -> Self {
        let reset_offset = reset_offset(policy.reset_utc_offset_minutes);
        Self {
            daily_limit: policy.daily_limit,
            used: 0,
            pending: 0,
            reset_at: next_reset_after(now, reset_offset),
            reset_offset,
            costs: policy.costs.clone(),
        }
    }

    pub fn with_used(mut self, used: u64) -> Self {
        self.used = used;
        self
    }

    pub fn shared(self) -> SharedLedger {
        Arc::new(Mutex::new(self))
    }

    pub fn daily_limit(&self) -> u64 {
        self.daily_limit
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn pending(&self) -> u64 {
        self.pending
    }

    pub fn reset_at(&self) -> DateTime<Utc> {
        self.reset_at
    }

    pub fn costs(&self) -> &CostTable {
        &self.costs
    }

    pub fn cost_of(&self, operation: QuotaOperation, count: usize) -> u64 {
        self.costs.unit_cost(operation).saturating_mul(count as u64)
    }

    pub fn remaining(&self) -> u64 {
        self.daily_limit
            .saturating_sub(self.used.saturating_add(self.pending))
    }

    pub fn can_afford(&self, cost: u64) -> bool {
        cost <= self.remaining()
    }

    /// How many deletions the remaining budget covers
    pub fn max_deletable(&self) -> usize {
        let unit = self.costs.delete_comment;
        if unit == 0 {
            return usize::MAX;
        }
        (self.remaining() / unit) as usize
    }

    pub fn reserve(&mut self, cost: u64) -> Result<()> {
        if !self.can_afford(cost) {
            return Err(SweepError::QuotaExceeded(format!(
                "cannot reserve {} units, {} remaining",
                cost,
                self.remaining()
            )));
        }
        self.pending += cost;
        Ok(())
    }

    pub fn release(&mut self, cost: u64) {
        self.pending = self.pending.saturating_sub(cost);
    }

    /// Move a confirmed batch out of `pending`: `reserved` units are released
    /// and `consumed` units are charged to `used`.
    pub fn settle(&mut self, reserved: u64, consumed: u64) {
        self.release(reserved);
        self.used = self.used.saturating_add(consumed);
    }

    /// Adopt authoritative usage from the quota authority
    pub fn reconcile(&mut self, server_used: u64, daily_limit: Option<u64>) {
        self.used = server_used;
        if let Some(limit) = daily_limit {
            self.daily_limit = limit;
        }
    }

    pub fn set_reset_at(&mut self, reset_at: DateTime<Utc>) {
        self.reset_at = reset_at;
    }

    /// Start a new quota day once the boundary has passed
    pub fn roll_over_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.reset_at {
            return false;
        }
        self.used = 0;
        self.reset_at = next_reset_after(now, self.reset_offset);
        true
    }

    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.used = 0;
        self.pending = 0;
        self.reset_at = next_reset_after(now, self.reset_offset);
    }

    pub fn snapshot(&self) -> QuotaSnapshot {
        QuotaSnapshot {
            daily_limit: self.daily_limit,
            used: self.used,
            pending: self.pending,
            remaining: self.remaining(),
            reset_at: self.reset_at,
        }
    }
}

pub(crate) fn reset_offset(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes * 60).unwrap_or_else(|| Utc.fix())
}

/// Next local midnight (in `offset`) strictly after `now`
pub(crate) fn next_reset_after(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local = now.with_timezone(&offset);
    local
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| offset.from_local_datetime(&midnight).single())
        .map(|reset| reset.with_timezone(&Utc))
        .unwrap_or_else(|| now + Duration::days(1))
}
