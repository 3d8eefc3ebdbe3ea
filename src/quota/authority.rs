use super::ledger::{next_reset_after, reset_offset};
use crate::config::QuotaPolicy;
use crate::core::{Result, SweepError};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Answer to a session open request. `batch_size` is in quota units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGrant {
    pub granted: bool,
    pub batch_size: u64,
    pub max_parallelism: usize,
}

impl SessionGrant {
    pub fn denied() -> Self {
        Self {
            granted: false,
            batch_size: 0,
            max_parallelism: 1,
        }
    }
}

/// Answer to a batch report; decides whether the client may go on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchVerdict {
    pub should_continue: bool,
    pub next_batch_size: u64,
    pub max_parallelism: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub used: u64,
    pub daily_limit: u64,
    #[serde(default)]
    pub reset_at: Option<DateTime<Utc>>,
}

/// Remote quota authority, the source of truth for the daily budget.
///
/// At most one session is open per client at a time.
#[async_trait]
pub trait QuotaAuthority: Send + Sync {
    async fn open_session(&self, total_cost: u64) -> Result<SessionGrant>;

    async fn report_batch(&self, success_count: usize, failure_count: usize) -> Result<BatchVerdict>;

    async fn close_session(&self) -> Result<()>;

    async fn current_usage(&self) -> Result<QuotaUsage>;
}

struct OpenSession {
    requested: u64,
}

struct AuthorityState {
    daily_limit: u64,
    used: u64,
    reset_at: DateTime<Utc>,
    session: Option<OpenSession>,
}

impl AuthorityState {
    fn roll_over(&mut self, now: DateTime<Utc>, offset: FixedOffset) {
        if now >= self.reset_at {
            self.used = 0;
            self.reset_at = next_reset_after(now, offset);
        }
    }
}

/// In-process authority with the same pacing rules as the hosted one:
/// every attempted delete is charged, batches never exceed the remaining
/// budget, and continuation stops once one more item is unaffordable.
pub struct LocalQuotaAuthority {
    state: Mutex<AuthorityState>,
    per_item_cost: u64,
    batch_items: usize,
    max_parallelism: usize,
    reset_offset: FixedOffset,
}

impl LocalQuotaAuthority {
    pub fn new(policy: &QuotaPolicy) -> Self {
        let offset = reset_offset(policy.reset_utc_offset_minutes);
        Self {
            state: Mutex::new(AuthorityState {
                daily_limit: policy.daily_limit,
                used: 0,
                reset_at: next_reset_after(Utc::now(), offset),
                session: None,
            }),
            per_item_cost: policy.costs.delete_comment.max(1),
            batch_items: policy.local_batch_items.max(1),
            max_parallelism: policy.local_max_parallelism.max(1),
            reset_offset: offset,
        }
    }

    pub fn with_used(self, used: u64) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.used = used;
        }
        self
    }

    /// Resume from usage saved by an earlier run.
    ///
    /// Usage recorded before a reset boundary that has since passed is dropped.
    pub fn restore(self, usage: &QuotaUsage, now: DateTime<Utc>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.used = usage.used;
            if let Some(reset_at) = usage.reset_at {
                state.reset_at = reset_at;
            }
            state.roll_over(now, self.reset_offset);
        }
        self
    }

    pub fn is_session_open(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.session.is_some())
            .unwrap_or(false)
    }

    /// Largest batch, in units, the remaining budget allows
    fn batch_units(&self, state: &AuthorityState, cap: u64) -> u64 {
        let remaining = state.daily_limit.saturating_sub(state.used);
        let affordable_items = remaining / self.per_item_cost;
        let items = affordable_items.min(self.batch_items as u64);
        (items * self.per_item_cost).min(cap)
    }
}

#[async_trait]
impl QuotaAuthority for LocalQuotaAuthority {
    async fn open_session(&self, total_cost: u64) -> Result<SessionGrant> {
        let mut state = self.state.lock()?;
        state.roll_over(Utc::now(), self.reset_offset);
        if state.session.is_some() {
            return Err(SweepError::AuthorityError("a session is already open".into()));
        }

        let batch_size = self.batch_units(&state, total_cost);
        if batch_size < self.per_item_cost {
            return Ok(SessionGrant::denied());
        }
        state.session = Some(OpenSession {
            requested: total_cost,
        });
        Ok(SessionGrant {
            granted: true,
            batch_size,
            max_parallelism: self.max_parallelism,
        })
    }

    async fn report_batch(&self, success_count: usize, failure_count: usize) -> Result<BatchVerdict> {
        let mut state = self.state.lock()?;
        let Some(requested) = state.session.as_ref().map(|s| s.requested) else {
            return Err(SweepError::AuthorityError("no open session".into()));
        };

        let charged = (success_count + failure_count) as u64 * self.per_item_cost;
        state.used = state.used.saturating_add(charged);

        let next = self.batch_units(&state, requested);
        if next < self.per_item_cost {
            return Ok(BatchVerdict {
                should_continue: false,
                next_batch_size: 0,
                max_parallelism: self.max_parallelism,
            });
        }
        Ok(BatchVerdict {
            should_continue: true,
            next_batch_size: next,
            max_parallelism: self.max_parallelism,
        })
    }

    async fn close_session(&self) -> Result<()> {
        self.state.lock()?.session = None;
        Ok(())
    }

    async fn current_usage(&self) -> Result<QuotaUsage> {
        let mut state = self.state.lock()?;
        state.roll_over(Utc::now(), self.reset_offset);
        Ok(QuotaUsage {
            used: state.used,
            daily_limit: state.daily_limit,
            reset_at: Some(state.reset_at),
        })
    }
}
