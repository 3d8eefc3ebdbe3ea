#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use commentsweep::{
    BatchVerdict, CommentId, CommentRecord, DeleteFailure, DeleteResult, DeletionGateway,
    QuotaAuthority, QuotaUsage, Result, SessionGrant, SweepError,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const PER_ITEM: u64 = 50;

pub fn ids(raw: &[&str]) -> Vec<CommentId> {
    raw.iter().map(|s| s.to_string()).collect()
}

pub fn numbered_ids(n: usize) -> Vec<CommentId> {
    (0..n).map(|i| format!("c{:04}", i)).collect()
}

/// `n` records, one hour apart, likes cycling 0..7, every third on channel "b"
pub fn seed_records(n: usize) -> Vec<CommentRecord> {
    let base = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let channel = if i % 3 == 0 { "b" } else { "a" };
            CommentRecord::new(
                format!("c{:04}", i),
                format!("v{}", i % 10),
                format!("comment {} {}", i, "x".repeat(i % 40)),
                base + Duration::hours(i as i64),
            )
            .with_likes((i % 7) as u64)
            .with_channel(channel, format!("Channel {}", channel.to_uppercase()))
        })
        .collect()
}

// ============================================================================
// Quota authority double
// ============================================================================

#[derive(Default)]
struct AuthorityLog {
    opened: Vec<u64>,
    reports: Vec<(usize, usize)>,
    closed: usize,
}

/// Authority with a fixed grant and a scripted list of batch verdicts.
///
/// Once the script runs out every report continues with the granted batch.
pub struct ScriptedAuthority {
    used: AtomicUsize,
    daily_limit: u64,
    grant: SessionGrant,
    open_error: Option<String>,
    verdicts: Mutex<VecDeque<std::result::Result<BatchVerdict, String>>>,
    log: Mutex<AuthorityLog>,
}

impl ScriptedAuthority {
    pub fn new(daily_limit: u64, used: u64, batch_items: u64, max_parallelism: usize) -> Self {
        Self {
            used: AtomicUsize::new(used as usize),
            daily_limit,
            grant: SessionGrant {
                granted: true,
                batch_size: batch_items * PER_ITEM,
                max_parallelism,
            },
            open_error: None,
            verdicts: Mutex::new(VecDeque::new()),
            log: Mutex::new(AuthorityLog::default()),
        }
    }

    pub fn denying(mut self) -> Self {
        self.grant.granted = false;
        self
    }

    pub fn failing_open(mut self, message: &str) -> Self {
        self.open_error = Some(message.to_string());
        self
    }

    pub fn then_verdict(self, should_continue: bool, next_items: u64) -> Self {
        self.verdicts.lock().unwrap().push_back(Ok(BatchVerdict {
            should_continue,
            next_batch_size: next_items * PER_ITEM,
            max_parallelism: self.grant.max_parallelism,
        }));
        self
    }

    pub fn then_report_error(self, message: &str) -> Self {
        self.verdicts.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    pub fn opened(&self) -> Vec<u64> {
        self.log.lock().unwrap().opened.clone()
    }

    pub fn reports(&self) -> Vec<(usize, usize)> {
        self.log.lock().unwrap().reports.clone()
    }

    pub fn closed(&self) -> usize {
        self.log.lock().unwrap().closed
    }
}

#[async_trait]
impl QuotaAuthority for ScriptedAuthority {
    async fn open_session(&self, total_cost: u64) -> Result<SessionGrant> {
        self.log.lock().unwrap().opened.push(total_cost);
        match &self.open_error {
            Some(message) => Err(SweepError::AuthorityError(message.clone())),
            None => Ok(self.grant),
        }
    }

    async fn report_batch(&self, success_count: usize, failure_count: usize) -> Result<BatchVerdict> {
        self.log.lock().unwrap().reports.push((success_count, failure_count));
        self.used
            .fetch_add((success_count + failure_count) * PER_ITEM as usize, Ordering::SeqCst);
        match self.verdicts.lock().unwrap().pop_front() {
            Some(Ok(verdict)) => Ok(verdict),
            Some(Err(message)) => Err(SweepError::AuthorityError(message)),
            None => Ok(BatchVerdict {
                should_continue: true,
                next_batch_size: self.grant.batch_size,
                max_parallelism: self.grant.max_parallelism,
            }),
        }
    }

    async fn close_session(&self) -> Result<()> {
        self.log.lock().unwrap().closed += 1;
        Ok(())
    }

    async fn current_usage(&self) -> Result<QuotaUsage> {
        Ok(QuotaUsage {
            used: self.used.load(Ordering::SeqCst) as u64,
            daily_limit: self.daily_limit,
            reset_at: None,
        })
    }
}

// ============================================================================
// Gateway double
// ============================================================================

type CallHook = Box<dyn Fn(usize) + Send + Sync>;

/// Gateway answering from a failure table, with optional latency and a hook
/// fired after every completed call (1-based call count).
#[derive(Default)]
pub struct FakeGateway {
    failures: HashMap<CommentId, DeleteFailure>,
    latency_ms: u64,
    after_call: Option<CallHook>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    attempted: Mutex<Vec<CommentId>>,
    completed: Mutex<HashSet<CommentId>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, id: &str, failure: DeleteFailure) -> Self {
        self.failures.insert(id.to_string(), failure);
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn after_call(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.after_call = Some(Box::new(hook));
        self
    }

    pub fn attempted(&self) -> Vec<CommentId> {
        self.attempted.lock().unwrap().clone()
    }

    pub fn completed(&self) -> HashSet<CommentId> {
        self.completed.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeletionGateway for FakeGateway {
    async fn delete_one(&self, id: &str) -> DeleteResult {
        self.attempted.lock().unwrap().push(id.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.lock().unwrap().insert(id.to_string());
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = &self.after_call {
            hook(call);
        }
        match self.failures.get(id) {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}
