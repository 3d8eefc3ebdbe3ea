use super::spec::QuerySpec;
use crate::config::WindowPolicy;
use crate::core::{CommentRecord, Result};
use crate::storage::RecordStore;
use std::sync::Arc;
use tracing::{Level, event};

/// Materialized slice `[start, end)` of the logical result of one specification.
#[derive(Debug, Clone, Default)]
pub struct Window {
    start: usize,
    records: Vec<CommentRecord>,
    generation: u64,
    virtualized: bool,
}

impl Window {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.start + self.records.len()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[CommentRecord] {
        &self.records
    }

    /// Materialization epoch this window was built in
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `false` when the whole result set fits and is held in full
    pub fn is_virtualized(&self) -> bool {
        self.virtualized
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end()
    }

    /// Record at an absolute offset of the logical result
    pub fn get(&self, offset: usize) -> Option<&CommentRecord> {
        if self.contains(offset) {
            self.records.get(offset - self.start)
        } else {
            None
        }
    }
}

/// Keeps a bounded, sliding materialization of a larger ordered result set.
///
/// Memory stays proportional to the window policy, never to the number of
/// matching records. Store mutations are not observed: call [`reload`] after
/// changing the store.
///
/// [`reload`]: WindowedQueryEngine::reload
pub struct WindowedQueryEngine<S: RecordStore + ?Sized> {
    store: Arc<S>,
    policy: WindowPolicy,
    spec: QuerySpec,
    total: usize,
    viewport: usize,
    generation: u64,
    window: Window,
}

impl<S: RecordStore + ?Sized> WindowedQueryEngine<S> {
    pub fn new(store: Arc<S>, policy: WindowPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            store,
            policy,
            spec: QuerySpec::default(),
            total: 0,
            viewport: 0,
            generation: 0,
            window: Window::default(),
        })
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn viewport(&self) -> usize {
        self.viewport
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    pub fn current_window(&self) -> &Window {
        &self.window
    }

    /// Replace the active specification and rebuild the window.
    ///
    /// With `keep_in_view`, the window is centered on that record's offset
    /// under the new order; if it no longer qualifies the window starts at 0.
    /// On error the previous specification and window stay in place.
    pub async fn set_specification(
        &mut self,
        spec: QuerySpec,
        keep_in_view: Option<&str>,
    ) -> Result<&Window> {
        let generation = self.generation + 1;
        let total = self.store.count(&spec).await?;
        let anchor = match keep_in_view {
            Some(id) => self.store.position_of(&spec, id).await?.unwrap_or(0),
            None => 0,
        };
        let window = self.build_window(&spec, total, anchor, generation).await?;

        event!(
            Level::DEBUG,
            total,
            anchor,
            start = window.start(),
            end = window.end(),
            "query specification applied"
        );
        self.spec = spec;
        self.total = total;
        self.viewport = anchor.min(total.saturating_sub(1));
        self.generation = generation;
        self.window = window;
        Ok(&self.window)
    }

    /// Re-count and re-materialize around the current viewport
    pub async fn reload(&mut self) -> Result<&Window> {
        let generation = self.generation + 1;
        let total = self.store.count(&self.spec).await?;
        let viewport = self.viewport.min(total.saturating_sub(1));
        let window = self.build_window(&self.spec, total, viewport, generation).await?;

        self.total = total;
        self.viewport = viewport;
        self.generation = generation;
        self.window = window;
        Ok(&self.window)
    }

    /// Back to the default specification with nothing materialized
    pub fn reset(&mut self) {
        self.spec = QuerySpec::default();
        self.total = 0;
        self.viewport = 0;
        self.generation += 1;
        self.window = Window {
            generation: self.generation,
            ..Window::default()
        };
    }

    /// Tell the engine which logical offset is centered in the viewport.
    ///
    /// Returns `true` when the window changed.
    pub async fn report_viewport_index(&mut self, index: usize) -> Result<bool> {
        if self.total == 0 {
            self.viewport = 0;
            return Ok(false);
        }
        let index = if index >= self.total {
            event!(Level::WARN, index, total = self.total, "viewport index out of range, clamping");
            self.total - 1
        } else {
            index
        };
        self.viewport = index;

        if !self.window.virtualized {
            return Ok(false);
        }

        if !self.window.contains(index) {
            let window = self
                .build_window(&self.spec, self.total, index, self.generation)
                .await?;
            self.window = window;
            return Ok(true);
        }

        let mut changed = false;
        while index + self.policy.edge_threshold >= self.window.end() && self.window.end() < self.total {
            if !self.extend_forward(index).await? {
                break;
            }
            changed = true;
        }
        while index < self.window.start + self.policy.edge_threshold && self.window.start > 0 {
            if !self.extend_backward(index).await? {
                break;
            }
            changed = true;
        }

        debug_assert!(self.window.end() <= self.total);
        debug_assert!(self.window.contains(index));
        Ok(changed)
    }

    async fn build_window(
        &self,
        spec: &QuerySpec,
        total: usize,
        anchor: usize,
        generation: u64,
    ) -> Result<Window> {
        if total <= self.policy.min_window {
            let records = self.store.query_range(spec, 0, total).await?;
            return Ok(Window {
                start: 0,
                records,
                generation,
                virtualized: false,
            });
        }

        let len = self.policy.initial_len().min(total);
        let start = anchor.saturating_sub(len / 2).min(total - len);
        let records = self.store.query_range(spec, start, len).await?;
        Ok(Window {
            start,
            records,
            generation,
            virtualized: true,
        })
    }

    async fn extend_forward(&mut self, index: usize) -> Result<bool> {
        let end = self.window.end();
        let count = self.policy.chunk.min(self.total - end);
        let more = self.store.query_range(&self.spec, end, count).await?;
        if more.is_empty() {
            // store shrank underneath us; the caller owes a reload
            self.total = end;
            return Ok(false);
        }
        self.window.records.extend(more);

        let excess = self.window.len().saturating_sub(self.policy.max_window);
        let trimmable = index
            .saturating_sub(self.policy.buffer)
            .saturating_sub(self.window.start);
        let trim = excess.min(trimmable);
        if trim > 0 {
            self.window.records.drain(..trim);
            self.window.start += trim;
        }
        event!(
            Level::TRACE,
            start = self.window.start,
            end = self.window.end(),
            "window extended forward"
        );
        Ok(true)
    }

    async fn extend_backward(&mut self, index: usize) -> Result<bool> {
        let start = self.window.start;
        let count = self.policy.chunk.min(start);
        let from = start - count;
        let mut fetched = self.store.query_range(&self.spec, from, count).await?;
        if fetched.len() != count {
            return Ok(false);
        }
        fetched.append(&mut self.window.records);
        self.window.records = fetched;
        self.window.start = from;

        let excess = self.window.len().saturating_sub(self.policy.max_window);
        let keep_until = index + self.policy.buffer + 1;
        let trimmable = self.window.end().saturating_sub(keep_until);
        let trim = excess.min(trimmable);
        if trim > 0 {
            let new_len = self.window.len() - trim;
            self.window.records.truncate(new_len);
        }
        event!(
            Level::TRACE,
            start = self.window.start,
            end = self.window.end(),
            "window extended backward"
        );
        Ok(true)
    }
}
