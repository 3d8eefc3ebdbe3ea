//! Ordered selection queue.
//!
//! Membership and order live in one structure and are updated together, so
//! the order list is always a duplicate-free permutation of the member set.
//! The front of the queue is the most recently selected id and the first to
//! be handed to a deletion session.

use crate::config::SelectionWindowPolicy;
use crate::core::CommentId;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct SelectionQueue {
    members: HashSet<CommentId>,
    order: VecDeque<CommentId>,
    policy: SelectionWindowPolicy,
    window_start: usize,
}

impl SelectionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: SelectionWindowPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Returns `false` if the id was already selected
    pub fn select(&mut self, id: impl Into<CommentId>) -> bool {
        let id = id.into();
        if !self.members.insert(id.clone()) {
            return false;
        }
        self.order.push_front(id);
        true
    }

    pub fn deselect(&mut self, id: &str) -> bool {
        if !self.members.remove(id) {
            return false;
        }
        if let Some(pos) = self.order.iter().position(|candidate| candidate == id) {
            self.order.remove(pos);
        }
        self.clamp_window();
        true
    }

    /// Prepend the not-yet-selected ids as one block, keeping input order.
    ///
    /// Returns how many ids were added.
    pub fn select_many<I, T>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = T>,
        T: Into<CommentId>,
    {
        let mut block = Vec::new();
        for id in ids {
            let id = id.into();
            if self.members.insert(id.clone()) {
                block.push(id);
            }
        }
        let added = block.len();
        for id in block.into_iter().rev() {
            self.order.push_front(id);
        }
        added
    }

    pub fn deselect_many<'a, I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a CommentId>,
    {
        let mut removed = 0;
        for id in ids {
            if self.members.remove(id.as_str()) {
                removed += 1;
            }
        }
        if removed > 0 {
            let members = &self.members;
            self.order.retain(|id| members.contains(id));
            self.clamp_window();
        }
        removed
    }

    pub fn deselect_all(&mut self) {
        self.members.clear();
        self.order.clear();
        self.window_start = 0;
    }

    /// Move member ids to the back, in the given relative order.
    ///
    /// Non-members are ignored; membership never changes.
    pub fn move_to_back<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a CommentId>,
    {
        let mut seen = HashSet::new();
        let tail: Vec<CommentId> = ids
            .into_iter()
            .filter(|id| self.members.contains(id.as_str()) && seen.insert(id.as_str()))
            .cloned()
            .collect();
        if tail.is_empty() {
            return;
        }
        let moving: HashSet<&str> = tail.iter().map(String::as_str).collect();
        self.order.retain(|id| !moving.contains(id.as_str()));
        self.order.extend(tail);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn ordered(&self) -> impl Iterator<Item = &CommentId> {
        self.order.iter()
    }

    /// First `n` ids in queue order, without removing them
    pub fn take_front(&self, n: usize) -> Vec<CommentId> {
        self.order.iter().take(n).cloned().collect()
    }

    pub fn is_consistent(&self) -> bool {
        if self.order.len() != self.members.len() {
            return false;
        }
        let mut seen = HashSet::with_capacity(self.order.len());
        self.order
            .iter()
            .all(|id| self.members.contains(id) && seen.insert(id.as_str()))
    }

    // ========================================================================
    // Rendering window
    // ========================================================================

    /// Recenter the rendering window when `index` nears one of its edges.
    ///
    /// Returns `true` when the visible range moved.
    pub fn report_viewport_index(&mut self, index: usize) -> bool {
        let len = self.order.len();
        if len <= self.policy.size {
            let moved = self.window_start != 0;
            self.window_start = 0;
            return moved;
        }
        let index = index.min(len - 1);
        let end = self.window_start + self.policy.size;
        let near_start = self.window_start > 0 && index < self.window_start + self.policy.buffer;
        let near_end = end < len && index + self.policy.buffer >= end;
        if !near_start && !near_end && index >= self.window_start && index < end {
            return false;
        }

        let start = index
            .saturating_sub(self.policy.size / 2)
            .min(len - self.policy.size);
        let moved = start != self.window_start;
        self.window_start = start;
        moved
    }

    pub fn visible_range(&self) -> (usize, usize) {
        let end = (self.window_start + self.policy.size).min(self.order.len());
        (self.window_start.min(end), end)
    }

    pub fn visible(&self) -> Vec<&CommentId> {
        let (start, end) = self.visible_range();
        self.order.range(start..end).collect()
    }

    fn clamp_window(&mut self) {
        let max_start = self.order.len().saturating_sub(self.policy.size);
        self.window_start = self.window_start.min(max_start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(queue: &SelectionQueue) -> Vec<&str> {
        queue.ordered().map(String::as_str).collect()
    }

    fn owned(raw: &[&str]) -> Vec<CommentId> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_select_prepends() {
        let mut q = SelectionQueue::new();
        assert!(q.select("a"));
        assert!(q.select("b"));
        assert!(!q.select("a"));
        assert_eq!(ids(&q), vec!["b", "a"]);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn test_select_many_prepends_block_in_input_order() {
        let mut q = SelectionQueue::new();
        q.select("x");
        let added = q.select_many(["a", "b", "x", "a", "c"]);
        assert_eq!(added, 3);
        assert_eq!(ids(&q), vec!["a", "b", "c", "x"]);
        assert!(q.is_consistent());
    }

    #[test]
    fn test_deselect() {
        let mut q = SelectionQueue::new();
        q.select_many(["a", "b", "c"]);
        assert!(q.deselect("b"));
        assert!(!q.deselect("b"));
        assert_eq!(ids(&q), vec!["a", "c"]);

        let removed = q.deselect_many(&owned(&["a", "zzz"]));
        assert_eq!(removed, 1);
        assert_eq!(ids(&q), vec!["c"]);

        q.deselect_all();
        assert!(q.is_empty());
        assert!(q.is_consistent());
    }

    #[test]
    fn test_move_to_back_keeps_membership() {
        let mut q = SelectionQueue::new();
        q.select_many(["a", "b", "c", "d"]);
        q.move_to_back(&owned(&["c", "a", "ghost", "c"]));
        assert_eq!(ids(&q), vec!["b", "d", "c", "a"]);
        assert_eq!(q.len(), 4);
        assert!(q.is_consistent());
    }

    #[test]
    fn test_take_front() {
        let mut q = SelectionQueue::new();
        q.select_many(["a", "b", "c"]);
        assert_eq!(q.take_front(2), owned(&["a", "b"]));
        assert_eq!(q.take_front(10).len(), 3);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn test_mixed_operations_stay_consistent() {
        let mut q = SelectionQueue::new();
        for round in 0..50 {
            let id = format!("c{}", round % 13);
            match round % 5 {
                0 => {
                    q.select(id);
                }
                1 => {
                    q.deselect(&id);
                }
                2 => {
                    q.select_many((0..round % 7).map(|i| format!("c{}", i)));
                }
                3 => q.move_to_back(&[id]),
                _ => {
                    q.deselect_many(&[id]);
                }
            }
            assert!(q.is_consistent(), "inconsistent after round {}", round);
        }
    }

    #[test]
    fn test_render_window_slides() {
        let mut q = SelectionQueue::with_policy(SelectionWindowPolicy { size: 10, buffer: 2 });
        q.select_many((0..30).map(|i| format!("c{:02}", i)));
        assert_eq!(q.visible_range(), (0, 10));
        assert!(!q.report_viewport_index(4));

        assert!(q.report_viewport_index(9));
        let (start, end) = q.visible_range();
        assert!(start <= 9 && 9 < end);
        assert_eq!(end - start, 10);

        assert!(q.report_viewport_index(29));
        assert_eq!(q.visible_range(), (20, 30));
        assert_eq!(q.visible().first().map(|s| s.as_str()), Some("c20"));

        q.deselect_many(&(0..25).map(|i| format!("c{:02}", i)).collect::<Vec<_>>());
        assert_eq!(q.visible_range(), (0, 5));
    }
}
