//! In-memory ordered list of queued prompts.
//!
//! `QueueModel` is never persisted: state is lost on every page reload, by
//! design (spec.md's queue state is explicitly per-tab, not cross-restart).

use uuid::Uuid;

/// Bounded by the engine's queue size cap. Left as an open tunable in the
/// distilled spec (`QUEUE_MAX_SIZE: implementer choice >= 50`); fixed at 200
/// here — generous for a single page's button-driven workflow, small enough
/// that a full linear scan on every scheduler tick stays cheap.
pub const QUEUE_MAX_SIZE: usize = 200;

/// A snapshot of a button taken at the moment of enqueue; later edits to the
/// button that produced it never retroactively change an already-queued item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub queue_id: Uuid,
    pub icon: String,
    pub text: String,
    pub auto_send: bool,
}

impl QueueItem {
    pub fn new(icon: impl Into<String>, text: impl Into<String>, auto_send: bool) -> Self {
        QueueItem {
            queue_id: Uuid::new_v4(),
            icon: icon.into(),
            text: text.into(),
            auto_send,
        }
    }
}

/// Error returned by [`QueueModel::enqueue`] when the queue is already at
/// capacity; callers render this as a visible "edge flash" rather than a
/// hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("queue is full (max {max})")]
pub struct QueueFullError {
    pub max: usize,
}

/// An ordered, contiguously-indexed list of [`QueueItem`]s with a `finished`
/// sentinel distinct from "empty" (spec.md §9: "not derived solely from
/// `items.len()==0`", so the UI can tell "never had items" from "just
/// completed").
#[derive(Debug, Default)]
pub struct QueueModel {
    items: Vec<QueueItem>,
    finished: bool,
}

impl QueueModel {
    pub fn new() -> Self {
        QueueModel::default()
    }

    /// Append a new item captured from `buttonSnapshot`. Rejected once the
    /// queue is at [`QUEUE_MAX_SIZE`]; clears `finished` on success.
    pub fn enqueue(&mut self, item: QueueItem) -> Result<(), QueueFullError> {
        if self.items.len() >= QUEUE_MAX_SIZE {
            return Err(QueueFullError { max: QUEUE_MAX_SIZE });
        }
        self.items.push(item);
        self.finished = false;
        Ok(())
    }

    /// Remove and return the item at `index`. No-op (returns `None`) out of range.
    pub fn remove_at(&mut self, index: usize) -> Option<QueueItem> {
        if index >= self.items.len() {
            return None;
        }
        Some(self.items.remove(index))
    }

    /// Move the item at `from_index` to `to_index`, preserving every item's
    /// `queue_id`. No-op if either index is out of range.
    pub fn reorder(&mut self, from_index: usize, to_index: usize) {
        if from_index >= self.items.len() || to_index >= self.items.len() {
            return;
        }
        let item = self.items.remove(from_index);
        self.items.insert(to_index, item);
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn head(&self) -> Option<&QueueItem> {
        self.items.first()
    }

    pub fn at(&self, index: usize) -> Option<&QueueItem> {
        self.items.get(index)
    }

    /// Remove and return the head item, for the scheduler's dispatch step.
    pub fn shift(&mut self) -> Option<QueueItem> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn set_finished(&mut self, finished: bool) {
        self.finished = finished;
    }

    /// Drop every item without dispatching (used by `reset()`); also clears
    /// `finished`.
    pub fn clear(&mut self) {
        self.items.clear();
        self.finished = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(text: &str) -> QueueItem {
        QueueItem::new("✨", text, true)
    }

    #[test]
    fn enqueue_rejects_past_capacity() {
        let mut q = QueueModel::new();
        for i in 0..QUEUE_MAX_SIZE {
            q.enqueue(item(&i.to_string())).unwrap();
        }
        assert_eq!(q.size(), QUEUE_MAX_SIZE);
        let err = q.enqueue(item("overflow")).unwrap_err();
        assert_eq!(err.max, QUEUE_MAX_SIZE);
        assert_eq!(q.size(), QUEUE_MAX_SIZE);
    }

    #[test]
    fn enqueue_clears_finished() {
        let mut q = QueueModel::new();
        q.set_finished(true);
        q.enqueue(item("a")).unwrap();
        assert!(!q.finished());
    }

    #[test]
    fn remove_at_out_of_range_is_noop() {
        let mut q = QueueModel::new();
        q.enqueue(item("a")).unwrap();
        assert_eq!(q.remove_at(5), None);
        assert_eq!(q.size(), 1);
    }

    #[test]
    fn reorder_preserves_identities() {
        let mut q = QueueModel::new();
        q.enqueue(item("a")).unwrap();
        q.enqueue(item("b")).unwrap();
        q.enqueue(item("c")).unwrap();
        let b_id = q.at(1).unwrap().queue_id;

        q.reorder(1, 0);
        assert_eq!(q.at(0).unwrap().queue_id, b_id);
        assert_eq!(q.at(0).unwrap().text, "b");
    }

    #[test]
    fn every_item_has_a_unique_queue_id() {
        let mut q = QueueModel::new();
        for i in 0..50 {
            q.enqueue(item(&i.to_string())).unwrap();
        }
        let mut ids: Vec<_> = (0..q.size()).map(|i| q.at(i).unwrap().queue_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn finished_is_distinct_from_empty() {
        let mut q = QueueModel::new();
        assert!(!q.finished());
        assert!(q.is_empty());

        q.enqueue(item("a")).unwrap();
        q.shift();
        q.set_finished(true);
        assert!(q.is_empty());
        assert!(q.finished());
    }
}
