//! Per-document work queue and in-flight serialization.
//!
//! The document id is the serialization key: at most one pipeline run per
//! document at a time. A second trigger while one is in flight is rejected
//! and the caller re-enqueues instead of running concurrently.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One queued pipeline run. `next_attempt_at` holds retry backoff; items are
/// not due before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub document_id: Uuid,
    pub next_attempt_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct WorkQueue {
    items: Mutex<Vec<WorkItem>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a run for immediate pickup. A document already queued is not
    /// queued twice; the earlier due time wins.
    pub fn push(&self, document_id: Uuid) {
        self.push_at(document_id, Utc::now());
    }

    pub fn push_at(&self, document_id: Uuid, next_attempt_at: DateTime<Utc>) {
        let mut items = self.items.lock().expect("work queue lock poisoned");
        if let Some(existing) = items.iter_mut().find(|i| i.document_id == document_id) {
            if next_attempt_at < existing.next_attempt_at {
                existing.next_attempt_at = next_attempt_at;
            }
            return;
        }
        items.push(WorkItem {
            document_id,
            next_attempt_at,
        });
    }

    /// Pop the oldest item that is due at `now`, if any.
    pub fn pop_due(&self, now: DateTime<Utc>) -> Option<WorkItem> {
        let mut items = self.items.lock().expect("work queue lock poisoned");
        let pos = items.iter().position(|i| i.next_attempt_at <= now)?;
        Some(items.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("work queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registry of document ids with a pipeline run currently executing.
#[derive(Default)]
pub struct InFlight {
    active: Mutex<HashSet<Uuid>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the document for a run. Returns `None` when another run holds
    /// the claim; the guard releases it on drop.
    pub fn try_begin(self: &Arc<Self>, document_id: Uuid) -> Option<InFlightGuard> {
        let mut active = self.active.lock().expect("in-flight lock poisoned");
        if !active.insert(document_id) {
            return None;
        }
        Some(InFlightGuard {
            registry: Arc::clone(self),
            document_id,
        })
    }

    pub fn is_active(&self, document_id: Uuid) -> bool {
        self.active
            .lock()
            .expect("in-flight lock poisoned")
            .contains(&document_id)
    }
}

pub struct InFlightGuard {
    registry: Arc<InFlight>,
    document_id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry
            .active
            .lock()
            .expect("in-flight lock poisoned")
            .remove(&self.document_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn pop_due_respects_backoff() {
        let queue = WorkQueue::new();
        let now = Utc::now();
        let soon = Uuid::new_v4();
        let later = Uuid::new_v4();
        queue.push_at(soon, now);
        queue.push_at(later, now + Duration::seconds(60));

        let item = queue.pop_due(now).unwrap();
        assert_eq!(item.document_id, soon);
        assert!(queue.pop_due(now).is_none());

        let item = queue.pop_due(now + Duration::seconds(61)).unwrap();
        assert_eq!(item.document_id, later);
    }

    #[test]
    fn duplicate_push_keeps_one_item_with_earliest_due_time() {
        let queue = WorkQueue::new();
        let now = Utc::now();
        let id = Uuid::new_v4();
        queue.push_at(id, now + Duration::seconds(120));
        queue.push_at(id, now);

        assert_eq!(queue.len(), 1);
        assert!(queue.pop_due(now).is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn in_flight_rejects_second_claim_until_release() {
        let registry = Arc::new(InFlight::new());
        let id = Uuid::new_v4();

        let guard = registry.try_begin(id).unwrap();
        assert!(registry.try_begin(id).is_none());
        assert!(registry.is_active(id));

        drop(guard);
        assert!(!registry.is_active(id));
        assert!(registry.try_begin(id).is_some());
    }

    #[test]
    fn independent_documents_run_concurrently() {
        let registry = Arc::new(InFlight::new());
        let a = registry.try_begin(Uuid::new_v4());
        let b = registry.try_begin(Uuid::new_v4());
        assert!(a.is_some() && b.is_some());
    }
}
