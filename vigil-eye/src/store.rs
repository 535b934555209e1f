//! The current detection set and its staleness guard

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;
use vigil_core::Detection;

/// Read-only view of the published detections.
#[derive(Debug, Clone)]
pub struct DetectionSnapshot {
    pub detections: Arc<[Detection]>,
    /// When the set was published; `None` if cleared
    pub published_at: Option<DateTime<Utc>>,
    pub epoch: u64,
}

impl DetectionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }
}

struct StoreInner {
    detections: Arc<[Detection]>,
    published_at: Option<DateTime<Utc>>,
    epoch: u64,
}

/// Holds the detection set shared by both inference paths.
///
/// Every writer first takes a ticket (the current epoch). A publish only
/// lands if no one has advanced the epoch since, so results from a stopped
/// loop, a previous mode or an older image request are dropped.
pub struct DetectionStore {
    inner: RwLock<StoreInner>,
}

impl DetectionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                detections: Arc::from(Vec::new()),
                published_at: None,
                epoch: 0,
            }),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.inner.read().epoch
    }

    /// Take a ticket that supersedes every earlier one. The set is kept.
    pub fn begin_request(&self) -> u64 {
        let mut inner = self.inner.write();
        inner.epoch += 1;
        inner.epoch
    }

    /// Supersede every outstanding ticket and empty the set.
    pub fn invalidate(&self) -> u64 {
        let mut inner = self.inner.write();
        inner.epoch += 1;
        inner.detections = Arc::from(Vec::new());
        inner.published_at = None;
        inner.epoch
    }

    /// Replace the set wholesale if `ticket` is still current.
    pub fn publish(&self, ticket: u64, detections: Vec<Detection>) -> bool {
        let mut inner = self.inner.write();
        if inner.epoch != ticket {
            debug!(
                "Discarding stale detections (ticket {}, current epoch {})",
                ticket, inner.epoch
            );
            return false;
        }
        inner.detections = Arc::from(detections);
        inner.published_at = Some(Utc::now());
        true
    }

    pub fn snapshot(&self) -> DetectionSnapshot {
        let inner = self.inner.read();
        DetectionSnapshot {
            detections: inner.detections.clone(),
            published_at: inner.published_at,
            epoch: inner.epoch,
        }
    }

    pub fn detections(&self) -> Vec<Detection> {
        self.inner.read().detections.to_vec()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().detections.is_empty()
    }
}

impl Default for DetectionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::BoundingBox;

    fn det(label: &str) -> Detection {
        Detection::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), label, 0.9)
    }

    #[test]
    fn test_publish_with_current_ticket() {
        let store = DetectionStore::new();
        let ticket = store.epoch();
        assert!(store.publish(ticket, vec![det("cat")]));
        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        assert!(snap.published_at.is_some());
    }

    #[test]
    fn test_publish_replaces_wholesale() {
        let store = DetectionStore::new();
        let ticket = store.epoch();
        store.publish(ticket, vec![det("cat"), det("dog")]);
        store.publish(ticket, vec![det("cup")]);
        let labels: Vec<String> = store.detections().into_iter().map(|d| d.label).collect();
        assert_eq!(labels, vec!["cup".to_string()]);
    }

    #[test]
    fn test_newer_request_supersedes_older() {
        let store = DetectionStore::new();
        let first = store.begin_request();
        let second = store.begin_request();

        assert!(store.publish(second, vec![det("new")]));
        assert!(!store.publish(first, vec![det("old")]));
        assert_eq!(store.detections()[0].label, "new");
    }

    #[test]
    fn test_begin_request_keeps_set() {
        let store = DetectionStore::new();
        store.publish(store.epoch(), vec![det("cat")]);
        store.begin_request();
        assert!(!store.is_empty());
    }

    #[test]
    fn test_invalidate_clears_and_blocks_stale() {
        let store = DetectionStore::new();
        let ticket = store.epoch();
        store.publish(ticket, vec![det("cat")]);

        store.invalidate();
        assert!(store.is_empty());
        assert!(store.snapshot().published_at.is_none());
        assert!(!store.publish(ticket, vec![det("late")]));
        assert!(store.is_empty());
    }
}
