//! Per-item progress subscriptions.
//!
//! `ProgressSource` hides where fractional progress comes from. The service
//! publishes snapshots on the response channel, which `PublishedProgress` fans
//! out to whoever subscribed to that item; `NullProgressSource` never fires.

use crate::model::{ProgressSnapshot, WorkItem};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: u64,
    item: WorkItem,
}

pub trait ProgressSource: Send + Sync {
    /// Start observing `item`; `on_change` runs on every fractional change.
    fn subscribe(&self, item: &WorkItem, on_change: ProgressCallback) -> SubscriptionHandle;

    /// Stop observing. Safe to call repeatedly or after progress has finished.
    fn unsubscribe(&self, handle: &SubscriptionHandle);
}

#[derive(Debug, Default)]
pub struct NullProgressSource {
    next_id: AtomicU64,
}

impl ProgressSource for NullProgressSource {
    fn subscribe(&self, item: &WorkItem, _on_change: ProgressCallback) -> SubscriptionHandle {
        SubscriptionHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            item: item.clone(),
        }
    }

    fn unsubscribe(&self, _handle: &SubscriptionHandle) {}
}

/// Progress published by the service over the response channel.
#[derive(Default)]
pub struct PublishedProgress {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<WorkItem, (u64, ProgressCallback)>>,
}

impl PublishedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<WorkItem, (u64, ProgressCallback)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand a snapshot to the current subscriber of its item. Snapshots for items
    /// nobody (or nobody any longer) subscribes to are dropped.
    pub fn publish(&self, snapshot: ProgressSnapshot) {
        let callback = self
            .subscribers()
            .get(&snapshot.for_item)
            .map(|(_, cb)| cb.clone());
        match callback {
            Some(cb) => cb(snapshot),
            None => trace!(item = %snapshot.for_item, "dropping unobserved progress"),
        }
    }

    pub fn is_subscribed(&self, item: &WorkItem) -> bool {
        self.subscribers().contains_key(item)
    }
}

impl ProgressSource for PublishedProgress {
    fn subscribe(&self, item: &WorkItem, on_change: ProgressCallback) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers().insert(item.clone(), (id, on_change));
        SubscriptionHandle {
            id,
            item: item.clone(),
        }
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut subscribers = self.subscribers();
        // A stale handle must not tear down a newer subscription for the same item.
        if subscribers
            .get(&handle.item)
            .is_some_and(|(id, _)| *id == handle.id)
        {
            subscribers.remove(&handle.item);
        }
    }
}
