//! Per-invocation bookkeeping for a submitted batch.
//!
//! `JobSession` is plain data; it is owned by the aggregator task and never
//! shared, so none of its methods lock.

use crate::model::{
    FinalReport, OptimisationResponse, OptimisationResponseError, ProgressSnapshot, WorkItem,
};
use std::collections::{HashMap, HashSet};
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingItem {
    pub item: WorkItem,
    pub fraction: f64,
    pub status: Option<String>,
}

/// Immutable copy of the session used for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Unresolved items in submission order.
    pub pending: Vec<PendingItem>,
}

impl SessionView {
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[derive(Debug)]
pub struct JobSession {
    items: Vec<WorkItem>,
    known: HashSet<WorkItem>,
    responses: HashMap<WorkItem, OptimisationResponse>,
    errors: HashMap<WorkItem, OptimisationResponseError>,
    live_progress: HashMap<WorkItem, ProgressSnapshot>,
}

impl JobSession {
    pub fn new(items: Vec<WorkItem>) -> Self {
        let known = items.iter().cloned().collect();
        Self {
            items,
            known,
            responses: HashMap::new(),
            errors: HashMap::new(),
            live_progress: HashMap::new(),
        }
    }

    fn is_known(&self, item: &WorkItem) -> bool {
        if self.known.contains(item) {
            return true;
        }
        warn!(%item, "ignoring event for an item outside this batch");
        false
    }

    pub fn is_resolved(&self, item: &WorkItem) -> bool {
        self.responses.contains_key(item) || self.errors.contains_key(item)
    }

    /// Record a success. The latest terminal event for an item wins.
    /// Returns whether anything changed.
    pub fn record_success(&mut self, response: OptimisationResponse) -> bool {
        if !self.is_known(&response.for_item) {
            return false;
        }
        let item = response.for_item.clone();
        self.live_progress.remove(&item);
        self.errors.remove(&item);
        self.responses.insert(item, response);
        true
    }

    pub fn record_failure(&mut self, error: OptimisationResponseError) -> bool {
        if !self.is_known(&error.for_item) {
            return false;
        }
        let item = error.for_item.clone();
        self.live_progress.remove(&item);
        self.responses.remove(&item);
        self.errors.insert(item, error);
        true
    }

    /// Record intermediate progress. Snapshots for resolved items and snapshots
    /// that would move an item backwards are ignored.
    pub fn record_progress(&mut self, mut snapshot: ProgressSnapshot) -> bool {
        if snapshot.fraction_completed.is_nan() || !self.is_known(&snapshot.for_item) {
            return false;
        }
        if self.is_resolved(&snapshot.for_item) {
            return false;
        }
        snapshot.fraction_completed = snapshot.fraction_completed.clamp(0.0, 1.0);

        match self.live_progress.get_mut(&snapshot.for_item) {
            Some(current) if snapshot.fraction_completed < current.fraction_completed => false,
            Some(current) if snapshot.fraction_completed == current.fraction_completed => {
                if snapshot.status.is_some() && snapshot.status != current.status {
                    current.status = snapshot.status;
                    true
                } else {
                    false
                }
            }
            _ => {
                self.live_progress
                    .insert(snapshot.for_item.clone(), snapshot);
                true
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.responses.len() + self.errors.len() == self.items.len()
    }

    pub fn pending(&self) -> Vec<WorkItem> {
        self.items
            .iter()
            .filter(|item| !self.is_resolved(item))
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> SessionView {
        let pending = self
            .items
            .iter()
            .filter(|item| !self.is_resolved(item))
            .map(|item| {
                let live = self.live_progress.get(item);
                PendingItem {
                    item: item.clone(),
                    fraction: live.map_or(0.0, |p| p.fraction_completed),
                    status: live.and_then(|p| p.status.clone()),
                }
            })
            .collect();
        SessionView {
            total: self.items.len(),
            succeeded: self.responses.len(),
            failed: self.errors.len(),
            pending,
        }
    }

    /// Successes and failures sorted by item, plus whatever never resolved.
    pub fn report(&self) -> FinalReport {
        let mut done: Vec<_> = self.responses.values().cloned().collect();
        done.sort_by(|a, b| a.for_item.cmp(&b.for_item));
        let mut failed: Vec<_> = self.errors.values().cloned().collect();
        failed.sort_by(|a, b| a.for_item.cmp(&b.for_item));
        FinalReport {
            done,
            failed,
            pending: self.pending(),
        }
    }
}
