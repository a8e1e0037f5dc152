//! Per-job activity log of received stream events.
//!
//! Events are kept in arrival order, newest first. The event's own
//! `timestamp` is never used for ordering: what the operator sees is the
//! order in which the transport delivered things. Nothing is deduplicated,
//! since every push is a distinct occurrence on the server side.

use std::collections::VecDeque;

use super::models::StreamEvent;

/// One store exists per mounted job view and is dropped with it.
#[derive(Debug, Default, Clone)]
pub struct Timeline {
    events: VecDeque<StreamEvent>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: StreamEvent) {
        self.events.push_front(event);
    }

    /// Snapshot of the current sequence, newest first.
    pub fn all(&self) -> Vec<StreamEvent> {
        self.events.iter().cloned().collect()
    }

    /// Only used when the view switches to a different job.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
