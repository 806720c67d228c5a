//! Two-lane bounded event queue with FIFO eviction.

use super::event::{Lane, NotificationEvent};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// The pending-notification queue: two ordered lanes, each with a fixed
/// capacity. Overflow always drops the oldest entry, never the newest, so
/// the retained elements are the most recent N in arrival order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQueue {
    /// Critical lane (critical + warning severities).
    #[serde(default)]
    pub critical: VecDeque<NotificationEvent>,
    /// Normal lane (info + suggestion severities).
    #[serde(default)]
    pub normal: VecDeque<NotificationEvent>,
    /// Last mutation time, epoch milliseconds.
    #[serde(default)]
    pub updated_at: i64,
}

impl EventQueue {
    /// Append `event` to its classified lane, evicting the oldest entry
    /// first when the lane is at capacity (cap-then-append, so the lane
    /// can never exceed its capacity).
    pub fn push(
        &mut self,
        event: NotificationEvent,
        critical_capacity: usize,
        normal_capacity: usize,
        now: i64,
    ) {
        let (lane, capacity) = match event.level.lane() {
            Lane::Critical => (&mut self.critical, critical_capacity),
            Lane::Normal => (&mut self.normal, normal_capacity),
        };
        while lane.len() >= capacity.max(1) {
            lane.pop_front();
        }
        lane.push_back(event);
        self.updated_at = now;
    }

    /// Remove the event with `event_id` from whichever lane contains it.
    ///
    /// Returns the removed event, or `None` when no lane holds that id
    /// (callers treat that as a successful no-op).
    pub fn remove(&mut self, event_id: &str, now: i64) -> Option<NotificationEvent> {
        for lane in [&mut self.critical, &mut self.normal] {
            if let Some(pos) = lane.iter().position(|e| e.id == event_id) {
                let removed = lane.remove(pos);
                self.updated_at = now;
                return removed;
            }
        }
        None
    }

    /// Whether the critical lane holds `event_id`.
    #[must_use]
    pub fn critical_contains(&self, event_id: &str) -> bool {
        self.critical.iter().any(|e| e.id == event_id)
    }

    /// Total number of queued events across both lanes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.critical.len() + self.normal.len()
    }

    /// Whether both lanes are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.critical.is_empty() && self.normal.is_empty()
    }

    /// Drain the normal lane, returning its contents in arrival order.
    pub fn take_normal(&mut self, now: i64) -> Vec<NotificationEvent> {
        if self.normal.is_empty() {
            return Vec::new();
        }
        self.updated_at = now;
        self.normal.drain(..).collect()
    }
}
