//! Aggregate notification state and its operations.
//!
//! [`NotificationSystemState`] is the single source of truth the
//! coordinator actor owns. Every public operation here is a synchronous
//! state transform taking `now` explicitly; the actor wraps them with
//! persistence and fan-out. Keeping the transforms free of I/O means the
//! delivery rules (including the critical-purge barrier) are unit-testable
//! without a runtime.

use super::devices::{ActivityReport, DevicePresence, DeviceRegistry};
use super::event::{EventLevel, NotificationEvent};
use super::presence::{PresenceState, calculate_presence};
use super::queue::EventQueue;
use super::throttle::ThrottleState;
use super::HubLimits;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Bounded, insertion-ordered set of dismissal keys with FIFO eviction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DismissalSet {
    keys: VecDeque<String>,
}

impl DismissalSet {
    /// Whether `key` has been dismissed.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Remember `key`, evicting the oldest entry when at capacity.
    /// Re-inserting an existing key is a no-op.
    pub fn insert(&mut self, key: String, capacity: usize) {
        if self.contains(&key) {
            return;
        }
        while self.keys.len() >= capacity.max(1) {
            self.keys.pop_front();
        }
        self.keys.push_back(key);
    }

    /// Number of remembered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Machine-readable reason an event was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectReason {
    /// Suppressed by a "don't show again" dismissal key.
    Dismissed,
    /// Rejected by the suggestion throttle.
    Throttled,
}

/// Result of an `add_event` operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEventOutcome {
    /// Whether the event entered a lane.
    pub queued: bool,
    /// Queued but held back from live push (active-presence suggestion).
    pub delayed: bool,
    /// Policy reason when not queued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    /// Total queued events after the operation.
    pub queue_size: usize,
}

/// Result of a `dismiss` operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DismissOutcome {
    /// Whether an event was actually removed. Dismissing an absent id is
    /// a successful no-op with `dismissed = false`.
    pub dismissed: bool,
    /// Key recorded when `dont_show_again` was requested and the event
    /// was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dismissal_key: Option<String>,
}

/// Result of a `report_device_activity` operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityOutcome {
    /// Updated device record.
    pub device: DevicePresence,
    /// Recomputed presence.
    pub presence: PresenceState,
    /// Whether this device is currently the most-active one.
    pub is_most_active: bool,
}

/// Per-event acknowledgment progress, reported from `flush`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDeliveryStatus {
    pub event_id: String,
    /// Active devices that have acknowledged this event.
    pub acknowledged: Vec<String>,
    /// Active devices the event is still queued for.
    pub pending: Vec<String>,
}

/// The events handed out by one `flush_queue` call, split by lane.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushedEvents {
    /// Critical-lane events (always delivered in full to every caller).
    pub critical: Vec<NotificationEvent>,
    /// Normal-lane events (only for the target device; empty otherwise).
    pub normal: Vec<NotificationEvent>,
}

/// Result of a `flush_queue` operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushResult {
    /// Delivered events, by lane.
    pub events: FlushedEvents,
    /// Whether the caller was the normal-lane target.
    pub is_target_device: bool,
    /// Acknowledgment progress for events still held in the critical lane.
    pub delivery_status: Vec<EventDeliveryStatus>,
}

/// Summary of one maintenance pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaintenanceReport {
    pub pruned_devices: usize,
    pub throttle_reset: bool,
}

/// The aggregate root owned by the coordinator actor.
///
/// Mutated exclusively through the operations below; persisted after every
/// successful mutation; may be evicted from memory between requests, so
/// nothing here depends on in-memory continuity beyond one operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSystemState {
    /// Two-lane bounded event queue.
    pub queue: EventQueue,
    /// Device liveness registry.
    pub devices: DeviceRegistry,
    /// Derived user presence.
    pub presence: PresenceState,
    /// Suggestion throttle.
    pub throttle: ThrottleState,
    /// "Don't show again" suppression keys.
    pub dismissed: DismissalSet,
    /// Critical delivery ledger: event id → acknowledging device ids.
    /// Entries exist only for events currently in the critical lane.
    pub critical_delivered: BTreeMap<String, BTreeSet<String>>,
    /// Last flush time, epoch milliseconds.
    pub last_sync_at: i64,
}

impl NotificationSystemState {
    /// Add an event: dismissal suppression first, throttle second, then
    /// enqueue. Suggestion budget is consumed even when the suggestion is
    /// delayed, since a delayed suggestion will eventually be shown.
    pub fn add_event(
        &mut self,
        event: NotificationEvent,
        limits: &HubLimits,
        now: i64,
    ) -> AddEventOutcome {
        if self.dismissed.contains(&event.dismissal_key()) {
            return AddEventOutcome {
                queued: false,
                delayed: false,
                reason: Some(RejectReason::Dismissed),
                queue_size: self.queue.len(),
            };
        }

        let is_suggestion = event.level == EventLevel::Suggestion;
        if is_suggestion && !self.throttle.can_show(now) {
            return AddEventOutcome {
                queued: false,
                delayed: false,
                reason: Some(RejectReason::Throttled),
                queue_size: self.queue.len(),
            };
        }

        self.queue.push(
            event,
            limits.critical_capacity,
            limits.normal_capacity,
            now,
        );
        // Enqueue may have evicted a critical event; its ledger entry must
        // not outlive it.
        self.gc_ledger();

        let delayed = is_suggestion && self.presence.is_active();
        if is_suggestion {
            self.throttle.record_shown(now);
        }

        AddEventOutcome {
            queued: true,
            delayed,
            reason: None,
            queue_size: self.queue.len(),
        }
    }

    /// Remove an event from whichever lane holds it. Unknown ids are a
    /// successful no-op, so racing or repeated dismiss calls are safe.
    pub fn dismiss(
        &mut self,
        event_id: &str,
        dont_show_again: bool,
        limits: &HubLimits,
        now: i64,
    ) -> DismissOutcome {
        let removed = self.queue.remove(event_id, now);
        self.gc_ledger();

        let dismissal_key = match (&removed, dont_show_again) {
            (Some(event), true) => {
                let key = event.dismissal_key();
                self.dismissed.insert(key.clone(), limits.dismissal_capacity);
                Some(key)
            }
            _ => None,
        };

        DismissOutcome {
            dismissed: removed.is_some(),
            dismissal_key,
        }
    }

    /// Apply a device activity report and recompute presence.
    pub fn report_activity(
        &mut self,
        report: ActivityReport,
        limits: &HubLimits,
        now: i64,
    ) -> ActivityOutcome {
        let has_activity = report.has_activity;
        let device = self.devices.upsert(report, limits.device_capacity, now);

        if has_activity {
            // An explicit positive signal wins immediately; no threshold
            // math involved.
            self.presence = PresenceState::Active {
                last_activity_at: now,
            };
        } else {
            self.recompute_presence(limits, now);
        }

        let is_most_active = self
            .devices
            .most_active()
            .is_some_and(|d| d.device_id == device.device_id);

        ActivityOutcome {
            device,
            presence: self.presence,
            is_most_active,
        }
    }

    /// The delivery protocol.
    ///
    /// Critical events are returned in full to every caller and recorded
    /// in the ledger for the calling device; an event leaves the critical
    /// lane only once every currently active device has acknowledged it.
    /// Normal-lane events go to the most-active device only (or an
    /// untargeted flush) and are discarded once served.
    pub fn flush(&mut self, device_id: Option<&str>, now: i64) -> FlushResult {
        let most_active_id = self.devices.most_active().map(|d| d.device_id.clone());
        let is_target_device = match device_id {
            None => true,
            Some(id) => most_active_id.as_deref() == Some(id),
        };

        let critical: Vec<NotificationEvent> = self.queue.critical.iter().cloned().collect();

        if let Some(id) = device_id {
            for event in &critical {
                self.critical_delivered
                    .entry(event.id.clone())
                    .or_default()
                    .insert(id.to_owned());
            }
        }

        // Purge criticals acknowledged by every currently active device.
        // The barrier is re-validated against the current active set each
        // flush, so pruned devices neither block nor satisfy it. An empty
        // active set never purges — critical events are not silently
        // dropped just because nobody is listening.
        let active_ids = self.devices.active_ids();
        if !active_ids.is_empty() {
            let ledger = &self.critical_delivered;
            let before = self.queue.critical.len();
            self.queue.critical.retain(|event| {
                let acked = ledger.get(&event.id);
                !active_ids
                    .iter()
                    .all(|dev| acked.is_some_and(|set| set.contains(dev)))
            });
            if self.queue.critical.len() != before {
                self.queue.updated_at = now;
            }
        }
        self.gc_ledger();

        let normal = if is_target_device {
            self.queue.take_normal(now)
        } else {
            Vec::new()
        };

        let delivery_status = self
            .queue
            .critical
            .iter()
            .map(|event| {
                let acked = self.critical_delivered.get(&event.id);
                let (acknowledged, pending): (Vec<String>, Vec<String>) = active_ids
                    .iter()
                    .cloned()
                    .partition(|dev| acked.is_some_and(|set| set.contains(dev)));
                EventDeliveryStatus {
                    event_id: event.id.clone(),
                    acknowledged,
                    pending,
                }
            })
            .collect();

        self.last_sync_at = now;

        FlushResult {
            events: FlushedEvents { critical, normal },
            is_target_device,
            delivery_status,
        }
    }

    /// Periodic maintenance: presence recompute, device pruning, throttle
    /// session reset.
    pub fn run_maintenance(&mut self, limits: &HubLimits, now: i64) -> MaintenanceReport {
        self.recompute_presence(limits, now);
        let pruned_devices = self.devices.prune(now, limits.prune_idle_ms);
        let throttle_reset = self
            .throttle
            .maybe_reset_session(now, limits.session_reset_after_ms);
        MaintenanceReport {
            pruned_devices,
            throttle_reset,
        }
    }

    /// Flag a device inactive (socket closed) and recompute presence.
    /// Returns `true` when the device was known.
    pub fn device_disconnected(&mut self, device_id: &str, limits: &HubLimits, now: i64) -> bool {
        let known = self.devices.mark_inactive(device_id);
        if known {
            self.recompute_presence(limits, now);
        }
        known
    }

    /// Recompute presence from the most-active device; with no active
    /// device the user is away as of now.
    pub fn recompute_presence(&mut self, limits: &HubLimits, now: i64) {
        self.presence = match self.devices.most_active() {
            Some(device) => calculate_presence(
                device.last_activity_at,
                now,
                limits.think_threshold_ms,
                limits.away_threshold_ms,
            ),
            None => PresenceState::Away { since: now },
        };
    }

    /// Drop ledger entries whose event no longer sits in the critical
    /// lane. Stale entries for purged or evicted events are a silent leak
    /// otherwise.
    pub fn gc_ledger(&mut self) {
        let queue = &self.queue;
        self.critical_delivered
            .retain(|event_id, _| queue.critical_contains(event_id));
    }
}
