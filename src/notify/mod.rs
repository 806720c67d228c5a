//! Notification & presence domain model.
//!
//! Everything in this module is pure state transformation — no I/O, no
//! clocks. Callers pass `now` (epoch milliseconds) explicitly so the
//! eviction, throttle, and presence rules stay testable in isolation.
//! The coordinator actor owns the single live [`NotificationSystemState`]
//! and is the only writer.

pub mod devices;
pub mod event;
pub mod presence;
pub mod queue;
pub mod state;
pub mod throttle;

pub use devices::{ActivityReport, DevicePresence, DeviceRegistry};
pub use event::{EventLevel, Lane, NotificationEvent};
pub use presence::{PresenceState, calculate_presence};
pub use queue::EventQueue;
pub use state::{
    ActivityOutcome, AddEventOutcome, DismissOutcome, DismissalSet, EventDeliveryStatus,
    FlushResult, FlushedEvents, MaintenanceReport, NotificationSystemState, RejectReason,
};
pub use throttle::ThrottleState;

/// Capacity of the critical lane.
pub const CRITICAL_LANE_CAPACITY: usize = 5;
/// Capacity of the normal lane.
pub const NORMAL_LANE_CAPACITY: usize = 15;
/// Maximum number of tracked devices.
pub const DEVICE_REGISTRY_CAPACITY: usize = 10;
/// Maximum number of remembered dismissal keys.
pub const DISMISSAL_SET_CAPACITY: usize = 100;
/// Presence flips from `active` to `thinking` after this much idle time.
pub const DEFAULT_THINK_THRESHOLD_MS: i64 = 60_000;
/// Presence flips to `away` after this much idle time.
pub const DEFAULT_AWAY_THRESHOLD_MS: i64 = 300_000;
/// Inactive devices idle longer than this are pruned during maintenance.
pub const DEFAULT_DEVICE_PRUNE_IDLE_MS: i64 = 600_000;
/// Suggestion session counter resets once the last one is this old.
pub const SESSION_RESET_AFTER_MS: i64 = 24 * 3600 * 1000;

/// Tunable bounds and thresholds threaded through the state transforms.
///
/// Defaults carry the documented limits; the config layer can override
/// them without the domain code knowing about config files.
#[derive(Debug, Clone, Copy)]
pub struct HubLimits {
    /// Critical lane capacity.
    pub critical_capacity: usize,
    /// Normal lane capacity.
    pub normal_capacity: usize,
    /// Device registry capacity.
    pub device_capacity: usize,
    /// Dismissal set capacity.
    pub dismissal_capacity: usize,
    /// Idle time before `active` becomes `thinking`.
    pub think_threshold_ms: i64,
    /// Idle time before presence becomes `away`.
    pub away_threshold_ms: i64,
    /// Idle time after which inactive devices are pruned.
    pub prune_idle_ms: i64,
    /// Age of the last shown suggestion that triggers a session reset.
    pub session_reset_after_ms: i64,
}

impl Default for HubLimits {
    fn default() -> Self {
        Self {
            critical_capacity: CRITICAL_LANE_CAPACITY,
            normal_capacity: NORMAL_LANE_CAPACITY,
            device_capacity: DEVICE_REGISTRY_CAPACITY,
            dismissal_capacity: DISMISSAL_SET_CAPACITY,
            think_threshold_ms: DEFAULT_THINK_THRESHOLD_MS,
            away_threshold_ms: DEFAULT_AWAY_THRESHOLD_MS,
            prune_idle_ms: DEFAULT_DEVICE_PRUNE_IDLE_MS,
            session_reset_after_ms: SESSION_RESET_AFTER_MS,
        }
    }
}

/// Current time as epoch milliseconds.
#[must_use]
pub fn now_epoch_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
