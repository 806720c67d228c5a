//! Derived user presence.

use serde::{Deserialize, Serialize};

/// Tri-state presence signal derived from device activity.
///
/// Never mutated directly by clients — recomputed from activity reports
/// and during periodic maintenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum PresenceState {
    /// User active within the think threshold.
    Active { last_activity_at: i64 },
    /// Idle, but not long enough to be away.
    Thinking { since: i64 },
    /// No recent activity on any device.
    Away { since: i64 },
}

impl PresenceState {
    /// Whether the user currently counts as actively present.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

impl Default for PresenceState {
    fn default() -> Self {
        Self::Away { since: 0 }
    }
}

/// Map time-since-last-activity into a presence state.
///
/// `< think_threshold_ms` → active, `< away_threshold_ms` → thinking,
/// else away. An explicit positive activity report bypasses this and sets
/// `active` directly (the caller handles that path).
#[must_use]
pub fn calculate_presence(
    last_activity_at: i64,
    now: i64,
    think_threshold_ms: i64,
    away_threshold_ms: i64,
) -> PresenceState {
    let idle = now - last_activity_at;
    if idle < think_threshold_ms {
        PresenceState::Active { last_activity_at }
    } else if idle < away_threshold_ms {
        PresenceState::Thinking {
            since: last_activity_at,
        }
    } else {
        PresenceState::Away {
            since: last_activity_at,
        }
    }
}
