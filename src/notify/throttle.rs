//! Suggestion throttle.
//!
//! Limits how often `suggestion`-level events may reach the user: a
//! cooldown window between suggestions plus a per-session cap. Other
//! severities bypass this entirely.

use serde::{Deserialize, Serialize};

/// Default minimum gap between shown suggestions.
pub const DEFAULT_SUGGESTION_COOLDOWN_MS: i64 = 300_000;
/// Default per-session suggestion cap.
pub const DEFAULT_SESSION_CAP: u32 = 5;

/// Throttle policy state for suggestion-level events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleState {
    /// Minimum gap between shown suggestions, milliseconds.
    pub cooldown_ms: i64,
    /// Maximum suggestions per session.
    pub session_cap: u32,
    /// Suggestions consumed this session.
    #[serde(default)]
    pub session_count: u32,
    /// When the last suggestion was accepted, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_shown_at: Option<i64>,
}

impl Default for ThrottleState {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_SUGGESTION_COOLDOWN_MS,
            session_cap: DEFAULT_SESSION_CAP,
            session_count: 0,
            last_shown_at: None,
        }
    }
}

impl ThrottleState {
    /// Whether a suggestion may be shown at `now`.
    #[must_use]
    pub fn can_show(&self, now: i64) -> bool {
        if self.session_count >= self.session_cap {
            return false;
        }
        if let Some(last) = self.last_shown_at
            && now - last < self.cooldown_ms
        {
            return false;
        }
        true
    }

    /// Consume budget for an accepted suggestion. Delayed suggestions
    /// still consume budget — they will eventually be shown.
    pub fn record_shown(&mut self, now: i64) {
        self.last_shown_at = Some(now);
        self.session_count += 1;
    }

    /// Maintenance reset: clear the session counter once the last shown
    /// suggestion is older than `reset_after_ms`. Returns `true` when a
    /// reset happened.
    pub fn maybe_reset_session(&mut self, now: i64, reset_after_ms: i64) -> bool {
        if let Some(last) = self.last_shown_at
            && now - last > reset_after_ms
            && self.session_count > 0
        {
            self.session_count = 0;
            return true;
        }
        false
    }
}
