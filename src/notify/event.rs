//! Notification events and severity classification.

use serde::{Deserialize, Serialize};

/// Maximum length of an event title.
pub const MAX_TITLE_LEN: usize = 100;
/// Maximum length of an event message body.
pub const MAX_MESSAGE_LEN: usize = 1000;
/// Maximum length of an event id.
pub const MAX_EVENT_ID_LEN: usize = 100;

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Critical,
    Warning,
    Info,
    Suggestion,
}

impl EventLevel {
    /// Queue lane this severity is classified into.
    ///
    /// `critical` and `warning` must reach the user regardless of device;
    /// `info` and `suggestion` can be dropped or deferred.
    #[must_use]
    pub fn lane(self) -> Lane {
        match self {
            Self::Critical | Self::Warning => Lane::Critical,
            Self::Info | Self::Suggestion => Lane::Normal,
        }
    }

    /// Wire name of the level (used in dismissal keys).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Suggestion => "suggestion",
        }
    }
}

/// One of the two bounded queue lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Critical,
    Normal,
}

/// A single notification event. Immutable once created; identity is `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// Caller-supplied unique id (expected to be a fresh UUID per event).
    pub id: String,
    /// Severity.
    pub level: EventLevel,
    /// Short headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Creation time, epoch milliseconds.
    pub created_at: i64,
    /// Free-form producer identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Optional structured payload passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl NotificationEvent {
    /// The `"{source}:{level}"` key used by "don't show again" suppression.
    ///
    /// Events without a source share the `unknown` bucket.
    #[must_use]
    pub fn dismissal_key(&self) -> String {
        format!(
            "{}:{}",
            self.source.as_deref().unwrap_or("unknown"),
            self.level.as_str()
        )
    }

    /// Validate field limits. Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("event id must not be empty".to_owned());
        }
        if self.id.len() > MAX_EVENT_ID_LEN {
            return Err(format!("event id exceeds {MAX_EVENT_ID_LEN} characters"));
        }
        if self.title.is_empty() {
            return Err("event title must not be empty".to_owned());
        }
        if self.title.chars().count() > MAX_TITLE_LEN {
            return Err(format!("event title exceeds {MAX_TITLE_LEN} characters"));
        }
        if self.message.chars().count() > MAX_MESSAGE_LEN {
            return Err(format!(
                "event message exceeds {MAX_MESSAGE_LEN} characters"
            ));
        }
        Ok(())
    }
}
