//! State snapshot persistence.
//!
//! The whole [`NotificationSystemState`] is serialized as one JSON
//! document at a well-known path, read once at actor start and
//! overwritten after every mutation. A missing file yields the default
//! state; unknown fields in an old snapshot are ignored.

use crate::notify::NotificationSystemState;
use crate::{HubError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Persisted snapshot schema version.
const SNAPSHOT_VERSION: u8 = 1;

/// Versioned on-disk wrapper around the aggregate state.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default = "default_version")]
    version: u8,
    #[serde(default)]
    state: NotificationSystemState,
}

fn default_version() -> u8 {
    SNAPSHOT_VERSION
}

/// Handle to the snapshot file. `path = None` disables persistence
/// entirely (used by tests and ephemeral runs).
#[derive(Debug, Clone)]
pub struct StateStore {
    path: Option<PathBuf>,
}

impl StateStore {
    /// Create a store writing to `path`.
    #[must_use]
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// In-memory-only store that never touches disk.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self { path: None }
    }

    /// Default snapshot location under the platform data directory.
    #[must_use]
    pub fn default_state_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("hearth").join("notify_state.json"))
    }

    /// Load the persisted state; a missing file is the default state.
    pub fn load(&self) -> Result<NotificationSystemState> {
        let Some(path) = &self.path else {
            return Ok(NotificationSystemState::default());
        };

        let bytes = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(NotificationSystemState::default());
            }
            Err(e) => {
                return Err(HubError::Storage(format!("cannot read state: {e}")));
            }
        };

        let persisted: PersistedState = serde_json::from_slice(&bytes)
            .map_err(|e| HubError::Storage(format!("cannot parse state: {e}")))?;

        Ok(persisted.state)
    }

    /// Overwrite the snapshot with `state`.
    pub fn save(&self, state: &NotificationSystemState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HubError::Storage(format!("cannot create state dir: {e}")))?;
        }

        let persisted = PersistedState {
            version: SNAPSHOT_VERSION,
            state: state.clone(),
        };
        let json = serde_json::to_string(&persisted)
            .map_err(|e| HubError::Storage(format!("cannot serialize state: {e}")))?;

        std::fs::write(path, json)
            .map_err(|e| HubError::Storage(format!("cannot write state: {e}")))?;

        Ok(())
    }
}
