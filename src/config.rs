//! Configuration for the hearth hub.

use crate::notify::{HubLimits, ThrottleState};
use crate::{HubError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file path.
pub const CONFIG_PATH_ENV: &str = "HEARTH_CONFIG";

/// Top-level hub configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// HTTP/WebSocket server settings.
    pub server: ServerConfig,
    /// Presence threshold settings.
    pub presence: PresenceConfig,
    /// Suggestion throttle settings.
    pub throttle: ThrottleConfig,
    /// Queue lane capacities.
    pub queue: QueueConfig,
    /// Device registry settings.
    pub devices: DeviceConfig,
    /// Periodic maintenance settings.
    pub maintenance: MaintenanceConfig,
    /// State snapshot settings.
    pub storage: StorageConfig,
}

/// HTTP/WebSocket listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port (0 = ephemeral).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 4090,
        }
    }
}

/// Presence threshold configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Idle time before `active` becomes `thinking`, milliseconds.
    pub think_threshold_ms: i64,
    /// Idle time before presence becomes `away`, milliseconds.
    pub away_threshold_ms: i64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            think_threshold_ms: crate::notify::DEFAULT_THINK_THRESHOLD_MS,
            away_threshold_ms: crate::notify::DEFAULT_AWAY_THRESHOLD_MS,
        }
    }
}

/// Suggestion throttle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Minimum gap between shown suggestions, milliseconds.
    pub cooldown_ms: i64,
    /// Maximum suggestions per session.
    pub session_cap: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: crate::notify::throttle::DEFAULT_SUGGESTION_COOLDOWN_MS,
            session_cap: crate::notify::throttle::DEFAULT_SESSION_CAP,
        }
    }
}

/// Lane capacity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Critical lane capacity.
    pub critical_capacity: usize,
    /// Normal lane capacity.
    pub normal_capacity: usize,
    /// Dismissal set capacity.
    pub dismissal_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            critical_capacity: crate::notify::CRITICAL_LANE_CAPACITY,
            normal_capacity: crate::notify::NORMAL_LANE_CAPACITY,
            dismissal_capacity: crate::notify::DISMISSAL_SET_CAPACITY,
        }
    }
}

/// Device registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Maximum tracked devices.
    pub registry_capacity: usize,
    /// Inactive devices idle longer than this are pruned, milliseconds.
    pub prune_idle_ms: i64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            registry_capacity: crate::notify::DEVICE_REGISTRY_CAPACITY,
            prune_idle_ms: crate::notify::DEFAULT_DEVICE_PRUNE_IDLE_MS,
        }
    }
}

/// Maintenance cycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Interval between maintenance ticks, seconds.
    pub interval_secs: u64,
    /// Age of the last shown suggestion that resets the session counter,
    /// milliseconds.
    pub session_reset_after_ms: i64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            session_reset_after_ms: crate::notify::SESSION_RESET_AFTER_MS,
        }
    }
}

/// State snapshot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshot path. `None` uses the platform default data directory.
    pub state_path: Option<PathBuf>,
    /// Await the snapshot write before responding.
    ///
    /// Off by default: responses are built from the updated in-memory
    /// state and the write races completion, which can lose the very last
    /// mutation on a crash. Turning this on trades latency for
    /// durability.
    pub durable_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: None,
            durable_writes: false,
        }
    }
}

impl HubConfig {
    /// Load from the default path (or `HEARTH_CONFIG`); a missing file
    /// yields the defaults.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(HubError::Config(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        toml::from_str(&contents)
            .map_err(|e| HubError::Config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Write the config as TOML to `path`.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| HubError::Config(format!("cannot create config dir: {e}")))?;
        }
        let toml = toml::to_string_pretty(self)
            .map_err(|e| HubError::Config(format!("cannot serialize config: {e}")))?;
        std::fs::write(path, toml)
            .map_err(|e| HubError::Config(format!("cannot write config: {e}")))?;
        Ok(())
    }

    /// Resolved config file path: `HEARTH_CONFIG` override, else
    /// `<config dir>/hearth/config.toml`.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|d| d.join("hearth").join("config.toml"))
    }

    /// Bounds and thresholds for the state transforms.
    #[must_use]
    pub fn limits(&self) -> HubLimits {
        HubLimits {
            critical_capacity: self.queue.critical_capacity,
            normal_capacity: self.queue.normal_capacity,
            device_capacity: self.devices.registry_capacity,
            dismissal_capacity: self.queue.dismissal_capacity,
            think_threshold_ms: self.presence.think_threshold_ms,
            away_threshold_ms: self.presence.away_threshold_ms,
            prune_idle_ms: self.devices.prune_idle_ms,
            session_reset_after_ms: self.maintenance.session_reset_after_ms,
        }
    }

    /// Throttle state seeded from config (used for a fresh snapshot).
    #[must_use]
    pub fn initial_throttle(&self) -> ThrottleState {
        ThrottleState {
            cooldown_ms: self.throttle.cooldown_ms,
            session_cap: self.throttle.session_cap,
            session_count: 0,
            last_shown_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn defaults_carry_documented_limits() {
        let config = HubConfig::default();
        assert_eq!(config.queue.critical_capacity, 5);
        assert_eq!(config.queue.normal_capacity, 15);
        assert_eq!(config.devices.registry_capacity, 10);
        assert_eq!(config.presence.think_threshold_ms, 60_000);
        assert_eq!(config.presence.away_threshold_ms, 300_000);
        assert_eq!(config.maintenance.interval_secs, 300);
        assert!(!config.storage.durable_writes);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = HubConfig::load_from_path(&dir.path().join("absent.toml")).expect("load");
        assert_eq!(config.server.port, 4090);
    }

    #[test]
    fn round_trip_preserves_overrides() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        let mut config = HubConfig::default();
        config.server.port = 9999;
        config.throttle.session_cap = 2;
        config.storage.durable_writes = true;
        config.save_to_path(&path).expect("save");

        let restored = HubConfig::load_from_path(&path).expect("load");
        assert_eq!(restored.server.port, 9999);
        assert_eq!(restored.throttle.session_cap, 2);
        assert!(restored.storage.durable_writes);
    }

    #[test]
    fn partial_file_fills_missing_sections_with_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 8080\n").expect("write");

        let config = HubConfig::load_from_path(&path).expect("load");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.queue.critical_capacity, 5);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server = \"not a table\"").expect("write");
        assert!(HubConfig::load_from_path(&path).is_err());
    }

    #[test]
    fn limits_reflect_config_overrides() {
        let mut config = HubConfig::default();
        config.queue.critical_capacity = 2;
        config.presence.think_threshold_ms = 1000;
        let limits = config.limits();
        assert_eq!(limits.critical_capacity, 2);
        assert_eq!(limits.think_threshold_ms, 1000);
    }
}
