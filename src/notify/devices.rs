//! Device liveness registry.
//!
//! Tracks at most [`super::DEVICE_REGISTRY_CAPACITY`] client devices by id.
//! The registry distinguishes the per-device liveness flag (`is_active`)
//! from the derived user presence state — a device can be inactive while
//! the user is still `active` on another device.

use serde::{Deserialize, Serialize};

/// Liveness record for one client device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePresence {
    /// Unique device identifier (connection-supplied).
    pub device_id: String,
    /// Last time this device reported activity, epoch milliseconds.
    pub last_activity_at: i64,
    /// Whether the device currently reports as live.
    pub is_active: bool,
    /// Device class (e.g. `desktop`, `mobile`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    /// Human-readable device name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

/// An inbound activity report for a device.
#[derive(Debug, Clone)]
pub struct ActivityReport {
    pub device_id: String,
    pub device_type: Option<String>,
    pub device_name: Option<String>,
    /// Positive liveness signal. When false the previous activity
    /// timestamp is retained and only the liveness flag drops.
    pub has_activity: bool,
}

/// Bounded, insertion-ordered set of device records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceRegistry {
    devices: Vec<DevicePresence>,
}

impl DeviceRegistry {
    /// Apply an activity report.
    ///
    /// Existing ids are replaced in place (position preserved). New ids
    /// append; at capacity the first inactive entry is evicted, or the
    /// oldest entry when every device is active. Returns a clone of the
    /// updated record.
    pub fn upsert(&mut self, report: ActivityReport, capacity: usize, now: i64) -> DevicePresence {
        if let Some(existing) = self
            .devices
            .iter_mut()
            .find(|d| d.device_id == report.device_id)
        {
            if report.has_activity {
                existing.last_activity_at = now;
            }
            existing.is_active = report.has_activity;
            if report.device_type.is_some() {
                existing.device_type = report.device_type;
            }
            if report.device_name.is_some() {
                existing.device_name = report.device_name;
            }
            return existing.clone();
        }

        if self.devices.len() >= capacity.max(1) {
            if let Some(idle) = self.devices.iter().position(|d| !d.is_active) {
                self.devices.remove(idle);
            } else {
                self.devices.remove(0);
            }
        }

        let record = DevicePresence {
            device_id: report.device_id,
            // A brand-new device gets a timestamp either way so eviction
            // ordering stays well-defined.
            last_activity_at: now,
            is_active: report.has_activity,
            device_type: report.device_type,
            device_name: report.device_name,
        };
        self.devices.push(record.clone());
        record
    }

    /// The active device with the most recent activity timestamp.
    ///
    /// Ties resolve to the later entry in iteration order (last writer
    /// wins). `None` when no device is active.
    #[must_use]
    pub fn most_active(&self) -> Option<&DevicePresence> {
        let mut best: Option<&DevicePresence> = None;
        for device in self.devices.iter().filter(|d| d.is_active) {
            match best {
                Some(current) if device.last_activity_at < current.last_activity_at => {}
                _ => best = Some(device),
            }
        }
        best
    }

    /// Flag a device inactive without removing its record. Returns `true`
    /// when the device exists.
    pub fn mark_inactive(&mut self, device_id: &str) -> bool {
        if let Some(device) = self.devices.iter_mut().find(|d| d.device_id == device_id) {
            device.is_active = false;
            return true;
        }
        false
    }

    /// Drop devices that are both inactive and idle longer than
    /// `max_idle_ms`. Returns the number of pruned records.
    pub fn prune(&mut self, now: i64, max_idle_ms: i64) -> usize {
        let before = self.devices.len();
        self.devices
            .retain(|d| d.is_active || now - d.last_activity_at <= max_idle_ms);
        before - self.devices.len()
    }

    /// Device ids that are currently active, in registry order.
    #[must_use]
    pub fn active_ids(&self) -> Vec<String> {
        self.devices
            .iter()
            .filter(|d| d.is_active)
            .map(|d| d.device_id.clone())
            .collect()
    }

    /// All device records in registry order.
    #[must_use]
    pub fn all(&self) -> &[DevicePresence] {
        &self.devices
    }

    /// Number of registered devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::notify::DEVICE_REGISTRY_CAPACITY;

    fn report(id: &str, has_activity: bool) -> ActivityReport {
        ActivityReport {
            device_id: id.to_owned(),
            device_type: None,
            device_name: None,
            has_activity,
        }
    }

    fn upsert(registry: &mut DeviceRegistry, id: &str, has_activity: bool, now: i64) {
        registry.upsert(report(id, has_activity), DEVICE_REGISTRY_CAPACITY, now);
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut registry = DeviceRegistry::default();
        upsert(&mut registry, "a", true, 1);
        upsert(&mut registry, "b", true, 2);
        upsert(&mut registry, "a", true, 3);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.all()[0].device_id, "a");
        assert_eq!(registry.all()[0].last_activity_at, 3);
    }

    #[test]
    fn inactive_report_keeps_previous_timestamp() {
        let mut registry = DeviceRegistry::default();
        upsert(&mut registry, "a", true, 10);
        upsert(&mut registry, "a", false, 99);

        let device = &registry.all()[0];
        assert!(!device.is_active);
        assert_eq!(device.last_activity_at, 10);
    }

    #[test]
    fn eviction_prefers_inactive_devices() {
        let mut registry = DeviceRegistry::default();
        for i in 0..DEVICE_REGISTRY_CAPACITY {
            upsert(&mut registry, &format!("d{i}"), true, i as i64);
        }
        upsert(&mut registry, "d3", false, 100);

        upsert(&mut registry, "new", true, 200);
        assert_eq!(registry.len(), DEVICE_REGISTRY_CAPACITY);
        assert!(!registry.all().iter().any(|d| d.device_id == "d3"));
        assert!(registry.all().iter().any(|d| d.device_id == "new"));
        assert_eq!(registry.all().last().unwrap().device_id, "new");
    }

    #[test]
    fn eviction_falls_back_to_oldest_when_all_active() {
        let mut registry = DeviceRegistry::default();
        for i in 0..DEVICE_REGISTRY_CAPACITY {
            upsert(&mut registry, &format!("d{i}"), true, i as i64);
        }

        upsert(&mut registry, "new", true, 200);
        assert_eq!(registry.len(), DEVICE_REGISTRY_CAPACITY);
        assert!(!registry.all().iter().any(|d| d.device_id == "d0"));
    }

    #[test]
    fn most_active_ignores_inactive_devices() {
        let mut registry = DeviceRegistry::default();
        upsert(&mut registry, "a", true, 10);
        upsert(&mut registry, "b", true, 20);
        upsert(&mut registry, "b", false, 30);

        assert_eq!(registry.most_active().unwrap().device_id, "a");
    }

    #[test]
    fn most_active_tie_breaks_to_later_entry() {
        let mut registry = DeviceRegistry::default();
        upsert(&mut registry, "a", true, 10);
        upsert(&mut registry, "b", true, 10);

        assert_eq!(registry.most_active().unwrap().device_id, "b");
    }

    #[test]
    fn most_active_is_none_with_no_active_devices() {
        let mut registry = DeviceRegistry::default();
        upsert(&mut registry, "a", false, 10);
        assert!(registry.most_active().is_none());
    }

    #[test]
    fn prune_removes_only_stale_inactive_devices() {
        let mut registry = DeviceRegistry::default();
        upsert(&mut registry, "stale", true, 0);
        upsert(&mut registry, "fresh", true, 0);
        upsert(&mut registry, "live", true, 1_000_000);
        registry.mark_inactive("stale");
        registry.mark_inactive("fresh");
        // "fresh" went inactive recently enough to survive.
        registry
            .all()
            .iter()
            .for_each(|d| assert!(d.device_id != "stale" || !d.is_active));

        let pruned = registry.prune(1_000_000, 600_000);
        // Both inactive devices are past the idle window here.
        assert_eq!(pruned, 2);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.all()[0].device_id, "live");
    }

    #[test]
    fn mark_inactive_retains_record() {
        let mut registry = DeviceRegistry::default();
        upsert(&mut registry, "a", true, 1);
        assert!(registry.mark_inactive("a"));
        assert!(!registry.mark_inactive("ghost"));
        assert_eq!(registry.len(), 1);
        assert!(!registry.all()[0].is_active);
    }

    #[test]
    fn new_device_without_activity_still_gets_timestamp() {
        let mut registry = DeviceRegistry::default();
        upsert(&mut registry, "a", false, 42);
        assert_eq!(registry.all()[0].last_activity_at, 42);
        assert!(!registry.all()[0].is_active);
    }
}
