//! Coordinator actor.
//!
//! A single tokio task owns the live [`NotificationSystemState`] and
//! consumes commands from an mpsc channel. One command runs to completion
//! before the next starts, which gives the required serialization without
//! any locking of the state. The snapshot is loaded before the receive
//! loop begins, so requests arriving during a cold start queue on the
//! channel instead of racing a still-default state.

use crate::config::HubConfig;
use crate::gateway::{Connections, WsOutbound};
use crate::notify::{
    ActivityOutcome, ActivityReport, AddEventOutcome, DismissOutcome, EventLevel, FlushResult,
    HubLimits, NotificationEvent, NotificationSystemState, now_epoch_millis,
};
use crate::store::StateStore;
use crate::{HubError, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Command channel depth. Commands queue here while an operation (or the
/// initial load) is in flight.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// Operations the actor accepts.
pub enum HubCommand {
    AddEvent {
        event: NotificationEvent,
        reply: oneshot::Sender<AddEventOutcome>,
    },
    Dismiss {
        event_id: String,
        dont_show_again: bool,
        reply: oneshot::Sender<DismissOutcome>,
    },
    ReportActivity {
        report: ActivityReport,
        reply: oneshot::Sender<ActivityOutcome>,
    },
    FlushQueue {
        device_id: Option<String>,
        reply: oneshot::Sender<FlushResult>,
    },
    Snapshot {
        reply: oneshot::Sender<NotificationSystemState>,
    },
    /// A WebSocket for this device closed; flag it inactive.
    DeviceDisconnected { device_id: String },
    /// Periodic maintenance pass.
    MaintenanceTick,
    /// Persist and stop the actor.
    Shutdown { reply: oneshot::Sender<()> },
}

/// Cloneable handle used by the transport layer and tests.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl CoordinatorHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> HubCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| HubError::Coordinator("coordinator stopped".to_owned()))?;
        reply_rx
            .await
            .map_err(|_| HubError::Coordinator("coordinator dropped reply".to_owned()))
    }

    /// Queue (or reject) a notification event.
    pub async fn add_event(&self, event: NotificationEvent) -> Result<AddEventOutcome> {
        self.request(|reply| HubCommand::AddEvent { event, reply }).await
    }

    /// Dismiss an event by id.
    pub async fn dismiss(&self, event_id: String, dont_show_again: bool) -> Result<DismissOutcome> {
        self.request(|reply| HubCommand::Dismiss {
            event_id,
            dont_show_again,
            reply,
        })
        .await
    }

    /// Record a device activity report.
    pub async fn report_activity(&self, report: ActivityReport) -> Result<ActivityOutcome> {
        self.request(|reply| HubCommand::ReportActivity { report, reply })
            .await
    }

    /// Run the delivery protocol for `device_id`.
    pub async fn flush_queue(&self, device_id: Option<String>) -> Result<FlushResult> {
        self.request(|reply| HubCommand::FlushQueue { device_id, reply })
            .await
    }

    /// Full state snapshot (reads go through the same serialization point
    /// as writes).
    pub async fn snapshot(&self) -> Result<NotificationSystemState> {
        self.request(|reply| HubCommand::Snapshot { reply }).await
    }

    /// Flag a device's socket as closed.
    pub async fn device_disconnected(&self, device_id: String) -> Result<()> {
        self.tx
            .send(HubCommand::DeviceDisconnected { device_id })
            .await
            .map_err(|_| HubError::Coordinator("coordinator stopped".to_owned()))
    }

    /// Trigger one maintenance pass.
    pub async fn maintenance_tick(&self) -> Result<()> {
        self.tx
            .send(HubCommand::MaintenanceTick)
            .await
            .map_err(|_| HubError::Coordinator("coordinator stopped".to_owned()))
    }

    /// Persist and stop the actor.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| HubCommand::Shutdown { reply }).await
    }
}

struct Coordinator {
    state: NotificationSystemState,
    limits: HubLimits,
    store: StateStore,
    connections: Connections,
    durable_writes: bool,
}

/// Spawn the actor. Returns the command handle and the actor's join
/// handle.
pub fn spawn(
    config: &HubConfig,
    store: StateStore,
    connections: Connections,
) -> (CoordinatorHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let limits = config.limits();
    let throttle_policy = config.initial_throttle();
    let durable_writes = config.storage.durable_writes;

    let join = tokio::spawn(async move {
        let mut state = match store.load() {
            Ok(state) => state,
            Err(e) => {
                error!("cannot load notification state, starting empty: {e}");
                NotificationSystemState::default()
            }
        };
        // Policy parameters come from config; runtime counters come from
        // the snapshot.
        state.throttle.cooldown_ms = throttle_policy.cooldown_ms;
        state.throttle.session_cap = throttle_policy.session_cap;

        info!(
            queued = state.queue.len(),
            devices = state.devices.len(),
            "coordinator started"
        );

        let mut actor = Coordinator {
            state,
            limits,
            store,
            connections,
            durable_writes,
        };
        actor.run(rx).await;
    });

    (CoordinatorHandle { tx }, join)
}

/// Spawn the self-rescheduling maintenance loop. Stops when the actor
/// goes away.
pub fn spawn_maintenance(
    handle: CoordinatorHandle,
    interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        // The first tick fires immediately; skip it so maintenance runs
        // one full period after startup.
        interval.tick().await;
        loop {
            interval.tick().await;
            if handle.maintenance_tick().await.is_err() {
                debug!("coordinator stopped, ending maintenance loop");
                break;
            }
        }
    })
}

impl Coordinator {
    async fn run(&mut self, mut rx: mpsc::Receiver<HubCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                HubCommand::AddEvent { event, reply } => {
                    let now = now_epoch_millis();
                    let level = event.level;
                    let event_for_push = event.clone();
                    let outcome = self.state.add_event(event, &self.limits, now);
                    if outcome.queued {
                        self.persist().await;
                        if !outcome.delayed {
                            self.push_event(&event_for_push, level);
                        }
                    }
                    let _ = reply.send(outcome);
                }
                HubCommand::Dismiss {
                    event_id,
                    dont_show_again,
                    reply,
                } => {
                    let now = now_epoch_millis();
                    let outcome = self.state.dismiss(&event_id, dont_show_again, &self.limits, now);
                    self.persist().await;
                    let notice = WsOutbound::NotificationDismissed { event_id };
                    self.connections.broadcast_all(&notice);
                    let _ = reply.send(outcome);
                }
                HubCommand::ReportActivity { report, reply } => {
                    let now = now_epoch_millis();
                    let outcome = self.state.report_activity(report, &self.limits, now);
                    self.persist().await;
                    let _ = reply.send(outcome);
                }
                HubCommand::FlushQueue { device_id, reply } => {
                    let now = now_epoch_millis();
                    let outcome = self.state.flush(device_id.as_deref(), now);
                    self.persist().await;
                    let _ = reply.send(outcome);
                }
                HubCommand::Snapshot { reply } => {
                    let _ = reply.send(self.state.clone());
                }
                HubCommand::DeviceDisconnected { device_id } => {
                    let now = now_epoch_millis();
                    if self.state.device_disconnected(&device_id, &self.limits, now) {
                        debug!(device_id, "device socket closed, flagged inactive");
                        self.persist().await;
                    }
                }
                HubCommand::MaintenanceTick => {
                    let now = now_epoch_millis();
                    let report = self.state.run_maintenance(&self.limits, now);
                    if report.pruned_devices > 0 || report.throttle_reset {
                        debug!(
                            pruned = report.pruned_devices,
                            throttle_reset = report.throttle_reset,
                            "maintenance pass"
                        );
                    }
                    self.persist().await;
                }
                HubCommand::Shutdown { reply } => {
                    if let Err(e) = self.store.save(&self.state) {
                        error!("final state save failed: {e}");
                    }
                    info!("coordinator shut down");
                    let _ = reply.send(());
                    return;
                }
            }
        }
    }

    /// Live push for a freshly queued event. Critical and warning
    /// severities fan out to every connection; info and suggestion go to
    /// the most-active device only, mirroring the flush-time targeting
    /// rule.
    fn push_event(&self, event: &NotificationEvent, level: EventLevel) {
        let message = WsOutbound::Notification {
            event: event.clone(),
        };
        match level {
            EventLevel::Critical | EventLevel::Warning => {
                self.connections.broadcast_all(&message);
            }
            EventLevel::Info | EventLevel::Suggestion => {
                if let Some(target) = self.state.devices.most_active() {
                    self.connections.send_to_device(&target.device_id, &message);
                }
            }
        }
    }

    /// Write-through after a mutation. Fire-and-forget by default: the
    /// response is built from the in-memory state and the write races
    /// completion. A crash in that window loses the mutation on reload —
    /// accepted trade-off, switchable via `storage.durable_writes`.
    async fn persist(&self) {
        let store = self.store.clone();
        let snapshot = self.state.clone();
        if self.durable_writes {
            let result = tokio::task::spawn_blocking(move || store.save(&snapshot)).await;
            match result {
                Ok(Err(e)) => error!("cannot persist notification state: {e}"),
                Err(e) => error!("persist task failed: {e}"),
                Ok(Ok(())) => {}
            }
        } else {
            let _ = tokio::task::spawn_blocking(move || {
                if let Err(e) = store.save(&snapshot) {
                    warn!("cannot persist notification state: {e}");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::notify::PresenceState;
    use uuid::Uuid;

    fn test_config() -> HubConfig {
        let mut config = HubConfig::default();
        config.throttle.cooldown_ms = 0;
        config
    }

    fn event(id: &str, level: EventLevel) -> NotificationEvent {
        NotificationEvent {
            id: id.to_owned(),
            level,
            title: "t".to_owned(),
            message: "m".to_owned(),
            created_at: 0,
            source: Some("test".to_owned()),
            payload: None,
        }
    }

    fn activity(device_id: &str) -> ActivityReport {
        ActivityReport {
            device_id: device_id.to_owned(),
            device_type: None,
            device_name: None,
            has_activity: true,
        }
    }

    #[tokio::test]
    async fn add_event_and_snapshot_round_trip() {
        let (handle, _join) = spawn(&test_config(), StateStore::ephemeral(), Connections::default());

        let outcome = handle.add_event(event("e1", EventLevel::Warning)).await.unwrap();
        assert!(outcome.queued);
        assert_eq!(outcome.queue_size, 1);

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.queue.critical.len(), 1);
        assert_eq!(snapshot.queue.critical[0].id, "e1");
    }

    #[tokio::test]
    async fn commands_are_serialized_in_order() {
        let (handle, _join) = spawn(&test_config(), StateStore::ephemeral(), Connections::default());

        for i in 0..10 {
            handle
                .add_event(event(&format!("c{i}"), EventLevel::Critical))
                .await
                .unwrap();
        }

        let snapshot = handle.snapshot().await.unwrap();
        let ids: Vec<&str> = snapshot.queue.critical.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c5", "c6", "c7", "c8", "c9"]);
    }

    #[tokio::test]
    async fn critical_event_is_pushed_to_all_connections() {
        let connections = Connections::default();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        connections.register(Uuid::new_v4(), "A".to_owned(), tx_a);
        connections.register(Uuid::new_v4(), "B".to_owned(), tx_b);

        let (handle, _join) = spawn(&test_config(), StateStore::ephemeral(), connections);
        handle.add_event(event("e1", EventLevel::Critical)).await.unwrap();

        let payload = rx_a.recv().await.unwrap();
        assert!(payload.contains("\"type\":\"notification\""));
        assert!(payload.contains("\"id\":\"e1\""));
        assert!(rx_b.recv().await.is_some());
    }

    #[tokio::test]
    async fn info_event_is_pushed_only_to_most_active_device() {
        let connections = Connections::default();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        connections.register(Uuid::new_v4(), "A".to_owned(), tx_a);
        connections.register(Uuid::new_v4(), "B".to_owned(), tx_b);

        let (handle, _join) = spawn(&test_config(), StateStore::ephemeral(), connections);
        handle.report_activity(activity("B")).await.unwrap();
        handle.add_event(event("i1", EventLevel::Info)).await.unwrap();

        let payload = rx_b.recv().await.unwrap();
        assert!(payload.contains("\"id\":\"i1\""));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn delayed_suggestion_is_not_pushed() {
        let connections = Connections::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        connections.register(Uuid::new_v4(), "A".to_owned(), tx);

        let (handle, _join) = spawn(&test_config(), StateStore::ephemeral(), connections);
        handle.report_activity(activity("A")).await.unwrap();

        let outcome = handle
            .add_event(event("s1", EventLevel::Suggestion))
            .await
            .unwrap();
        assert!(outcome.queued);
        assert!(outcome.delayed);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dismiss_broadcasts_a_notice() {
        let connections = Connections::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        connections.register(Uuid::new_v4(), "A".to_owned(), tx);

        let (handle, _join) = spawn(&test_config(), StateStore::ephemeral(), connections);
        handle.add_event(event("e1", EventLevel::Critical)).await.unwrap();
        let _ = rx.recv().await; // the push itself

        let outcome = handle.dismiss("e1".to_owned(), false).await.unwrap();
        assert!(outcome.dismissed);
        let payload = rx.recv().await.unwrap();
        assert!(payload.contains("\"type\":\"notification-dismissed\""));
        assert!(payload.contains("\"eventId\":\"e1\""));
    }

    #[tokio::test]
    async fn state_survives_actor_restart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        let mut config = test_config();
        config.storage.durable_writes = true;

        let store = StateStore::new(Some(path.clone()));
        let (handle, join) = spawn(&config, store.clone(), Connections::default());
        handle.add_event(event("e1", EventLevel::Critical)).await.unwrap();
        handle.report_activity(activity("desk")).await.unwrap();
        handle.shutdown().await.unwrap();
        join.await.unwrap();

        let (handle, _join) = spawn(&config, store, Connections::default());
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.queue.critical.len(), 1);
        assert_eq!(snapshot.devices.len(), 1);
    }

    #[tokio::test]
    async fn throttle_policy_comes_from_config_counters_from_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        let mut config = test_config();
        config.storage.durable_writes = true;
        config.throttle.session_cap = 3;

        let store = StateStore::new(Some(path));
        let (handle, join) = spawn(&config, store.clone(), Connections::default());
        handle.add_event(event("s1", EventLevel::Suggestion)).await.unwrap();
        handle.shutdown().await.unwrap();
        join.await.unwrap();

        // Restart with a tighter cap; the consumed count persists.
        config.throttle.session_cap = 1;
        let (handle, _join) = spawn(&config, store, Connections::default());
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.throttle.session_cap, 1);
        assert_eq!(snapshot.throttle.session_count, 1);

        let outcome = handle
            .add_event(event("s2", EventLevel::Suggestion))
            .await
            .unwrap();
        assert!(!outcome.queued);
    }

    #[tokio::test]
    async fn device_disconnect_flags_inactive() {
        let (handle, _join) = spawn(&test_config(), StateStore::ephemeral(), Connections::default());
        handle.report_activity(activity("A")).await.unwrap();
        handle.device_disconnected("A".to_owned()).await.unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.devices.len(), 1);
        assert!(!snapshot.devices.all()[0].is_active);
    }

    #[tokio::test]
    async fn maintenance_tick_recomputes_presence() {
        let (handle, _join) = spawn(&test_config(), StateStore::ephemeral(), Connections::default());
        handle.report_activity(activity("A")).await.unwrap();
        handle.device_disconnected("A".to_owned()).await.unwrap();
        handle.maintenance_tick().await.unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert!(matches!(snapshot.presence, PresenceState::Away { .. }));
    }
}
