//! HTTP and WebSocket transport.
//!
//! A thin layer over the coordinator: each request is parsed, validated,
//! translated into one [`CoordinatorHandle`] call, and its outcome
//! serialized back. No notification state lives here; the only state this
//! module owns is the live WebSocket connection registry used for pushes.

use crate::coordinator::CoordinatorHandle;
use crate::notify::{ActivityReport, NotificationEvent, now_epoch_millis};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Maximum length of a device identifier.
const MAX_DEVICE_ID_LEN: usize = 100;

// ---------------------------------------------------------------------------
// Wire protocol
// ---------------------------------------------------------------------------

/// Messages pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum WsOutbound {
    /// A freshly queued event.
    Notification { event: NotificationEvent },
    /// An event was dismissed somewhere; clients drop it from their UI.
    NotificationDismissed { event_id: String },
}

/// Messages accepted from WebSocket clients. Unknown kinds are ignored so
/// newer clients can talk to older hubs.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
enum WsInbound {
    DeviceHeartbeat {
        #[serde(default)]
        device_id: Option<String>,
        #[serde(default)]
        device_type: Option<String>,
        #[serde(default)]
        device_name: Option<String>,
        #[serde(default = "default_true")]
        has_activity: bool,
    },
    NotificationDismiss {
        event_id: String,
        #[serde(default)]
        dont_show_again: bool,
    },
}

/// Operations accepted on `POST /`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
enum HubRequest {
    AddEvent {
        event: NotificationEvent,
    },
    Dismiss {
        event_id: String,
        #[serde(default)]
        dont_show_again: bool,
    },
    DeviceActivity {
        device_id: String,
        #[serde(default)]
        device_type: Option<String>,
        #[serde(default)]
        device_name: Option<String>,
        #[serde(default = "default_true")]
        has_activity: bool,
    },
    FlushQueue {
        #[serde(default)]
        device_id: Option<String>,
    },
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Connection registry
// ---------------------------------------------------------------------------

struct ConnectionEntry {
    device_id: String,
    tx: mpsc::UnboundedSender<String>,
}

/// Live WebSocket connections, keyed by a per-socket id. A device may hold
/// several sockets at once; pushes go to all of them.
#[derive(Clone, Default)]
pub struct Connections {
    inner: Arc<Mutex<HashMap<Uuid, ConnectionEntry>>>,
}

impl Connections {
    /// Track a new socket.
    pub fn register(&self, conn_id: Uuid, device_id: String, tx: mpsc::UnboundedSender<String>) {
        let mut map = match self.inner.lock() {
            Ok(m) => m,
            Err(p) => p.into_inner(),
        };
        map.insert(conn_id, ConnectionEntry { device_id, tx });
    }

    /// Forget a socket.
    pub fn unregister(&self, conn_id: &Uuid) {
        let mut map = match self.inner.lock() {
            Ok(m) => m,
            Err(p) => p.into_inner(),
        };
        map.remove(conn_id);
    }

    /// Push to every connection. A dead socket's error is ignored here;
    /// its reader task notices the close and unregisters it.
    pub fn broadcast_all(&self, message: &WsOutbound) {
        let Ok(json) = serde_json::to_string(message) else {
            return;
        };
        let map = match self.inner.lock() {
            Ok(m) => m,
            Err(p) => p.into_inner(),
        };
        for entry in map.values() {
            let _ = entry.tx.send(json.clone());
        }
    }

    /// Push to every socket held by `device_id`.
    pub fn send_to_device(&self, device_id: &str, message: &WsOutbound) {
        let Ok(json) = serde_json::to_string(message) else {
            return;
        };
        let map = match self.inner.lock() {
            Ok(m) => m,
            Err(p) => p.into_inner(),
        };
        for entry in map.values() {
            if entry.device_id == device_id {
                let _ = entry.tx.send(json.clone());
            }
        }
    }

    /// Number of live sockets.
    #[must_use]
    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(m) => m.len(),
            Err(p) => p.into_inner().len(),
        }
    }

    /// Whether no sockets are connected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct GatewayState {
    coordinator: CoordinatorHandle,
    connections: Connections,
}

/// Build the hub router. The caller binds a listener and serves it.
pub fn router(coordinator: CoordinatorHandle, connections: Connections) -> Router {
    let state = GatewayState {
        coordinator,
        connections,
    };
    Router::new()
        .route("/health", get(health))
        .route("/state", get(full_state))
        .route("/queue", get(queue_state))
        .route("/devices", get(device_state))
        .route("/", post(hub_request))
        .route("/ws", get(ws_upgrade))
        .fallback(not_found)
        .with_state(state)
}

/// Device ids travel in URLs and dismissal keys; constrain them to a safe
/// token alphabet.
fn valid_device_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_DEVICE_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

fn validation_error(details: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "success": false,
            "error": "Validation error",
            "details": details,
        })),
    )
        .into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "success": false,
            "error": "Internal error",
        })),
    )
        .into_response()
}

/// Serialize an outcome and fold `"success": true` into it.
fn ok_with(outcome: impl Serialize) -> Response {
    match serde_json::to_value(outcome) {
        Ok(mut value) => {
            if let Some(map) = value.as_object_mut() {
                map.insert("success".to_owned(), serde_json::Value::Bool(true));
            }
            Json(value).into_response()
        }
        Err(e) => {
            tracing::error!("cannot serialize response: {e}");
            internal_error()
        }
    }
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "success": false,
            "error": "Not found",
        })),
    )
        .into_response()
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

async fn full_state(State(state): State<GatewayState>) -> Response {
    match state.coordinator.snapshot().await {
        Ok(snapshot) => Json(serde_json::json!({
            "success": true,
            "state": snapshot,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("snapshot failed: {e}");
            internal_error()
        }
    }
}

async fn queue_state(State(state): State<GatewayState>) -> Response {
    match state.coordinator.snapshot().await {
        Ok(snapshot) => Json(serde_json::json!({
            "success": true,
            "queue": snapshot.queue,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("snapshot failed: {e}");
            internal_error()
        }
    }
}

async fn device_state(State(state): State<GatewayState>) -> Response {
    match state.coordinator.snapshot().await {
        Ok(snapshot) => {
            let most_active = snapshot.devices.most_active().cloned();
            Json(serde_json::json!({
                "success": true,
                "devices": snapshot.devices,
                "mostActive": most_active,
            }))
            .into_response()
        }
        Err(e) => {
            tracing::error!("snapshot failed: {e}");
            internal_error()
        }
    }
}

async fn hub_request(State(state): State<GatewayState>, Json(body): Json<HubRequest>) -> Response {
    match body {
        HubRequest::AddEvent { event } => {
            if let Err(details) = event.validate() {
                return validation_error(&details);
            }
            match state.coordinator.add_event(event).await {
                Ok(outcome) => ok_with(outcome),
                Err(e) => {
                    tracing::error!("add_event failed: {e}");
                    internal_error()
                }
            }
        }
        HubRequest::Dismiss {
            event_id,
            dont_show_again,
        } => {
            if event_id.trim().is_empty() {
                return validation_error("eventId must not be empty");
            }
            match state.coordinator.dismiss(event_id, dont_show_again).await {
                Ok(outcome) => ok_with(outcome),
                Err(e) => {
                    tracing::error!("dismiss failed: {e}");
                    internal_error()
                }
            }
        }
        HubRequest::DeviceActivity {
            device_id,
            device_type,
            device_name,
            has_activity,
        } => {
            if !valid_device_id(&device_id) {
                return validation_error(
                    "deviceId must be 1-100 characters of [a-zA-Z0-9_-]",
                );
            }
            let report = ActivityReport {
                device_id,
                device_type,
                device_name,
                has_activity,
            };
            match state.coordinator.report_activity(report).await {
                Ok(outcome) => ok_with(outcome),
                Err(e) => {
                    tracing::error!("report_activity failed: {e}");
                    internal_error()
                }
            }
        }
        HubRequest::FlushQueue { device_id } => {
            if let Some(id) = device_id.as_deref()
                && !valid_device_id(id)
            {
                return validation_error(
                    "deviceId must be 1-100 characters of [a-zA-Z0-9_-]",
                );
            }
            match state.coordinator.flush_queue(device_id).await {
                Ok(outcome) => ok_with(outcome),
                Err(e) => {
                    tracing::error!("flush_queue failed: {e}");
                    internal_error()
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct WsQuery {
    #[serde(rename = "deviceId")]
    device_id: Option<String>,
}

async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    // An invalid or missing id never rejects the upgrade; the socket gets
    // a synthetic id so pushes and disconnect tracking still work.
    let device_id = match query.device_id {
        Some(id) if valid_device_id(&id) => id,
        _ => format!("device-{}", now_epoch_millis()),
    };
    ws.on_upgrade(move |socket| handle_socket(socket, device_id, state))
}

async fn handle_socket(socket: WebSocket, device_id: String, state: GatewayState) {
    let conn_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state
        .connections
        .register(conn_id, device_id.clone(), tx);
    tracing::debug!(device_id, %conn_id, "websocket connected");

    // Opening a socket is a positive liveness signal for the device.
    let connect_report = ActivityReport {
        device_id: device_id.clone(),
        device_type: None,
        device_name: None,
        has_activity: true,
    };
    if let Err(e) = state.coordinator.report_activity(connect_report).await {
        tracing::warn!("cannot register connecting device: {e}");
    }

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(json) => {
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_ws_message(&state, &device_id, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(device_id, "websocket read error: {e}");
                        break;
                    }
                    // Ping/pong frames are answered by axum.
                    _ => {}
                }
            }
        }
    }

    state.connections.unregister(&conn_id);
    tracing::debug!(device_id, %conn_id, "websocket closed");
    if let Err(e) = state.coordinator.device_disconnected(device_id).await {
        tracing::debug!("coordinator gone during disconnect: {e}");
    }
}

async fn handle_ws_message(state: &GatewayState, socket_device_id: &str, text: &str) {
    let message: WsInbound = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!("ignoring unparseable client message: {e}");
            return;
        }
    };

    match message {
        WsInbound::DeviceHeartbeat {
            device_id,
            device_type,
            device_name,
            has_activity,
        } => {
            let device_id = match device_id {
                Some(id) if valid_device_id(&id) => id,
                Some(_) => {
                    tracing::debug!("ignoring heartbeat with invalid device id");
                    return;
                }
                None => socket_device_id.to_owned(),
            };
            let report = ActivityReport {
                device_id,
                device_type,
                device_name,
                has_activity,
            };
            if let Err(e) = state.coordinator.report_activity(report).await {
                tracing::warn!("heartbeat dropped: {e}");
            }
        }
        WsInbound::NotificationDismiss {
            event_id,
            dont_show_again,
        } => {
            if let Err(e) = state.coordinator.dismiss(event_id, dont_show_again).await {
                tracing::warn!("dismiss dropped: {e}");
            }
        }
    }
}
