//! Hearth: notification and presence coordination for a personal hub.
//!
//! The hub accepts notification events from producers, classifies them
//! into bounded priority lanes, tracks which of the user's devices are
//! present and active, derives a single presence state, and delivers
//! events to devices over HTTP and WebSocket.
//!
//! # Architecture
//!
//! All notification state is owned by one coordinator actor:
//! - **notify**: pure state transforms (queue lanes, device registry,
//!   presence, throttle, delivery ledger)
//! - **coordinator**: the actor serializing every operation and driving
//!   persistence and live pushes
//! - **gateway**: axum HTTP + WebSocket transport
//! - **store**: JSON snapshot persistence

pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod store;

pub use config::HubConfig;
pub use coordinator::{CoordinatorHandle, spawn, spawn_maintenance};
pub use error::{HubError, Result};
pub use gateway::{Connections, router};
pub use notify::NotificationSystemState;
pub use store::StateStore;
