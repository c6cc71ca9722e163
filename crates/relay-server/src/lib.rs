//! # relay-server
//!
//! Axum HTTP + `WebSocket` relay: every frame a client sends is forwarded,
//! kind and payload unchanged, to every other connected client.
//!
//! - `WebSocket` gateway: connection registry, per-client session, heartbeat
//! - Exclude-sender fan-out; a recipient whose send fails is closed and pruned
//! - HTTP endpoints: banner, health check, Prometheus metrics, CORS
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::{HeartbeatConfig, ServerConfig, SessionConfig};
pub use errors::ServerError;
pub use server::RelayServer;
