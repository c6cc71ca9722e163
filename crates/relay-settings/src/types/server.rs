//! Listener, session and fan-out settings.

use serde::{Deserialize, Serialize};

/// Default listen port when neither the file, `PORT` nor the CLI sets one.
pub const DEFAULT_PORT: u16 = 8080;

/// Server network and session settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Maximum concurrent WebSocket sessions (`0` = unlimited).
    pub max_connections: usize,
    /// Ping interval in seconds (`0` disables idle detection).
    pub heartbeat_interval_secs: u64,
    /// Close a session after this many seconds without any inbound frame.
    pub heartbeat_timeout_secs: u64,
    /// Largest accepted inbound message in bytes.
    pub max_message_size: usize,
    /// Frames queued per recipient before it counts as failed and is pruned.
    pub outbound_buffer: usize,
    /// Upper bound for a single socket write in milliseconds.
    pub send_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_connections: 0,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 1024 * 1024,
            outbound_buffer: 64,
            send_timeout_ms: 10_000,
        }
    }
}
