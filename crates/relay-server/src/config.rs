//! Server configuration.

use std::time::Duration;

use relay_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (`0` auto-assigns).
    pub port: u16,
    /// Maximum concurrent WebSocket connections (`0` = unlimited).
    pub max_connections: usize,
    /// Heartbeat interval in seconds (`0` disables).
    pub heartbeat_interval_secs: u64,
    /// Heartbeat timeout in seconds.
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-connection outbound queue capacity.
    pub outbound_buffer: usize,
    /// Socket write timeout in milliseconds.
    pub send_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(s: &ServerSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            max_connections: s.max_connections,
            heartbeat_interval_secs: s.heartbeat_interval_secs,
            heartbeat_timeout_secs: s.heartbeat_timeout_secs,
            max_message_size: s.max_message_size,
            outbound_buffer: s.outbound_buffer,
            send_timeout_ms: s.send_timeout_ms,
        }
    }
}

impl ServerConfig {
    /// `host:port` string passed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-session settings derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        let heartbeat = (self.heartbeat_interval_secs > 0).then(|| HeartbeatConfig {
            interval: Duration::from_secs(self.heartbeat_interval_secs),
            timeout: Duration::from_secs(self.heartbeat_timeout_secs),
        });
        SessionConfig {
            outbound_buffer: self.outbound_buffer.max(1),
            send_timeout: Duration::from_millis(self.send_timeout_ms.max(1)),
            heartbeat,
        }
    }
}

/// Idle detection timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Ping interval.
    pub interval: Duration,
    /// Silence tolerated before the session closes.
    pub timeout: Duration,
}

/// Settings one session runs with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Outbound queue capacity.
    pub outbound_buffer: usize,
    /// Upper bound for one socket write.
    pub send_timeout: Duration,
    /// Heartbeat timing, `None` when disabled.
    pub heartbeat: Option<HeartbeatConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        ServerConfig::default().session_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_settings_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.max_connections, 0);
        assert_eq!(cfg.max_message_size, 1024 * 1024);
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = ServerConfig {
            host: "127.0.0.1".into(),
            port: 9090,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "127.0.0.1:9090");
    }

    #[test]
    fn from_settings_copies_fields() {
        let settings = ServerSettings {
            port: 3000,
            outbound_buffer: 4,
            send_timeout_ms: 250,
            ..ServerSettings::default()
        };
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.outbound_buffer, 4);
        assert_eq!(cfg.send_timeout_ms, 250);
    }

    #[test]
    fn session_config_heartbeat_enabled() {
        let session = ServerConfig::default().session_config();
        assert_eq!(
            session.heartbeat,
            Some(HeartbeatConfig {
                interval: Duration::from_secs(30),
                timeout: Duration::from_secs(90),
            })
        );
        assert_eq!(session.outbound_buffer, 64);
        assert_eq!(session.send_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_interval_disables_heartbeat() {
        let cfg = ServerConfig {
            heartbeat_interval_secs: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.session_config().heartbeat, None);
    }

    #[test]
    fn zero_buffer_clamped() {
        let cfg = ServerConfig {
            outbound_buffer: 0,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.session_config().outbound_buffer, 1);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
