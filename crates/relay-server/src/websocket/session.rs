//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, close_code};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::{ClientConnection, Outbound};
use super::frame::Frame;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use super::registry::{ConnectionRegistry, Registration};
use crate::config::SessionConfig;
use crate::metrics::{WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame.
    PeerClosed,
    /// The inbound stream ended without a close frame.
    StreamEnded,
    /// Reading from the socket failed.
    ReadError,
    /// Writing to the socket failed.
    WriteError,
    /// A socket write did not finish within the send timeout.
    WriteTimeout,
    /// The registry closed the handle after a failed broadcast send.
    Pruned,
    /// No inbound activity within the heartbeat timeout.
    HeartbeatTimeout,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Short label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PeerClosed => "peer_closed",
            Self::StreamEnded => "stream_ended",
            Self::ReadError => "read_error",
            Self::WriteError => "write_error",
            Self::WriteTimeout => "write_timeout",
            Self::Pruned => "pruned",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Shutdown => "shutdown",
        }
    }

    /// Close frame sent to the client for server-initiated closes.
    pub fn close_frame(self) -> Option<CloseFrame> {
        let (code, reason) = match self {
            Self::Shutdown => (close_code::AWAY, "server shutting down"),
            Self::HeartbeatTimeout => (close_code::AWAY, "idle timeout"),
            Self::Pruned => (close_code::POLICY, "unable to deliver"),
            _ => return None,
        };
        Some(CloseFrame {
            code,
            reason: reason.into(),
        })
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run a relay session for an upgraded socket.
///
/// 1. Enrolls a fresh connection handle in `registry`
/// 2. Broadcasts every inbound text or binary frame to all other connections
/// 3. Writes frames queued by other sessions' broadcasts to the socket
/// 4. Pings the client and closes it when silent (if a heartbeat is configured)
/// 5. On any exit: releases the registration, then closes the socket
///
/// Returns why the session ended.
pub async fn run_session<S>(
    socket: S,
    registry: Arc<ConnectionRegistry>,
    config: SessionConfig,
    shutdown: CancellationToken,
) -> CloseReason
where
    S: Stream<Item = Result<Message, axum::Error>> + Sink<Message, Error = axum::Error> + Unpin,
{
    let (tx, rx) = mpsc::channel(config.outbound_buffer);
    let connection = Arc::new(ClientConnection::with_generated_id(tx));
    let registration = registry.enroll(connection);
    drive(socket, registration, rx, &registry, config, shutdown).await
}

#[instrument(skip_all, fields(conn_id = %registration.connection().id))]
async fn drive<S>(
    mut socket: S,
    mut registration: Registration,
    mut outbound: mpsc::Receiver<Outbound>,
    registry: &ConnectionRegistry,
    config: SessionConfig,
    shutdown: CancellationToken,
) -> CloseReason
where
    S: Stream<Item = Result<Message, axum::Error>> + Sink<Message, Error = axum::Error> + Unpin,
{
    let conn = Arc::clone(registration.connection());
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!(connections = registry.len(), "client connected");

    let heartbeat = async {
        match config.heartbeat {
            Some(hb) => run_heartbeat(Arc::clone(&conn), hb.interval, hb.timeout, shutdown.clone()).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(heartbeat);

    let reason = loop {
        tokio::select! {
            () = shutdown.cancelled() => break CloseReason::Shutdown,
            () = conn.closed() => break CloseReason::Pruned,
            result = &mut heartbeat => {
                break match result {
                    HeartbeatResult::TimedOut => {
                        warn!(silent_for = ?conn.last_seen_elapsed(), "client unresponsive, disconnecting");
                        CloseReason::HeartbeatTimeout
                    }
                    HeartbeatResult::Cancelled => CloseReason::Shutdown,
                };
            }
            item = outbound.recv() => {
                let Some(item) = item else { break CloseReason::Pruned };
                let message = match item {
                    Outbound::Frame(frame) => frame.into_message(),
                    Outbound::Ping => Message::Ping(Bytes::new()),
                };
                match timeout(config.send_timeout, socket.send(message)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(error = %e, "write failed");
                        break CloseReason::WriteError;
                    }
                    Err(_) => {
                        warn!(timeout = ?config.send_timeout, "write timed out");
                        break CloseReason::WriteTimeout;
                    }
                }
            }
            inbound = socket.next() => match inbound {
                Some(Ok(message)) => match Frame::from_message(message) {
                    Ok(frame) => {
                        conn.mark_alive();
                        let _ = registry.broadcast(&conn.id, &frame);
                    }
                    Err(Message::Close(frame)) => {
                        debug!(?frame, "client sent close frame");
                        break CloseReason::PeerClosed;
                    }
                    Err(_) => conn.mark_alive(),
                },
                Some(Err(e)) => {
                    debug!(error = %e, "read failed");
                    break CloseReason::ReadError;
                }
                None => break CloseReason::StreamEnded,
            },
        }
    };

    let _ = registration.release();
    if reason != CloseReason::WriteTimeout {
        close_socket(&mut socket, reason, config.send_timeout).await;
    }

    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    info!(
        %reason,
        duration_secs = conn.age().as_secs_f64(),
        frames_queued = conn.frames_queued(),
        "client disconnected"
    );
    reason
}

/// Best-effort close: a close frame for server-initiated reasons, then flush.
async fn close_socket<S>(socket: &mut S, reason: CloseReason, limit: Duration)
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let goodbye = async {
        if let Some(frame) = reason.close_frame() {
            socket.send(Message::Close(Some(frame))).await?;
        }
        socket.close().await
    };
    match timeout(limit, goodbye).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "socket close failed"),
        Err(_) => debug!("socket close timed out"),
    }
}
