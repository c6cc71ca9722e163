//! Connection handle shared between a session and the registry.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use super::frame::Frame;

/// Item queued for a session's write side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outbound {
    /// A relayed data frame.
    Frame(Frame),
    /// A heartbeat ping.
    Ping,
}

/// Why a frame could not be handed to a connection.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The connection was closed or its session has ended.
    #[error("connection closed")]
    Closed,
    /// The connection's outbound queue is full.
    #[error("outbound queue full")]
    Full,
}

/// Handle to one connected client.
///
/// The owning session holds the socket and drains the outbound queue; the
/// registry holds this handle only to enqueue broadcasts and to close it.
#[derive(Debug)]
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    tx: mpsc::Sender<Outbound>,
    closed: CancellationToken,
    connected_at: Instant,
    is_alive: AtomicBool,
    last_seen: Mutex<Instant>,
    frames_queued: AtomicU64,
}

impl ClientConnection {
    /// Create a handle around the sending half of a session's outbound queue.
    pub fn new(id: String, tx: mpsc::Sender<Outbound>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            closed: CancellationToken::new(),
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_seen: Mutex::new(now),
            frames_queued: AtomicU64::new(0),
        }
    }

    /// Create a handle with a fresh UUID v7 id.
    pub fn with_generated_id(tx: mpsc::Sender<Outbound>) -> Self {
        Self::new(uuid::Uuid::now_v7().to_string(), tx)
    }

    /// Queue a frame for delivery. Never blocks.
    pub fn send(&self, frame: Frame) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        match self.tx.try_send(Outbound::Frame(frame)) {
            Ok(()) => {
                let _ = self.frames_queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(SendError::Full),
            Err(TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    /// Queue a heartbeat ping. Returns `false` if the queue is full or closed.
    pub fn request_ping(&self) -> bool {
        !self.is_closed() && self.tx.try_send(Outbound::Ping).is_ok()
    }

    /// Signal the owning session to tear down. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Record inbound activity.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_seen.lock() = Instant::now();
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if there was inbound activity since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the last inbound activity (or connection establishment).
    pub fn last_seen_elapsed(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Frames successfully queued to this connection.
    pub fn frames_queued(&self) -> u64 {
        self.frames_queued.load(Ordering::Relaxed)
    }

    /// Time since the handle was created.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
