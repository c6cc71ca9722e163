//! Connection registry and exclude-sender fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use super::frame::Frame;
use crate::metrics::{
    RELAY_DELIVERIES_TOTAL, RELAY_MESSAGES_TOTAL, RELAY_PRUNED_TOTAL, WS_CONNECTIONS_ACTIVE,
};

/// Result of one broadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Recipients the frame was queued to.
    pub delivered: usize,
    /// Recipients whose send failed; they were closed and removed.
    pub pruned: Vec<String>,
}

/// The set of connections eligible to receive broadcasts.
///
/// One lock covers membership changes and the whole fan-out of a broadcast,
/// so membership is stable while a frame is delivered. Nothing awaits while
/// the lock is held: sends only enqueue onto each recipient's bounded queue.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. Returns `false` if its id is already present.
    pub fn register(&self, connection: Arc<ClientConnection>) -> bool {
        let mut conns = self.connections.lock();
        if conns.contains_key(&connection.id) {
            return false;
        }
        let _ = conns.insert(connection.id.clone(), connection);
        gauge!(WS_CONNECTIONS_ACTIVE).set(conns.len() as f64);
        true
    }

    /// Remove a connection by id. Returns `false` if it was not present.
    pub fn unregister(&self, connection_id: &str) -> bool {
        let mut conns = self.connections.lock();
        let removed = conns.remove(connection_id).is_some();
        if removed {
            gauge!(WS_CONNECTIONS_ACTIVE).set(conns.len() as f64);
        }
        removed
    }

    /// Remove `connection` only if it is the handle registered under its id.
    fn unregister_exact(&self, connection: &Arc<ClientConnection>) -> bool {
        let mut conns = self.connections.lock();
        let matches = conns
            .get(&connection.id)
            .is_some_and(|current| Arc::ptr_eq(current, connection));
        if matches {
            let _ = conns.remove(&connection.id);
            gauge!(WS_CONNECTIONS_ACTIVE).set(conns.len() as f64);
        }
        matches
    }

    /// Register `connection` and return a guard that releases it on drop.
    pub fn enroll(self: &Arc<Self>, connection: Arc<ClientConnection>) -> Registration {
        if !self.register(Arc::clone(&connection)) {
            warn!(conn_id = %connection.id, "connection id already registered");
        }
        Registration {
            registry: Arc::clone(self),
            connection,
            released: false,
        }
    }

    /// Queue `frame` to every registered connection except `sender_id`.
    ///
    /// A recipient whose send fails is closed and removed in the same pass;
    /// the rest of the fan-out continues. Sends are never retried.
    pub fn broadcast(&self, sender_id: &str, frame: &Frame) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        let mut conns = self.connections.lock();
        conns.retain(|id, conn| {
            if id == sender_id {
                return true;
            }
            match conn.send(frame.clone()) {
                Ok(()) => {
                    outcome.delivered += 1;
                    true
                }
                Err(e) => {
                    warn!(conn_id = %id, sender = sender_id, error = %e, "dropping unreachable client");
                    conn.close();
                    outcome.pruned.push(id.clone());
                    false
                }
            }
        });
        if !outcome.pruned.is_empty() {
            gauge!(WS_CONNECTIONS_ACTIVE).set(conns.len() as f64);
        }
        drop(conns);

        counter!(RELAY_MESSAGES_TOTAL, "kind" => frame.kind().to_string()).increment(1);
        counter!(RELAY_DELIVERIES_TOTAL).increment(outcome.delivered as u64);
        counter!(RELAY_PRUNED_TOTAL).increment(outcome.pruned.len() as u64);
        debug!(
            sender = sender_id,
            kind = %frame.kind(),
            bytes = frame.len(),
            recipients = outcome.delivered,
            pruned = outcome.pruned.len(),
            "broadcast frame"
        );
        outcome
    }

    /// Look up a registered connection.
    pub fn get(&self, connection_id: &str) -> Option<Arc<ClientConnection>> {
        self.connections.lock().get(connection_id).cloned()
    }

    /// Whether a connection id is registered.
    pub fn contains(&self, connection_id: &str) -> bool {
        self.connections.lock().contains_key(connection_id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Ids of all registered connections.
    pub fn connection_ids(&self) -> Vec<String> {
        self.connections.lock().keys().cloned().collect()
    }
}

/// Membership of one connection, released exactly once.
///
/// Releasing closes the handle and then unregisters it. Dropping the guard
/// releases it, so every exit path of a session (including a panic or the
/// task being cancelled) leaves the registry consistent.
#[derive(Debug)]
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    connection: Arc<ClientConnection>,
    released: bool,
}

impl Registration {
    /// The registered handle.
    pub fn connection(&self) -> &Arc<ClientConnection> {
        &self.connection
    }

    /// Close the handle and unregister it. Returns `false` if already released.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.connection.close();
        let _ = self.registry.unregister_exact(&self.connection);
        true
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
