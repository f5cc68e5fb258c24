//! Live connections and the users behind them

use std::sync::atomic::{AtomicU64, Ordering};

use arena_protocol::{ConnectionId, ServerEvent, UserId};
use dashmap::DashMap;
use tokio::sync::mpsc;

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Outbound side of one identified connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub username: String,
    tx: EventSender,
}

impl ConnectionHandle {
    /// Queue an event for the socket writer. Fails once the writer is gone.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

#[derive(Debug)]
pub struct ConnectionDirectory {
    connections: DashMap<ConnectionId, ConnectionHandle>,
    users: DashMap<UserId, ConnectionId>,
    next_id: AtomicU64,
}

impl Default for ConnectionDirectory {
    fn default() -> Self {
        Self {
            connections: DashMap::new(),
            users: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl ConnectionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. A user connecting again becomes reachable
    /// through the new connection only.
    pub fn register(&self, user_id: UserId, username: String, tx: EventSender) -> ConnectionHandle {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = ConnectionHandle {
            id,
            user_id,
            username,
            tx,
        };

        self.connections.insert(id, handle.clone());
        self.users.insert(user_id, id);
        handle
    }

    /// Drop a connection. The user mapping is only cleared if it still
    /// points at this connection.
    pub fn remove(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        let (_, handle) = self.connections.remove(&id)?;
        self.users.remove_if(&handle.user_id, |_, current| *current == id);
        Some(handle)
    }

    pub fn get(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }

    pub fn is_live(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// The user's current connection
    pub fn connection_of(&self, user_id: UserId) -> Option<ConnectionId> {
        self.users.get(&user_id).map(|entry| *entry.value())
    }

    /// Deliver one event. Returns false if the connection is unknown or closed.
    pub fn notify(&self, id: ConnectionId, event: ServerEvent) -> bool {
        let Some(handle) = self.get(id) else {
            tracing::debug!(connection = %id, event = event.name(), "Dropping event for closed connection");
            return false;
        };

        if !handle.send(event) {
            tracing::debug!(connection = %id, "Connection writer is gone");
            return false;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
