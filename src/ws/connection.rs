//! Connection registry: player id -> outbound transport handle

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::game::state::PlayerId;

use super::protocol::ServerMsg;

/// Why a frame could not be queued
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("connection outbound queue is full")]
    Stalled,

    #[error("connection is closed")]
    Closed,

    #[error("message could not be encoded")]
    Encode,
}

/// Outbound half of one client socket.
///
/// The socket sink is owned by a single writer task draining this queue, so
/// frames for one connection are written strictly one at a time. Queueing
/// never blocks: a full queue counts as a failed send.
///
/// Closing is signalled beside the queue rather than through it, so a
/// connection can be torn down even while its queue is full.
#[derive(Debug)]
pub struct Connection {
    id: Uuid,
    tx: mpsc::Sender<Arc<str>>,
    close_tx: watch::Sender<Option<String>>,
}

impl Connection {
    /// Create a connection and the receiver its writer task drains
    pub fn new(buffer: usize) -> (Arc<Self>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (close_tx, _) = watch::channel(None);
        let conn = Arc::new(Self {
            id: Uuid::new_v4(),
            tx,
            close_tx,
        });
        (conn, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue serialized JSON. Fails once the connection has been closed.
    pub fn send(&self, payload: Arc<str>) -> Result<(), SendError> {
        if self.close_requested() {
            return Err(SendError::Closed);
        }
        self.tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Stalled,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Serialize and queue a single message
    pub fn send_msg(&self, msg: &ServerMsg) -> Result<(), SendError> {
        let json = serde_json::to_string(msg).map_err(|_| SendError::Encode)?;
        self.send(Arc::from(json))
    }

    /// Ask the session owning this socket to close it. The first reason wins.
    pub fn close(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let first = self.close_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason.clone());
            true
        });
        if first {
            debug!(connection_id = %self.id, reason = %reason, "Connection close requested");
        }
    }

    fn close_requested(&self) -> bool {
        self.close_tx.borrow().is_some()
    }

    /// Reason passed to [`Connection::close`], if it has been called
    pub fn close_reason(&self) -> Option<String> {
        self.close_tx.borrow().clone()
    }

    /// Resolves with the close reason once [`Connection::close`] is called
    pub async fn closed(&self) -> String {
        let mut close_rx = self.close_tx.subscribe();
        let reason = close_rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|reason| reason.clone());
        match reason {
            Some(reason) => reason,
            // Unreachable while `self` holds the sender
            None => std::future::pending().await,
        }
    }

    /// True once closing was requested or the writer has gone away
    pub fn is_closed(&self) -> bool {
        self.close_requested() || self.tx.is_closed()
    }
}

/// Registry of live connections keyed by player identity.
///
/// Membership changes are serialized per shard by the map; sends never take
/// the registry lock.
pub struct ConnectionRegistry {
    connections: DashMap<PlayerId, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register `conn` for `player_id`, replacing any earlier registration
    pub fn register(&self, player_id: PlayerId, conn: Arc<Connection>) -> Option<Arc<Connection>> {
        self.connections.insert(player_id, conn)
    }

    /// Remove `player_id` only if it is still bound to `conn`
    pub fn unregister_if(&self, player_id: &PlayerId, conn: &Connection) -> Option<Arc<Connection>> {
        self.connections
            .remove_if(player_id, |_, current| current.id() == conn.id())
            .map(|(_, c)| c)
    }

    pub fn get(&self, player_id: &PlayerId) -> Option<Arc<Connection>> {
        self.connections.get(player_id).map(|c| c.value().clone())
    }

    /// Copy of every registration, taken so no shard lock is held while sending
    pub fn all(&self) -> Vec<(PlayerId, Arc<Connection>)> {
        self.connections
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
