//! Lobby store and room lifecycle: create, join, leave, reap

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::auth::{CredentialService, SessionClaims};
use crate::ws::connection::{Connection, ConnectionRegistry};
use crate::ws::protocol::{RoomSnapshot, ServerMsg};

use super::snapshot::SnapshotBuilder;
use super::state::{GameState, Player, PlayerId, RoomId};
use super::GameError;

/// Every room in the process behind one lock.
///
/// Joins, action handlers, ticks and the reaper all take the write half for
/// the length of their transaction, so none of them ever observes another's
/// partial update.
pub struct LobbyStore {
    rooms: RwLock<HashMap<RoomId, GameState>>,
}

impl LobbyStore {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, HashMap<RoomId, GameState>> {
        self.rooms.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, HashMap<RoomId, GameState>> {
        self.rooms.write()
    }

    pub fn room_count(&self) -> usize {
        self.read().len()
    }

    pub fn player_count(&self) -> usize {
        self.read().values().map(|room| room.players.len()).sum()
    }

    pub fn snapshot(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        self.read().get(room_id).map(SnapshotBuilder::build)
    }
}

impl Default for LobbyStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a successful join
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub player_id: PlayerId,
    pub room_id: RoomId,
    pub token: String,
    /// Room state including the new player, taken under the join's own lock
    pub snapshot: RoomSnapshot,
}

/// Creates rooms, admits and removes players, reaps idle rooms
pub struct LobbyManager {
    store: Arc<LobbyStore>,
    credentials: Arc<dyn CredentialService>,
    connections: Arc<ConnectionRegistry>,
    idle_timeout: Duration,
}

impl LobbyManager {
    pub fn new(
        store: Arc<LobbyStore>,
        credentials: Arc<dyn CredentialService>,
        connections: Arc<ConnectionRegistry>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            credentials,
            connections,
            idle_timeout,
        }
    }

    pub fn store(&self) -> &Arc<LobbyStore> {
        &self.store
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Create an empty room and return its id
    pub fn create_room(&self) -> RoomId {
        let room = GameState::new(Instant::now());
        let room_id = room.id;
        self.store.write().insert(room_id, room);

        info!(room_id = %room_id, "Room created");
        room_id
    }

    /// Admit a new player into an existing room.
    ///
    /// The player is appended, `game_enter` is queued on `conn` and `conn` is
    /// registered under the new player id, all before the lock is released.
    /// No `game_update` for the room can therefore reach `conn` ahead of its
    /// `game_enter`. If `game_enter` cannot be queued the join is undone.
    pub fn join_room(
        &self,
        room_id: &str,
        display_name: &str,
        conn: Arc<Connection>,
    ) -> Result<JoinOutcome, GameError> {
        let room_id = room_id.trim();
        let display_name = display_name.trim();
        if room_id.is_empty() {
            return Err(GameError::InvalidInput("roomId is empty".to_string()));
        }
        if display_name.is_empty() {
            return Err(GameError::InvalidInput("displayName is empty".to_string()));
        }
        let room_id: RoomId = room_id.parse().map_err(|_| GameError::RoomNotFound)?;

        let player = Player::new(display_name.to_string());
        let player_id = player.id;
        let token = self
            .credentials
            .issue(player_id, room_id, display_name)
            .map_err(|e| GameError::Internal(e.to_string()))?;

        let mut rooms = self.store.write();
        let room = rooms.get_mut(&room_id).ok_or(GameError::RoomNotFound)?;

        room.players.push(player);
        let snapshot = SnapshotBuilder::build(room);
        let enter = ServerMsg::GameEnter {
            token: token.clone(),
            snapshot: snapshot.clone(),
        };

        // A client that cannot receive its credential gets no seat
        if let Err(e) = conn.send_msg(&enter) {
            room.players.pop();
            warn!(
                room_id = %room_id,
                player_id = %player_id,
                error = %e,
                "Join rolled back, game_enter could not be queued"
            );
            return Err(GameError::Internal(format!("connection unavailable: {e}")));
        }

        room.touch(Instant::now());
        self.connections.register(player_id, conn);
        drop(rooms);

        info!(
            room_id = %room_id,
            player_id = %player_id,
            display_name = %display_name,
            player_count = snapshot.players.len(),
            "Player joined room"
        );

        Ok(JoinOutcome {
            player_id,
            room_id,
            token,
            snapshot,
        })
    }

    /// Remove a player from its room. Returns false if either is already gone.
    pub fn leave_room(&self, room_id: &RoomId, player_id: &PlayerId) -> bool {
        let mut rooms = self.store.write();
        let Some(room) = rooms.get_mut(room_id) else {
            return false;
        };

        let before = room.players.len();
        room.players.retain(|p| p.id != *player_id);
        let removed = room.players.len() != before;
        if removed {
            room.touch(Instant::now());
            info!(
                room_id = %room_id,
                player_id = %player_id,
                player_count = room.players.len(),
                "Player left room"
            );
        }
        removed
    }

    /// Remove every empty room idle for longer than the idle window
    pub fn reap(&self, now: Instant) -> Vec<RoomId> {
        let mut rooms = self.store.write();
        let mut reaped = Vec::new();

        rooms.retain(|id, room| {
            if room.is_reapable(now, self.idle_timeout) {
                reaped.push(*id);
                false
            } else {
                true
            }
        });

        for room_id in &reaped {
            info!(room_id = %room_id, "Room removed due to inactivity");
        }
        debug!(remaining = rooms.len(), reaped = reaped.len(), "Reaper pass complete");
        reaped
    }

    /// Resolve a credential to its claims; any failure is `Unauthorized`
    pub fn authorize(&self, token: Option<&str>) -> Result<SessionClaims, GameError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(GameError::Unauthorized)?;

        self.credentials.verify(token).map_err(|e| {
            warn!(error = %e, "Rejected session credential");
            GameError::from(e)
        })
    }

    /// Test hook: a room created at a chosen instant
    #[cfg(test)]
    pub(crate) fn create_room_at(&self, at: Instant) -> RoomId {
        let room = GameState::new(at);
        let room_id = room.id;
        self.store.write().insert(room_id, room);
        room_id
    }
}

/// Build a manager over fresh state for tests
#[cfg(test)]
pub(crate) fn test_manager() -> (Arc<LobbyManager>, Arc<ConnectionRegistry>) {
    use crate::auth::TokenService;

    let connections = Arc::new(ConnectionRegistry::new());
    let manager = LobbyManager::new(
        Arc::new(LobbyStore::new()),
        Arc::new(TokenService::new("lobby-test-secret", Duration::from_secs(3600))),
        connections.clone(),
        Duration::from_secs(600),
    );
    (Arc::new(manager), connections)
}
