//! Snapshot fan-out to registered connections

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, warn};

use crate::config::BroadcastScope;
use crate::game::state::PlayerId;

use super::connection::ConnectionRegistry;
use super::protocol::{RoomSnapshot, ServerMsg};

/// Serializes each room update once and queues it on every recipient
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    scope: BroadcastScope,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>, scope: BroadcastScope) -> Self {
        Self { registry, scope }
    }

    /// Send `game_update` for one room. Returns how many connections accepted it.
    ///
    /// A connection that fails to accept the frame is unregistered and closed;
    /// the remaining recipients are unaffected.
    pub fn broadcast(&self, snapshot: RoomSnapshot) -> usize {
        let members: HashSet<PlayerId> = snapshot.players.iter().map(|p| p.id).collect();
        let room_id = snapshot.room_id;

        let payload: Arc<str> = match serde_json::to_string(&ServerMsg::GameUpdate(snapshot)) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                error!(room_id = %room_id, error = %e, "Failed to serialize room snapshot");
                return 0;
            }
        };

        let mut delivered = 0;
        for (player_id, conn) in self.registry.all() {
            if self.scope == BroadcastScope::Room && !members.contains(&player_id) {
                continue;
            }

            match conn.send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        room_id = %room_id,
                        player_id = %player_id,
                        error = %e,
                        "Dropping connection after failed send"
                    );
                    self.registry.unregister_if(&player_id, &conn);
                    conn.close("send failed");
                }
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::snapshot::SnapshotBuilder;
    use crate::game::state::{GameState, Player};
    use crate::ws::connection::Connection;
    use std::time::{Duration, Instant};

    fn room_with(names: &[&str]) -> GameState {
        let mut room = GameState::new(Instant::now());
        for name in names {
            room.players.push(Player::new(name.to_string()));
        }
        room
    }

    #[tokio::test]
    async fn room_scope_reaches_only_room_members() {
        let registry = Arc::new(ConnectionRegistry::new());
        let room = room_with(&["alice"]);
        let other = room_with(&["bob"]);

        let (alice, mut alice_rx) = Connection::new(4);
        let (bob, mut bob_rx) = Connection::new(4);
        registry.register(room.players[0].id, alice);
        registry.register(other.players[0].id, bob);

        let broadcaster = Broadcaster::new(registry, BroadcastScope::Room);
        assert_eq!(broadcaster.broadcast(SnapshotBuilder::build(&room)), 1);

        let json = alice_rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], "game_update");
        assert_eq!(value["data"]["roomId"], room.id.to_string());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn global_scope_reaches_every_connection() {
        // Process-wide fan-out: players of other rooms also receive this room's update
        let registry = Arc::new(ConnectionRegistry::new());
        let room = room_with(&["alice"]);
        let other = room_with(&["bob"]);

        let (alice, mut alice_rx) = Connection::new(4);
        let (bob, mut bob_rx) = Connection::new(4);
        registry.register(room.players[0].id, alice);
        registry.register(other.players[0].id, bob);

        let broadcaster = Broadcaster::new(registry, BroadcastScope::Global);
        assert_eq!(broadcaster.broadcast(SnapshotBuilder::build(&room)), 2);

        let (Some(a), Some(b)) =
            (alice_rx.recv().await, bob_rx.recv().await)
        else {
            panic!("both connections should receive the update");
        };
        // Serialized once, shared by both recipients
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn failed_send_drops_only_that_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let room = room_with(&["alice", "bob"]);
        let alice_id = room.players[0].id;
        let bob_id = room.players[1].id;

        let (alice, alice_rx) = Connection::new(4);
        let (bob, mut bob_rx) = Connection::new(4);
        registry.register(alice_id, alice);
        registry.register(bob_id, bob);
        drop(alice_rx);

        let broadcaster = Broadcaster::new(registry.clone(), BroadcastScope::Room);
        assert_eq!(broadcaster.broadcast(SnapshotBuilder::build(&room)), 1);

        assert!(registry.get(&alice_id).is_none());
        assert!(registry.get(&bob_id).is_some());
        assert!(bob_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn stalled_connection_is_closed_and_unregistered() {
        let registry = Arc::new(ConnectionRegistry::new());
        let room = room_with(&["alice"]);
        let alice_id = room.players[0].id;

        let (alice, mut alice_rx) = Connection::new(1);
        registry.register(alice_id, alice.clone());
        let broadcaster = Broadcaster::new(registry.clone(), BroadcastScope::Room);

        assert_eq!(broadcaster.broadcast(SnapshotBuilder::build(&room)), 1);
        assert_eq!(broadcaster.broadcast(SnapshotBuilder::build(&room)), 0);
        assert!(registry.get(&alice_id).is_none());

        // Close is delivered even though the queue was full
        assert!(alice.is_closed());
        let reason = tokio::time::timeout(Duration::from_secs(1), alice.closed())
            .await
            .expect("stalled connection should be told to close");
        assert_eq!(reason, "send failed");

        // Only the frame queued before the stall; nothing after the close
        assert!(alice_rx.recv().await.is_some());
        assert!(alice_rx.try_recv().is_err());
        assert_eq!(broadcaster.broadcast(SnapshotBuilder::build(&room)), 0);
    }
}
