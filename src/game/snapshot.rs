//! Snapshot building for network transmission

use crate::ws::protocol::{PlayerSnapshot, ProjectileSnapshot, RoomSnapshot};

use super::combat::Projectile;
use super::state::{GameState, Player};

/// Builds wire snapshots from authoritative room state
pub struct SnapshotBuilder;

impl SnapshotBuilder {
    /// Copy a room's full state. Call while holding the lock that guards `room`.
    pub fn build(room: &GameState) -> RoomSnapshot {
        RoomSnapshot {
            room_id: room.id,
            players: room.players.iter().map(Self::player).collect(),
            projectiles: room.projectiles.iter().map(Self::projectile).collect(),
        }
    }

    fn player(p: &Player) -> PlayerSnapshot {
        PlayerSnapshot {
            id: p.id,
            display_name: p.display_name.clone(),
            health: p.health,
            alive: p.alive,
            position_x: p.position.x,
            position_y: p.position.y,
            velocity_x: p.velocity.x,
            velocity_y: p.velocity.y,
            angle: p.angle,
            cursor_x: p.cursor.x,
            cursor_y: p.cursor.y,
            held_directions: p.held,
        }
    }

    fn projectile(p: &Projectile) -> ProjectileSnapshot {
        ProjectileSnapshot {
            id: p.id,
            owner_id: p.owner_id,
            position_x: p.position.x,
            position_y: p.position.y,
            velocity_x: p.velocity.x,
            velocity_y: p.velocity.y,
        }
    }
}
