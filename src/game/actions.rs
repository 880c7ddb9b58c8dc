//! Player action handlers.
//!
//! Handlers only stage intent: all integration and collision happens in the
//! tick, so outcomes do not depend on how often a client sends input.

use std::time::Instant;

use tracing::debug;
use uuid::Uuid;

use crate::auth::SessionClaims;
use crate::ws::protocol::IntentData;

use super::combat::Projectile;
use super::lobby::LobbyManager;
use super::state::{HeldDirections, PlayerId, RoomId, Vec2};
use super::GameError;

impl LobbyManager {
    /// `player_update_position`: verify the credential, then overwrite the
    /// player's held controls and cursor
    pub fn update_intent(&self, token: Option<&str>, intent: &IntentData) -> Result<(), GameError> {
        let claims = self.authorize(token)?;
        self.update_intent_as(&claims, intent)
    }

    /// `update_intent` for a credential the caller has already verified
    pub fn update_intent_as(&self, claims: &SessionClaims, intent: &IntentData) -> Result<(), GameError> {
        let cursor = Vec2::new(intent.cursor_x, intent.cursor_y);
        if !cursor.x.is_finite() || !cursor.y.is_finite() {
            return Err(GameError::InvalidInput("cursor must be finite".to_string()));
        }

        self.apply_intent(&claims.room_id, &claims.player_id, intent.held(), cursor);
        Ok(())
    }

    /// `player_shoot_projectile`: verify the credential, then fire
    pub fn shoot(&self, token: Option<&str>) -> Result<(), GameError> {
        let claims = self.authorize(token)?;
        self.shoot_as(&claims);
        Ok(())
    }

    pub fn shoot_as(&self, claims: &SessionClaims) {
        self.spawn_projectile(&claims.room_id, &claims.player_id);
    }

    /// Stage movement intent. A vanished room or player is a silent no-op.
    pub fn apply_intent(
        &self,
        room_id: &RoomId,
        player_id: &PlayerId,
        held: HeldDirections,
        cursor: Vec2,
    ) -> bool {
        let mut rooms = self.store().write();
        let Some(room) = rooms.get_mut(room_id) else {
            debug!(room_id = %room_id, "Intent for unknown room ignored");
            return false;
        };

        match room.player_mut(*player_id) {
            Some(player) => {
                player.held = held;
                player.cursor = cursor;
            }
            None => {
                debug!(room_id = %room_id, player_id = %player_id, "Intent for departed player ignored");
                return false;
            }
        }

        room.touch(Instant::now());
        true
    }

    /// Append a projectile fired by `player_id`. Dead or departed players do not shoot.
    pub fn spawn_projectile(&self, room_id: &RoomId, player_id: &PlayerId) -> Option<Uuid> {
        let mut rooms = self.store().write();
        let room = rooms.get_mut(room_id)?;

        let projectile = match room.player(*player_id) {
            Some(shooter) if shooter.alive => Projectile::fire(shooter),
            _ => {
                debug!(room_id = %room_id, player_id = %player_id, "Shot from absent or dead player ignored");
                return None;
            }
        };

        let projectile_id = projectile.id;
        room.projectiles.push(projectile);
        room.touch(Instant::now());
        Some(projectile_id)
    }
}
