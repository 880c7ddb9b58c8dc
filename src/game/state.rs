//! Authoritative room, player and projectile state

use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::combat::{CombatSystem, Projectile};
use super::physics::PhysicsSystem;

pub type RoomId = Uuid;
pub type PlayerId = Uuid;

/// Health every player starts with
pub const STARTING_HEALTH: f64 = 100.0;
/// Where new players appear
pub const SPAWN_POINT: Vec2 = Vec2 { x: 500.0, y: 500.0 };

/// Plain 2D vector in canvas units
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// Currently pressed movement controls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldDirections {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

/// Player state in a room (authoritative)
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub display_name: String,
    pub health: f64,
    pub alive: bool,

    // Position and movement
    pub position: Vec2,
    pub velocity: Vec2,
    pub target_velocity: Vec2,
    /// Facing in radians, 0 = up
    pub angle: f64,

    // Latest intent from the client
    pub cursor: Vec2,
    pub held: HeldDirections,
}

impl Player {
    pub fn new(display_name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name,
            health: STARTING_HEALTH,
            alive: true,
            position: SPAWN_POINT,
            velocity: Vec2::ZERO,
            target_velocity: Vec2::ZERO,
            angle: 0.0,
            cursor: Vec2::ZERO,
            held: HeldDirections::default(),
        }
    }

    /// Subtract damage, clamping at zero. Returns true if this hit killed the player.
    pub fn apply_damage(&mut self, damage: f64) -> bool {
        if !self.alive {
            return false;
        }
        self.health = (self.health - damage).max(0.0);
        if self.health <= 0.0 {
            self.alive = false;
            return true;
        }
        false
    }

    /// Advance this player by one tick of scaled delta time
    pub fn step(&mut self, dt: f64) {
        if self.alive {
            PhysicsSystem::integrate_player(self, dt);
        }
    }
}

/// A room: the unit of isolation for players and projectiles
#[derive(Debug, Clone)]
pub struct GameState {
    pub id: RoomId,
    /// Join order
    pub players: Vec<Player>,
    pub projectiles: Vec<Projectile>,
    pub last_activity: Instant,
}

impl GameState {
    pub fn new(now: Instant) -> Self {
        Self {
            id: Uuid::new_v4(),
            players: Vec::new(),
            projectiles: Vec::new(),
            last_activity: now,
        }
    }

    pub fn player(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn player_mut(&mut self, player_id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// An empty room idle for longer than `idle` may be removed
    pub fn is_reapable(&self, now: Instant, idle: std::time::Duration) -> bool {
        self.players.is_empty() && now.saturating_duration_since(self.last_activity) > idle
    }

    /// Advance the whole room by one tick: movement, projectiles, then hits.
    ///
    /// Returns the ids of players killed during this step.
    pub fn step(&mut self, dt: f64) -> Vec<PlayerId> {
        for player in &mut self.players {
            player.step(dt);
        }

        self.projectiles.retain_mut(|projectile| {
            projectile.step(dt);
            PhysicsSystem::in_bounds(projectile.position)
        });

        CombatSystem::resolve_hits(&mut self.players, &mut self.projectiles)
    }
}
