//! Combat system - projectiles, damage, hit detection

use uuid::Uuid;

use super::physics::{PhysicsSystem, PLAYER_RADIUS};
use super::state::{Player, PlayerId, Vec2};

/// Projectile speed in canvas units per unit of scaled time
pub const PROJECTILE_SPEED: f64 = 13.0;
/// Projectile hitbox radius
pub const PROJECTILE_RADIUS: f64 = 5.0;
/// Health removed by one hit
pub const PROJECTILE_DAMAGE: f64 = 10.0;
/// Muzzle position relative to the player centre before rotation (nose points up)
pub const MUZZLE_OFFSET: Vec2 = Vec2 { x: 0.0, y: -30.0 };

/// Active projectile in a room
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: Uuid,
    /// Shooter at creation time; may have left the room since
    pub owner_id: PlayerId,
    pub position: Vec2,
    pub velocity: Vec2,
}

impl Projectile {
    /// Fire from the shooter's muzzle towards its last known cursor
    pub fn fire(shooter: &Player) -> Self {
        let origin = CombatSystem::muzzle_point(shooter);
        Self {
            id: Uuid::new_v4(),
            owner_id: shooter.id,
            position: origin,
            velocity: CombatSystem::aim_velocity(origin, shooter.cursor, PROJECTILE_SPEED),
        }
    }

    /// Linear motion, no smoothing
    pub fn step(&mut self, dt: f64) {
        self.position.x += self.velocity.x * dt;
        self.position.y += self.velocity.y * dt;
    }

    /// Check collision with a target
    pub fn check_hit(&self, target: Vec2, target_radius: f64) -> bool {
        self.position.distance(target) < PROJECTILE_RADIUS + target_radius
    }
}

/// Combat system for spawning projectiles and resolving hits
pub struct CombatSystem;

impl CombatSystem {
    /// Where a shot leaves the player's ship
    pub fn muzzle_point(player: &Player) -> Vec2 {
        PhysicsSystem::rotate_and_translate(MUZZLE_OFFSET, player.angle, player.position)
    }

    /// Velocity of magnitude `speed` pointing from `origin` to `target`
    pub fn aim_velocity(origin: Vec2, target: Vec2, speed: f64) -> Vec2 {
        let heading = (target.y - origin.y).atan2(target.x - origin.x);
        let (sin, cos) = heading.sin_cos();
        Vec2::new(cos * speed, sin * speed)
    }

    /// Resolve projectile hits in projectile order.
    ///
    /// Each projectile damages the first living player it overlaps and is
    /// consumed. Returns the ids of players killed by these hits.
    pub fn resolve_hits(players: &mut [Player], projectiles: &mut Vec<Projectile>) -> Vec<PlayerId> {
        let mut killed = Vec::new();

        projectiles.retain(|projectile| {
            let target = players
                .iter_mut()
                .find(|p| p.alive && projectile.check_hit(p.position, PLAYER_RADIUS));

            match target {
                Some(player) => {
                    if player.apply_damage(PROJECTILE_DAMAGE) {
                        killed.push(player.id);
                    }
                    false
                }
                None => true,
            }
        });

        killed
    }
}
