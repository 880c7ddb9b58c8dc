//! Player movement and arena bounds

use std::f64::consts::FRAC_PI_2;

use super::state::{HeldDirections, Player, Vec2};

/// Arena width in canvas units
pub const CANVAS_WIDTH: f64 = 2560.0;
/// Arena height in canvas units
pub const CANVAS_HEIGHT: f64 = 1440.0;

/// Target speed while a direction is held
pub const ACCELERATION: f64 = 33.0;
/// How quickly velocity converges on the target velocity
pub const SMOOTHING: f64 = 5.0;

/// Largest delta one tick may integrate; beyond it smoothing would overshoot
pub const MAX_TICK_DELTA: f64 = 1.0 / SMOOTHING;
/// Player hitbox radius
pub const PLAYER_RADIUS: f64 = 20.0;

/// Physics system for updating player positions and velocities
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Target velocity from the held controls. Up and left win ties.
    pub fn target_velocity(held: HeldDirections) -> Vec2 {
        let axis = |negative: bool, positive: bool| {
            if negative {
                -ACCELERATION
            } else if positive {
                ACCELERATION
            } else {
                0.0
            }
        };

        Vec2::new(axis(held.left, held.right), axis(held.up, held.down))
    }

    /// Advance one player by `dt` of scaled time
    pub fn integrate_player(player: &mut Player, dt: f64) {
        player.target_velocity = Self::target_velocity(player.held);

        // Stays within [0, 1] as long as callers cap dt at MAX_TICK_DELTA
        let blend = SMOOTHING * dt;
        player.velocity.x += (player.target_velocity.x - player.velocity.x) * blend;
        player.velocity.y += (player.target_velocity.y - player.velocity.y) * blend;

        player.position.x += player.velocity.x * dt;
        player.position.y += player.velocity.y * dt;
        player.position = Self::clamp_to_canvas(player.position);

        player.angle = Self::facing_angle(player.position, player.cursor);
    }

    /// Clamp each axis independently into the canvas
    pub fn clamp_to_canvas(position: Vec2) -> Vec2 {
        Vec2::new(
            position.x.clamp(0.0, CANVAS_WIDTH),
            position.y.clamp(0.0, CANVAS_HEIGHT),
        )
    }

    /// Angle from `from` towards `target`, rotated so that 0 faces up
    pub fn facing_angle(from: Vec2, target: Vec2) -> f64 {
        let dy = target.y - from.y;
        let dx = target.x - from.x;
        dy.atan2(dx) + FRAC_PI_2
    }

    /// True while a point lies inside the canvas, edges included
    pub fn in_bounds(position: Vec2) -> bool {
        (0.0..=CANVAS_WIDTH).contains(&position.x) && (0.0..=CANVAS_HEIGHT).contains(&position.y)
    }

    /// Rotate a local offset by `angle` and translate it to `origin`
    pub fn rotate_and_translate(offset: Vec2, angle: f64, origin: Vec2) -> Vec2 {
        let (sin, cos) = angle.sin_cos();
        Vec2::new(
            cos * offset.x - sin * offset.y + origin.x,
            sin * offset.x + cos * offset.y + origin.y,
        )
    }
}
