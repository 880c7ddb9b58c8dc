//! Fixed-period background tasks: the simulation tick and the idle-room reaper

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::util::time::scaled_delta;
use crate::ws::broadcast::Broadcaster;
use crate::ws::protocol::RoomSnapshot;

use super::lobby::{LobbyManager, LobbyStore};
use super::physics::MAX_TICK_DELTA;
use super::snapshot::SnapshotBuilder;

/// Simulation delta for the wall time since the previous tick.
/// A stalled tick is capped rather than integrated in one large step.
fn tick_delta(elapsed: Duration) -> f64 {
    scaled_delta(elapsed).min(MAX_TICK_DELTA)
}

/// Advances every room and broadcasts the result
pub struct TickSimulator {
    store: Arc<LobbyStore>,
    broadcaster: Broadcaster,
    period: Duration,
}

impl TickSimulator {
    pub fn new(store: Arc<LobbyStore>, broadcaster: Broadcaster, period: Duration) -> Self {
        Self {
            store,
            broadcaster,
            period,
        }
    }

    /// Advance all rooms by `dt` under a single write lock and snapshot them
    /// before the lock is released
    pub fn advance(&self, dt: f64) -> Vec<RoomSnapshot> {
        let mut rooms = self.store.write();

        for room in rooms.values_mut() {
            for player_id in room.step(dt) {
                info!(room_id = %room.id, player_id = %player_id, "Player died");
            }
        }

        rooms.values().map(SnapshotBuilder::build).collect()
    }

    /// One full tick: simulate, then fan out with the store unlocked
    pub fn tick(&self, dt: f64) -> usize {
        let snapshots = self.advance(dt);
        let rooms = snapshots.len();
        for snapshot in snapshots {
            self.broadcaster.broadcast(snapshot);
        }
        rooms
    }

    /// Run the authoritative tick loop until `shutdown` fires
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(period_ms = self.period.as_millis() as u64, "Tick loop started");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            let now = Instant::now();
            let dt = tick_delta(now.duration_since(last_tick));
            last_tick = now;

            let rooms = self.tick(dt);
            debug!(dt, rooms, "Tick");
        }

        info!("Tick loop stopped");
    }
}

/// Periodically removes empty, idle rooms
pub struct Reaper {
    lobby: Arc<LobbyManager>,
    period: Duration,
}

impl Reaper {
    pub fn new(lobby: Arc<LobbyManager>, period: Duration) -> Self {
        Self { lobby, period }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(period_secs = self.period.as_secs(), "Reaper started");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            self.lobby.reap(Instant::now());
        }

        info!("Reaper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BroadcastScope;
    use crate::game::combat::{Projectile, PROJECTILE_DAMAGE};
    use crate::game::lobby::test_manager;
    use crate::game::physics::{ACCELERATION, CANVAS_HEIGHT, CANVAS_WIDTH};
    use crate::game::state::{PlayerId, RoomId, Vec2, STARTING_HEALTH};
    use crate::ws::connection::{Connection, ConnectionRegistry};
    use crate::ws::protocol::IntentData;
    use uuid::Uuid;

    const NOMINAL_DT: f64 = 0.16;

    struct Fixture {
        lobby: Arc<LobbyManager>,
        registry: Arc<ConnectionRegistry>,
        sim: TickSimulator,
    }

    fn fixture() -> Fixture {
        let (lobby, registry) = test_manager();
        let sim = TickSimulator::new(
            lobby.store().clone(),
            Broadcaster::new(registry.clone(), BroadcastScope::Room),
            Duration::from_millis(16),
        );
        Fixture {
            lobby,
            registry,
            sim,
        }
    }

    fn join(lobby: &LobbyManager, room_id: RoomId) -> (PlayerId, String) {
        let (conn, _rx) = Connection::new(64);
        let outcome = lobby.join_room(&room_id.to_string(), "p", conn).unwrap();
        (outcome.player_id, outcome.token)
    }

    fn held_right_and_down(cursor_x: f64, cursor_y: f64) -> IntentData {
        IntentData {
            up: false,
            down: true,
            left: false,
            right: true,
            cursor_x,
            cursor_y,
        }
    }

    #[test]
    fn intent_between_ticks_is_fully_visible_next_tick() {
        let f = fixture();
        let room_id = f.lobby.create_room();
        let (player_id, token) = join(&f.lobby, room_id);

        f.sim.advance(NOMINAL_DT);
        f.lobby
            .update_intent(Some(&token), &held_right_and_down(2000.0, 1200.0))
            .unwrap();
        let snapshots = f.sim.advance(NOMINAL_DT);

        let player = snapshots[0].players.iter().find(|p| p.id == player_id).unwrap();
        assert!(player.held_directions.right && player.held_directions.down);
        assert_eq!((player.cursor_x, player.cursor_y), (2000.0, 1200.0));
        assert!(player.velocity_x > 0.0 && player.velocity_y > 0.0);
        assert!(player.position_x > 500.0 && player.position_y > 500.0);
    }

    #[test]
    fn players_stay_inside_canvas_every_tick() {
        let f = fixture();
        let room_id = f.lobby.create_room();
        let (_, token) = join(&f.lobby, room_id);
        f.lobby
            .update_intent(Some(&token), &held_right_and_down(0.0, 0.0))
            .unwrap();

        for _ in 0..2_000 {
            let snapshots = f.sim.advance(NOMINAL_DT);
            let p = &snapshots[0].players[0];
            assert!((0.0..=CANVAS_WIDTH).contains(&p.position_x));
            assert!((0.0..=CANVAS_HEIGHT).contains(&p.position_y));
            assert!(p.velocity_x.is_finite() && p.velocity_y.is_finite());
        }

        let p = &f.sim.advance(NOMINAL_DT)[0].players[0];
        assert_eq!((p.position_x, p.position_y), (CANVAS_WIDTH, CANVAS_HEIGHT));
    }

    #[test]
    fn projectile_reaches_target_after_distance_over_speed_ticks() {
        let f = fixture();
        let room_id = f.lobby.create_room();
        let (_, token) = join(&f.lobby, room_id);

        // Aim straight right, let one zero-length tick update the facing angle
        let target_x = 790.0;
        f.lobby
            .update_intent(
                Some(&token),
                &IntentData {
                    up: false,
                    down: false,
                    left: false,
                    right: false,
                    cursor_x: target_x,
                    cursor_y: 500.0,
                },
            )
            .unwrap();
        f.sim.advance(0.0);
        f.lobby.shoot(Some(&token)).unwrap();

        let start_x = f.lobby.store().read()[&room_id].projectiles[0].position.x;
        assert!((start_x - 530.0).abs() < 1e-9);

        let ticks = ((target_x - start_x) / 13.0).round() as usize;
        let mut snapshots = Vec::new();
        for _ in 0..ticks {
            snapshots = f.sim.advance(1.0);
        }

        let projectile = &snapshots[0].projectiles[0];
        assert!((projectile.position_x - target_x).abs() < 1e-6);
        assert!((projectile.position_y - 500.0).abs() < 1e-6);
    }

    #[test]
    fn collision_damages_player_and_consumes_projectile() {
        let f = fixture();
        let room_id = f.lobby.create_room();
        let (player_id, _) = join(&f.lobby, room_id);
        {
            let mut rooms = f.lobby.store().write();
            let room = rooms.get_mut(&room_id).unwrap();
            room.player_mut(player_id).unwrap().position = Vec2::new(100.0, 100.0);
            room.projectiles.push(Projectile {
                id: Uuid::new_v4(),
                owner_id: Uuid::new_v4(),
                position: Vec2::new(110.0, 100.0),
                velocity: Vec2::ZERO,
            });
        }

        let snapshots = f.sim.advance(NOMINAL_DT);

        assert_eq!(snapshots[0].players[0].health, STARTING_HEALTH - PROJECTILE_DAMAGE);
        assert!(snapshots[0].projectiles.is_empty());
    }

    #[test]
    fn off_canvas_projectiles_are_pruned() {
        let f = fixture();
        let room_id = f.lobby.create_room();
        {
            let mut rooms = f.lobby.store().write();
            rooms.get_mut(&room_id).unwrap().projectiles.push(Projectile {
                id: Uuid::new_v4(),
                owner_id: Uuid::new_v4(),
                position: Vec2::new(CANVAS_WIDTH - 5.0, 10.0),
                velocity: Vec2::new(13.0, 0.0),
            });
        }

        assert_eq!(f.sim.advance(NOMINAL_DT)[0].projectiles.len(), 1);
        assert!(f.sim.advance(1.0)[0].projectiles.is_empty());
    }

    #[test]
    fn ticks_advance_every_room() {
        let f = fixture();
        let a = f.lobby.create_room();
        let b = f.lobby.create_room();
        let (_, token_a) = join(&f.lobby, a);
        let (_, token_b) = join(&f.lobby, b);
        for token in [&token_a, &token_b] {
            f.lobby
                .update_intent(Some(token), &held_right_and_down(0.0, 0.0))
                .unwrap();
        }

        let snapshots = f.sim.advance(NOMINAL_DT);
        assert_eq!(snapshots.len(), 2);
        for snapshot in snapshots {
            assert!(snapshot.players[0].position_x > 500.0);
        }
    }

    #[test]
    fn stalled_tick_is_capped_and_does_not_overshoot() {
        assert!((tick_delta(Duration::from_millis(16)) - NOMINAL_DT).abs() < 1e-9);
        assert_eq!(tick_delta(Duration::from_millis(300)), MAX_TICK_DELTA);
        assert_eq!(tick_delta(Duration::from_secs(5)), MAX_TICK_DELTA);

        let f = fixture();
        let room_id = f.lobby.create_room();
        let (_, token) = join(&f.lobby, room_id);
        f.lobby
            .update_intent(Some(&token), &held_right_and_down(2000.0, 1200.0))
            .unwrap();

        let snapshots = f.sim.advance(tick_delta(Duration::from_secs(2)));
        let p = &snapshots[0].players[0];
        assert!((p.velocity_x - ACCELERATION).abs() < 1e-9);
        assert!((p.velocity_y - ACCELERATION).abs() < 1e-9);
    }

    #[tokio::test]
    async fn tick_broadcasts_game_update_to_room_members() {
        let f = fixture();
        let room_id = f.lobby.create_room();
        let (conn, mut rx) = Connection::new(8);
        let outcome = f.lobby.join_room(&room_id.to_string(), "alice", conn).unwrap();

        assert_eq!(f.sim.tick(NOMINAL_DT), 1);

        // game_enter first, then the tick's update
        assert!(rx.recv().await.is_some());
        let json = rx.recv().await.expect("expected a game_update frame");
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], "game_update");
        assert_eq!(value["data"]["players"][0]["id"], outcome.player_id.to_string());
        assert_eq!(f.registry.len(), 1);
    }

    #[tokio::test]
    async fn loops_stop_on_shutdown() {
        let f = fixture();
        let room_id = f.lobby.create_room();
        let (conn, mut rx) = Connection::new(256);
        f.lobby.join_room(&room_id.to_string(), "alice", conn).unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tick = tokio::spawn(f.sim.run(shutdown_rx.clone()));
        let reaper = tokio::spawn(Reaper::new(f.lobby.clone(), Duration::from_millis(5)).run(shutdown_rx));

        // game_enter, then at least one update while running
        for _ in 0..2 {
            let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
            assert!(matches!(frame, Ok(Some(_))));
        }

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), tick)
            .await
            .expect("tick loop should stop")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), reaper)
            .await
            .expect("reaper should stop")
            .unwrap();

        // Occupied room survived the reaper
        assert_eq!(f.lobby.store().room_count(), 1);
    }
}
