//! Time utilities for game simulation

use std::time::{Duration, Instant};

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Multiplier from elapsed wall seconds to simulation delta.
///
/// Every motion constant (acceleration, smoothing, projectile speed) is tuned
/// against this scale: at the nominal 16 ms period one tick advances the
/// simulation by 0.16 units of delta.
pub const TIME_SCALE: f64 = 10.0;

/// Convert the wall time between two tick firings into simulation delta
pub fn scaled_delta(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * TIME_SCALE
}
