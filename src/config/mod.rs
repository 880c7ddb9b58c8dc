//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Which connections receive a room's `game_update`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastScope {
    /// Only connections registered for the room's own players
    Room,
    /// Every registered connection, regardless of room
    Global,
}

impl FromStr for BroadcastScope {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "room" => Ok(Self::Room),
            "global" => Ok(Self::Global),
            _ => Err(()),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// HMAC key for session credentials
    pub token_secret: String,
    /// How long an issued credential stays valid
    pub token_ttl: Duration,

    /// Simulation tick period
    pub tick_interval: Duration,
    /// How often the reaper scans for idle rooms
    pub reap_interval: Duration,
    /// How long an empty room may sit idle before it is removed
    pub room_idle_timeout: Duration,
    pub broadcast_scope: BroadcastScope,
    /// Queued outbound frames per connection before it counts as stalled
    pub outbound_buffer: usize,

    /// Allowed client origins for CORS (comma-separated in the environment)
    pub client_origins: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // PORT takes precedence over SERVER_ADDR, as on most hosting platforms
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        let client_origins = env::var("CLIENT_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:8080,http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            token_secret: env::var("SECRET").map_err(|_| ConfigError::Missing("SECRET"))?,
            token_ttl: Duration::from_secs(parse_or("TOKEN_TTL_SECS", 72 * 60 * 60)?),

            tick_interval: Duration::from_millis(parse_or("TICK_INTERVAL_MS", 16)?),
            reap_interval: Duration::from_secs(parse_or("REAP_INTERVAL_SECS", 60)?),
            room_idle_timeout: Duration::from_secs(parse_or("ROOM_IDLE_TIMEOUT_SECS", 600)?),
            broadcast_scope: parse_or("BROADCAST_SCOPE", BroadcastScope::Room)?,
            outbound_buffer: parse_or("OUTBOUND_BUFFER", 64)?,

            client_origins,
        })
    }

    /// Configuration with the design defaults and the given secret
    #[cfg(test)]
    pub fn for_tests(secret: &str) -> Self {
        Self {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".to_string(),
            token_secret: secret.to_string(),
            token_ttl: Duration::from_secs(60),
            tick_interval: Duration::from_millis(16),
            reap_interval: Duration::from_secs(60),
            room_idle_timeout: Duration::from_secs(600),
            broadcast_scope: BroadcastScope::Room,
            outbound_buffer: 16,
            client_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
