//! Application state shared across routes

use std::sync::Arc;

use crate::auth::{CredentialService, TokenService};
use crate::config::Config;
use crate::game::{LobbyManager, LobbyStore, Reaper, TickSimulator};
use crate::ws::{Broadcaster, ConnectionRegistry};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<LobbyStore>,
    pub connections: Arc<ConnectionRegistry>,
    pub lobby: Arc<LobbyManager>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let credentials: Arc<dyn CredentialService> =
            Arc::new(TokenService::new(&config.token_secret, config.token_ttl));

        let store = Arc::new(LobbyStore::new());
        let connections = Arc::new(ConnectionRegistry::new());
        let lobby = Arc::new(LobbyManager::new(
            store.clone(),
            credentials,
            connections.clone(),
            config.room_idle_timeout,
        ));

        Self {
            config,
            store,
            connections,
            lobby,
        }
    }

    /// Tick loop over this state's rooms and connections
    pub fn tick_simulator(&self) -> TickSimulator {
        TickSimulator::new(
            self.store.clone(),
            Broadcaster::new(self.connections.clone(), self.config.broadcast_scope),
            self.config.tick_interval,
        )
    }

    pub fn reaper(&self) -> Reaper {
        Reaper::new(self.lobby.clone(), self.config.reap_interval)
    }
}
