//! Game simulation modules

pub mod actions;
pub mod combat;
pub mod lobby;
pub mod physics;
pub mod snapshot;
pub mod state;
pub mod tick;

pub use lobby::{LobbyManager, LobbyStore};
pub use tick::{Reaper, TickSimulator};

use crate::auth::AuthError;

/// Errors reported to the client that sent an action
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Missing or mistyped field; the connection stays open
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Credential missing, expired or forged; the session is torn down
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Unknown room")]
    RoomNotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GameError {
    /// Stable wire code
    pub fn code(&self) -> &'static str {
        match self {
            GameError::InvalidInput(_) => "invalid_input",
            GameError::Unauthorized => "unauthorized",
            GameError::RoomNotFound => "room_not_found",
            GameError::Internal(_) => "internal_error",
        }
    }
}

impl From<AuthError> for GameError {
    fn from(_: AuthError) -> Self {
        GameError::Unauthorized
    }
}
