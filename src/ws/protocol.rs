//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::state::HeldDirections;
use crate::game::GameError;

/// Messages sent from client to server, tagged by action kind in `id`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Create an empty room
    CreateGame,

    /// Join an existing room under a display name
    JoinGame { data: JoinData },

    /// Replace the sender's held controls and cursor
    PlayerUpdatePosition {
        #[serde(default)]
        token: Option<String>,
        data: IntentData,
    },

    /// Fire from the sender's muzzle towards its cursor
    PlayerShootProjectile {
        #[serde(default)]
        token: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinData {
    pub room_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentData {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub cursor_x: f64,
    pub cursor_y: f64,
}

impl IntentData {
    pub fn held(&self) -> HeldDirections {
        HeldDirections {
            up: self.up,
            down: self.down,
            left: self.left,
            right: self.right,
        }
    }
}

impl ClientMsg {
    /// Decode a text frame, rejecting unknown kinds and malformed fields
    pub fn parse(text: &str) -> Result<Self, GameError> {
        serde_json::from_str(text).map_err(|e| GameError::InvalidInput(e.to_string()))
    }
}

/// Action kind and credential of an inbound frame, read ahead of its payload
/// so a credentialed action is authorized before its body is inspected
#[derive(Debug, Clone, Deserialize)]
pub struct ActionHeader {
    pub id: String,
    #[serde(default)]
    token: Option<serde_json::Value>,
}

impl ActionHeader {
    pub fn parse(text: &str) -> Result<Self, GameError> {
        serde_json::from_str(text).map_err(|e| GameError::InvalidInput(e.to_string()))
    }

    /// Kinds that act as an existing player
    pub fn requires_credential(&self) -> bool {
        matches!(
            self.id.as_str(),
            "player_update_position" | "player_shoot_projectile"
        )
    }

    /// The credential, if present and a string
    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().and_then(serde_json::Value::as_str)
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "id", content = "data", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Room created; relay the id to whoever should join it
    GameCreated {
        #[serde(rename = "roomId")]
        room_id: Uuid,
    },

    /// Join accepted
    GameEnter {
        token: String,
        snapshot: RoomSnapshot,
    },

    /// Per-tick room state
    GameUpdate(RoomSnapshot),

    /// Error message
    Error { code: String, message: String },
}

impl ServerMsg {
    pub fn error(err: &GameError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Full room state at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: Uuid,
    pub players: Vec<PlayerSnapshot>,
    pub projectiles: Vec<ProjectileSnapshot>,
}

/// Player state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub id: Uuid,
    pub display_name: String,
    pub health: f64,
    pub alive: bool,
    pub position_x: f64,
    pub position_y: f64,
    pub velocity_x: f64,
    pub velocity_y: f64,
    /// Facing in radians, 0 = up
    pub angle: f64,
    pub cursor_x: f64,
    pub cursor_y: f64,
    pub held_directions: HeldDirections,
}

/// Projectile state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectileSnapshot {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub position_x: f64,
    pub position_y: f64,
    pub velocity_x: f64,
    pub velocity_y: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_action_kind() {
        assert!(matches!(
            ClientMsg::parse(r#"{"id":"create_game"}"#),
            Ok(ClientMsg::CreateGame)
        ));

        match ClientMsg::parse(r#"{"id":"join_game","data":{"roomId":"r1","displayName":"alice"}}"#) {
            Ok(ClientMsg::JoinGame { data }) => {
                assert_eq!(data.room_id, "r1");
                assert_eq!(data.display_name, "alice");
            }
            other => panic!("unexpected {other:?}"),
        }

        let update = r#"{"id":"player_update_position","token":"t","data":
            {"up":true,"down":false,"left":false,"right":true,"cursorX":10.5,"cursorY":-3}}"#;
        match ClientMsg::parse(update) {
            Ok(ClientMsg::PlayerUpdatePosition { token, data }) => {
                assert_eq!(token.as_deref(), Some("t"));
                assert!(data.up && data.right && !data.down && !data.left);
                assert_eq!(data.cursor_x, 10.5);
                assert_eq!(data.cursor_y, -3.0);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            ClientMsg::parse(r#"{"id":"player_shoot_projectile"}"#),
            Ok(ClientMsg::PlayerShootProjectile { token: None })
        ));
    }

    #[test]
    fn rejects_unknown_kinds_and_bad_fields() {
        for text in [
            r#"{"id":"teleport"}"#,
            r#"{"data":{}}"#,
            r#"{"id":"join_game","data":{"roomId":"r1"}}"#,
            r#"{"id":"player_update_position","token":"t","data":{"up":"yes","down":false,"left":false,"right":false,"cursorX":0,"cursorY":0}}"#,
            r#"{"id":"player_update_position","token":"t","data":{"up":true,"down":false,"left":false,"right":false,"cursorX":0}}"#,
            "not json",
        ] {
            assert!(
                matches!(ClientMsg::parse(text), Err(GameError::InvalidInput(_))),
                "accepted {text}"
            );
        }
    }

    #[test]
    fn server_messages_are_tagged_by_id() {
        let room_id = Uuid::new_v4();
        let json = serde_json::to_value(ServerMsg::GameCreated { room_id }).unwrap();
        assert_eq!(json["id"], "game_created");
        assert_eq!(json["data"]["roomId"], room_id.to_string());

        let json = serde_json::to_value(ServerMsg::error(&GameError::RoomNotFound)).unwrap();
        assert_eq!(json["id"], "error");
        assert_eq!(json["data"]["code"], "room_not_found");
    }

    #[test]
    fn header_reads_kind_and_token_without_the_payload() {
        let header = ActionHeader::parse(
            r#"{"id":"player_update_position","token":"t","data":{"up":"not a bool"}}"#,
        )
        .unwrap();
        assert!(header.requires_credential());
        assert_eq!(header.token(), Some("t"));

        let header = ActionHeader::parse(r#"{"id":"player_shoot_projectile","token":42}"#).unwrap();
        assert!(header.requires_credential());
        assert_eq!(header.token(), None);

        let header = ActionHeader::parse(r#"{"id":"join_game","data":{}}"#).unwrap();
        assert!(!header.requires_credential());

        assert!(matches!(ActionHeader::parse(r#"{"data":{}}"#), Err(GameError::InvalidInput(_))));
        assert!(matches!(ActionHeader::parse("not json"), Err(GameError::InvalidInput(_))));
    }
}
