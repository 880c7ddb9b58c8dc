//! WebSocket upgrade handler and per-socket session

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::game::state::{PlayerId, RoomId};
use crate::game::{GameError, LobbyManager};
use crate::ws::connection::{Connection, ConnectionRegistry};
use crate::ws::protocol::{ActionHeader, ClientMsg, ServerMsg};

/// Close code for a peer we are leaving (RFC 6455)
const CLOSE_GOING_AWAY: u16 = 1001;
/// Close code for policy violations and stalled consumers (RFC 6455)
const CLOSE_POLICY: u16 = 1008;
/// How long the writer may keep flushing after the reader has stopped
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Whether the reader should keep going after a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// State of one client socket: its outbound handle and the player it joined as
pub struct Session {
    conn: Arc<Connection>,
    current: Option<(RoomId, PlayerId)>,
}

impl Session {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self {
            conn,
            current: None,
        }
    }

    pub fn current(&self) -> Option<(RoomId, PlayerId)> {
        self.current
    }

    /// Decode and dispatch one text frame.
    ///
    /// Failures are reported to this client only. Invalid input and unknown
    /// rooms leave the socket open; a rejected credential closes it.
    pub fn handle_text(&mut self, lobby: &LobbyManager, text: &str) -> Flow {
        let Err(err) = self.dispatch(lobby, text) else {
            return Flow::Continue;
        };

        warn!(
            connection_id = %self.conn.id(),
            code = err.code(),
            error = %err,
            "Client action failed"
        );
        self.reply(&ServerMsg::error(&err));

        if err == GameError::Unauthorized {
            self.conn.close("unauthorized");
            Flow::Close
        } else {
            Flow::Continue
        }
    }

    fn dispatch(&mut self, lobby: &LobbyManager, text: &str) -> Result<(), GameError> {
        // Credential before payload: a forged token is never reported as bad input
        let header = ActionHeader::parse(text)?;
        let claims = if header.requires_credential() {
            Some(lobby.authorize(header.token())?)
        } else {
            None
        };

        match ClientMsg::parse(text)? {
            ClientMsg::CreateGame => {
                let room_id = lobby.create_room();
                self.reply(&ServerMsg::GameCreated { room_id });
                Ok(())
            }
            ClientMsg::JoinGame { data } => {
                // game_enter is queued by the lobby itself
                let outcome = lobby.join_room(&data.room_id, &data.display_name, self.conn.clone())?;

                // A socket plays one player at a time
                if let Some((room_id, player_id)) = self.current.replace((outcome.room_id, outcome.player_id)) {
                    lobby.leave_room(&room_id, &player_id);
                    lobby.connections().unregister_if(&player_id, &self.conn);
                }
                Ok(())
            }
            ClientMsg::PlayerUpdatePosition { data, .. } => {
                let claims = claims.ok_or(GameError::Unauthorized)?;
                lobby.update_intent_as(&claims, &data)
            }
            ClientMsg::PlayerShootProjectile { .. } => {
                let claims = claims.ok_or(GameError::Unauthorized)?;
                lobby.shoot_as(&claims);
                Ok(())
            }
        }
    }

    fn reply(&self, msg: &ServerMsg) {
        if let Err(e) = self.conn.send_msg(msg) {
            debug!(connection_id = %self.conn.id(), error = %e, "Reply dropped");
        }
    }

    /// Remove this socket's player from its room and the registry
    pub fn end(self, lobby: &LobbyManager, registry: &ConnectionRegistry) {
        if let Some((room_id, player_id)) = self.current {
            lobby.leave_room(&room_id, &player_id);
            registry.unregister_if(&player_id, &self.conn);
        }
    }
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (conn, outbound_rx) = Connection::new(state.config.outbound_buffer);
    let connection_id = conn.id();
    info!(connection_id = %connection_id, "New WebSocket connection");

    let (ws_sink, mut ws_stream) = socket.split();
    let mut writer = tokio::spawn(write_outbound(ws_sink, outbound_rx, conn.clone()));

    let mut session = Session::new(conn.clone());

    // Reader loop: WebSocket -> lobby, until the peer leaves or the server closes us
    loop {
        let result = tokio::select! {
            result = ws_stream.next() => result,
            reason = conn.closed() => {
                info!(connection_id = %connection_id, reason = %reason, "Closing connection");
                break;
            }
        };

        match result {
            Some(Ok(Message::Text(text))) => {
                if session.handle_text(&state.lobby, &text) == Flow::Close {
                    break;
                }
            }
            Some(Ok(Message::Binary(_))) => {
                warn!(connection_id = %connection_id, "Received binary message, ignoring");
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => {
                info!(connection_id = %connection_id, "Client closed connection");
                break;
            }
            Some(Err(e)) => {
                warn!(connection_id = %connection_id, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    session.end(&state.lobby, &state.connections);

    // Writer flushes what is queued, sends the close frame and stops
    conn.close("going away");
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        debug!(connection_id = %connection_id, "Writer did not drain in time");
        writer.abort();
    }

    info!(connection_id = %connection_id, "WebSocket connection closed");
}

/// Sole owner of the socket sink: writes queued frames one at a time, then a
/// close frame once the connection is closed
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<Arc<str>>,
    conn: Arc<Connection>,
) {
    let connection_id = conn.id();

    let reason = loop {
        tokio::select! {
            // Queued frames go out before the close frame
            biased;
            frame = outbound_rx.recv() => match frame {
                Some(json) => {
                    if let Err(e) = sink.send(Message::Text(json.to_string())).await {
                        debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
                        return;
                    }
                }
                None => break None,
            },
            reason = conn.closed() => break Some(reason),
        }
    };

    if let Some(reason) = reason {
        let frame = CloseFrame {
            code: close_code(&reason),
            reason: reason.into(),
        };
        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
            debug!(connection_id = %connection_id, error = %e, "Close frame not sent");
        }
    }

    if let Err(e) = sink.close().await {
        debug!(connection_id = %connection_id, error = %e, "Failed to close WebSocket sink");
    }
}

/// RFC 6455 close code for a close reason
fn close_code(reason: &str) -> u16 {
    match reason {
        "going away" => CLOSE_GOING_AWAY,
        _ => CLOSE_POLICY,
    }
}
