//! WebSocket transport: wire protocol, connections, fan-out, socket sessions

pub mod broadcast;
pub mod connection;
pub mod handler;
pub mod protocol;

pub use broadcast::Broadcaster;
pub use connection::{Connection, ConnectionRegistry};
