//! HTTP surface: health check, origin guard and the WebSocket upgrade route

pub mod middleware;
pub mod routes;

pub use routes::build_router;
