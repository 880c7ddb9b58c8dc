//! Origin allow-list for the WebSocket upgrade

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::app::AppState;

#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("Missing Origin header")]
    Missing,

    #[error("Origin not allowed")]
    NotAllowed,
}

impl IntoResponse for OriginError {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, self.to_string()).into_response()
    }
}

/// Reject the request unless its Origin exactly matches a configured client origin.
/// A request without an Origin header is rejected too.
pub async fn require_allowed_origin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, OriginError> {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            warn!("Rejected WebSocket upgrade without an Origin header");
            OriginError::Missing
        })?;

    if !is_allowed(&state.config.client_origins, origin) {
        warn!(origin = %origin, "Rejected WebSocket upgrade from disallowed origin");
        return Err(OriginError::NotAllowed);
    }

    Ok(next.run(request).await)
}

fn is_allowed(allowed: &[String], origin: &str) -> bool {
    allowed.iter().any(|candidate| candidate == origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exact_matches_are_allowed() {
        let allowed = vec![
            "http://localhost:8080".to_string(),
            "http://localhost:3000".to_string(),
        ];

        assert!(is_allowed(&allowed, "http://localhost:3000"));
        assert!(!is_allowed(&allowed, "http://localhost:3000/"));
        assert!(!is_allowed(&allowed, "https://localhost:3000"));
        assert!(!is_allowed(&allowed, "http://localhost"));
        assert!(!is_allowed(&[], "http://localhost:3000"));
    }
}
