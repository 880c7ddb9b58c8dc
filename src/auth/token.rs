//! Session credentials: HS256-signed JWTs binding a player to a room

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "HS256";

/// Claims carried by a session credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub player_id: Uuid,
    pub room_id: Uuid,
    pub display_name: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

/// Issues and verifies session credentials.
///
/// The core only relies on this contract; callers never learn why a
/// credential was rejected beyond the error variant.
pub trait CredentialService: Send + Sync {
    fn issue(&self, player_id: Uuid, room_id: Uuid, display_name: &str)
        -> Result<String, AuthError>;

    fn verify(&self, token: &str) -> Result<SessionClaims, AuthError>;
}

/// HMAC-SHA256 JWT implementation of [`CredentialService`]
pub struct TokenService {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl,
        }
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| AuthError::Signing)
    }

    fn sign(&self, claims: &SessionClaims) -> Result<String, AuthError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        let header_json = serde_json::to_vec(&header).map_err(|_| AuthError::Signing)?;
        let payload_json = serde_json::to_vec(claims).map_err(|_| AuthError::Signing)?;

        let message = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(payload_json)
        );

        let mut mac = self.mac()?;
        mac.update(message.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", message, signature))
    }

    fn verify_at(&self, token: &str, now: u64) -> Result<SessionClaims, AuthError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(AuthError::InvalidToken);
        }

        let header_b64 = parts[0];
        let payload_b64 = parts[1];
        let signature_b64 = parts[2];

        // Reject anything not signed the way we sign before touching the MAC
        let header_json = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| AuthError::InvalidToken)?;
        let header: Header =
            serde_json::from_slice(&header_json).map_err(|_| AuthError::InvalidToken)?;
        if header.alg != ALGORITHM {
            return Err(AuthError::UnsupportedAlgorithm(header.alg));
        }

        let message = format!("{}.{}", header_b64, payload_b64);
        let provided_signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AuthError::InvalidToken)?;

        let mut mac = self.mac()?;
        mac.update(message.as_bytes());
        mac.verify_slice(&provided_signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let payload_json = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AuthError::InvalidToken)?;
        let claims: SessionClaims =
            serde_json::from_slice(&payload_json).map_err(|_| AuthError::InvalidToken)?;

        if claims.exp < now {
            return Err(AuthError::TokenExpired);
        }

        Ok(claims)
    }
}

impl CredentialService for TokenService {
    fn issue(
        &self,
        player_id: Uuid,
        room_id: Uuid,
        display_name: &str,
    ) -> Result<String, AuthError> {
        if display_name.is_empty() {
            return Err(AuthError::Signing);
        }

        let now = unix_secs();
        let claims = SessionClaims {
            player_id,
            room_id,
            display_name: display_name.to_string(),
            exp: now + self.ttl.as_secs(),
            iat: now,
        };
        self.sign(&claims)
    }

    fn verify(&self, token: &str) -> Result<SessionClaims, AuthError> {
        self.verify_at(token, unix_secs())
    }
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Credential error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Failed to sign token")]
    Signing,
}
