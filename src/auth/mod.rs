//! Session credential issuance and verification

pub mod token;

pub use token::{AuthError, CredentialService, SessionClaims, TokenService};
