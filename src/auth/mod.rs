//! Authentication system for authgate
//!
//! This module provides:
//! - An in-process session registry with sliding idle expiry
//! - Stateless HMAC-signed identity tokens
//! - Credential verification for the login endpoint

pub mod credentials;
pub mod session;
pub mod token;

pub use credentials::{hash_password, verify_password, CredentialVerifier, StaticCredentials};
#[cfg(test)]
pub use credentials::MockCredentialVerifier;
pub use session::{SessionConfig, SessionRegistry, SweeperHandle};
pub use token::{extract_from_header, signing_secret, Claims, TokenCodec};

/// Shorten a credential for log output
pub(crate) fn redact(secret: &str) -> &str {
    let mut end = secret.len().min(8);
    while !secret.is_char_boundary(end) {
        end -= 1;
    }
    &secret[..end]
}
