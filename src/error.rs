//! Application error types for authgate
//!
//! This module defines common error types used throughout the application.
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Authentication and authorization errors
///
/// The `Display` text of the credential variants is exactly what clients see
/// in the `{"error": ...}` body, so verification failures never reveal which
/// sub-check failed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AuthError {
    /// No session cookie, session header or bearer token was supplied
    #[error("Authentication required")]
    MissingCredential,

    /// Session handle unknown or expired
    #[error("Invalid or expired session")]
    InvalidSession,

    /// Token signature, algorithm, expiry or structure check failed
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Login rejected: unknown user or wrong password
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Login rejected: the account exists but is disabled
    #[error("Account is inactive")]
    AccountInactive,

    /// Role gate ran without an authenticated identity
    #[error("Access denied")]
    AccessDenied,

    /// Role gate rejected the identity's role
    #[error("Insufficient permissions")]
    InsufficientRole,

    /// Password change rejected: the current password did not verify
    #[error("Current password is incorrect")]
    IncorrectPassword,

    /// Authenticated identity no longer has an account
    #[error("User not found")]
    UserNotFound,

    /// Signing a token failed
    #[error("Token signing failed: {0}")]
    Signing(String),

    /// Credential store failure
    #[error("Credential store error: {0}")]
    Store(String),
}

impl AuthError {
    /// Returns true for failures caused by the server rather than the caller
    pub fn is_internal(&self) -> bool {
        matches!(self, AuthError::Signing(_) | AuthError::Store(_))
    }
}

/// Application-level error type
///
/// Aggregates the domain-specific error types.
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication error
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
