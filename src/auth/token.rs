//! Signed identity tokens
//!
//! Stateless alternative to the session registry. A token carries the
//! identity snapshot plus `iat`/`exp`/`iss`/`sub` claims and is signed with
//! HMAC-SHA256. There is no server-side record, so a token cannot be revoked
//! before it expires.

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::models::Identity;

/// Lifetime of an issued token
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Longest lifetime a codec will issue
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Value of the `iss` claim
pub const DEFAULT_ISSUER: &str = "playtz-api";

/// Environment variable holding the signing secret
pub const SECRET_ENV_VAR: &str = "JWT_SECRET";

/// Signing secret used when `JWT_SECRET` is unset
///
/// INSECURE: this value is public. It exists so development setups and tests
/// produce reproducible tokens; production deployments must set `JWT_SECRET`.
pub const DEV_FALLBACK_SECRET: &str = "your-secret-key-change-in-production";

const BEARER_PREFIX: &str = "Bearer ";

static SIGNING_SECRET: OnceLock<Vec<u8>> = OnceLock::new();

/// Claims embedded in every token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(flatten)]
    pub identity: Identity,

    /// Issued at (Unix seconds)
    pub iat: i64,

    /// Expires at (Unix seconds)
    pub exp: i64,

    pub iss: String,

    /// Always the user id
    pub sub: String,
}

impl Claims {
    /// Build claims for `identity` valid for `ttl` from `issued_at`
    pub fn new(identity: &Identity, issued_at: DateTime<Utc>, ttl: Duration, issuer: &str) -> Self {
        let iat = issued_at.timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        Self {
            identity: identity.clone(),
            iat,
            exp: iat.saturating_add(ttl_secs),
            iss: issuer.to_string(),
            sub: identity.user_id.clone(),
        }
    }

    /// Expiry as a timestamp
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

/// Issues and validates HMAC-signed identity tokens
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    issuer: String,
}

impl TokenCodec {
    /// Create a codec with the default 24 hour lifetime and issuer
    pub fn new(secret: &[u8]) -> Self {
        Self::with_settings(secret, DEFAULT_TOKEN_TTL, DEFAULT_ISSUER)
    }

    /// Create a codec with an explicit lifetime and issuer
    ///
    /// `ttl` is capped at [`MAX_TOKEN_TTL`].
    pub fn with_settings(secret: &[u8], ttl: Duration, issuer: impl Into<String>) -> Self {
        // Any HMAC variant is accepted; other families are rejected by
        // jsonwebtoken before the signature is checked.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl: ttl.min(MAX_TOKEN_TTL),
            issuer: issuer.into(),
        }
    }

    /// Create a codec keyed by the process-wide secret from `JWT_SECRET`
    pub fn from_env() -> Self {
        Self::new(signing_secret())
    }

    /// Token lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `identity`, valid from now
    pub fn issue(&self, identity: &Identity) -> Result<String, AuthError> {
        let claims = Claims::new(identity, Utc::now(), self.ttl, &self.issuer);
        self.encode_claims(&claims)
    }

    /// Sign arbitrary claims with HS256
    pub fn encode_claims(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verify a token and return its claims
    ///
    /// Every failure maps to [`AuthError::InvalidToken`]; the cause is only
    /// logged at debug level.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Token rejected");
                AuthError::InvalidToken
            })
    }
}

/// Process-wide signing secret
///
/// Read from `JWT_SECRET` on first call and cached for the life of the
/// process. Falls back to [`DEV_FALLBACK_SECRET`] when unset or empty.
pub fn signing_secret() -> &'static [u8] {
    SIGNING_SECRET.get_or_init(|| match std::env::var(SECRET_ENV_VAR) {
        Ok(secret) if !secret.is_empty() => secret.into_bytes(),
        _ => {
            warn!(
                env = SECRET_ENV_VAR,
                "Signing secret not set, using the insecure development key"
            );
            DEV_FALLBACK_SECRET.as_bytes().to_vec()
        }
    })
}

/// Return the token part of an `Authorization: Bearer <token>` value
///
/// Returns an empty string when the prefix is missing or nothing follows it.
pub fn extract_from_header(header_value: &str) -> &str {
    header_value.strip_prefix(BEARER_PREFIX).unwrap_or("")
}
