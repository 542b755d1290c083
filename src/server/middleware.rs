//! HTTP middleware for authgate
//!
//! This module provides middleware layers for:
//! - Authentication (session handle or signed token)
//! - Role checks on authenticated requests
//! - Request/response logging

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use std::time::Instant;

use crate::auth::{extract_from_header, redact, SessionRegistry, TokenCodec};
use crate::config::SessionSettings;
use crate::error::AuthError;
use crate::models::Identity;

/// Resolves the credential carried by a request to an identity
#[derive(Clone)]
pub enum AuthGate {
    /// Opaque handle from a cookie, falling back to a header
    Session {
        registry: Arc<SessionRegistry>,
        cookie_name: String,
        header_name: String,
    },

    /// `Authorization: Bearer <token>`
    Token { codec: Arc<TokenCodec> },
}

impl AuthGate {
    /// Gate backed by the session registry
    pub fn session(registry: Arc<SessionRegistry>, settings: &SessionSettings) -> Self {
        Self::Session {
            registry,
            cookie_name: settings.cookie_name.clone(),
            header_name: settings.header_name.clone(),
        }
    }

    /// Gate backed by the token codec
    pub fn token(codec: Arc<TokenCodec>) -> Self {
        Self::Token { codec }
    }

    /// Raw credential presented by the request, if any
    ///
    /// Empty values count as absent.
    pub fn credential<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        match self {
            Self::Session {
                cookie_name,
                header_name,
                ..
            } => read_cookie(headers, cookie_name)
                .filter(|v| !v.is_empty())
                .or_else(|| {
                    headers
                        .get(header_name.as_str())
                        .and_then(|v| v.to_str().ok())
                        .filter(|v| !v.is_empty())
                }),
            Self::Token { .. } => headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(extract_from_header)
                .filter(|v| !v.is_empty()),
        }
    }

    /// Resolve the request's credential to an identity
    pub fn resolve(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let credential = self
            .credential(headers)
            .ok_or(AuthError::MissingCredential)?;

        match self {
            Self::Session { registry, .. } => registry.lookup(credential).ok_or_else(|| {
                tracing::debug!(handle = %redact(credential), "Unknown or expired session");
                AuthError::InvalidSession
            }),
            Self::Token { codec } => codec.validate(credential).map(|claims| claims.identity),
        }
    }
}

/// Identity attached to an authenticated request
#[derive(Clone, Debug, PartialEq)]
pub struct AuthenticatedUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthResponse;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| AuthResponse::from_error(AuthError::MissingCredential))
    }
}

/// Authentication middleware function
///
/// This middleware:
/// 1. Reads the credential (cookie/header or bearer token)
/// 2. Rejects with 401 when it is missing or does not resolve
/// 3. Adds the authenticated user to the request extensions
pub async fn require_auth(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthResponse> {
    let identity = gate.resolve(request.headers()).map_err(|e| {
        tracing::debug!(path = %request.uri().path(), error = %e, "Request rejected");
        AuthResponse::from_error(e)
    })?;

    request.extensions_mut().insert(AuthenticatedUser(identity));

    Ok(next.run(request).await)
}

/// Like [`require_auth`] but never rejects
///
/// The user is attached when the credential resolves; otherwise the request
/// continues anonymously.
pub async fn optional_auth(State(gate): State<AuthGate>, mut request: Request, next: Next) -> Response {
    if let Ok(identity) = gate.resolve(request.headers()) {
        request.extensions_mut().insert(AuthenticatedUser(identity));
    }

    next.run(request).await
}

/// Allowed role names for a route group
#[derive(Clone, Debug)]
pub struct RoleGate {
    allowed: Arc<[String]>,
}

impl RoleGate {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Check an optional identity against the allowed roles
    pub fn check(&self, identity: Option<&Identity>) -> Result<(), AuthError> {
        let identity = identity.ok_or(AuthError::AccessDenied)?;
        if identity.has_any_role(&self.allowed[..]) {
            Ok(())
        } else {
            Err(AuthError::InsufficientRole)
        }
    }
}

/// Role middleware function
///
/// Must be layered inside [`require_auth`].
pub async fn require_role(
    State(roles): State<RoleGate>,
    request: Request,
    next: Next,
) -> Result<Response, AuthResponse> {
    let identity = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|user| &user.0);

    roles.check(identity).map_err(|e| {
        tracing::debug!(
            path = %request.uri().path(),
            role = identity.map(|i| i.role_name.as_str()).unwrap_or(""),
            "Role check failed"
        );
        AuthResponse::from_error(e)
    })?;

    Ok(next.run(request).await)
}

/// Value of the cookie `name`, if present
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then_some(value)
        })
}

/// Authentication error response
#[derive(Debug)]
pub struct AuthResponse {
    status: StatusCode,
    message: String,
}

impl AuthResponse {
    pub fn from_error(error: AuthError) -> Self {
        let status = match error {
            AuthError::MissingCredential
            | AuthError::InvalidSession
            | AuthError::InvalidToken
            | AuthError::InvalidCredentials
            | AuthError::IncorrectPassword => StatusCode::UNAUTHORIZED,
            AuthError::AccountInactive
            | AuthError::AccessDenied
            | AuthError::InsufficientRole => StatusCode::FORBIDDEN,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Signing(_) | AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if error.is_internal() {
            tracing::error!(error = %error, "Authentication failed internally");
            "Internal server error".to_string()
        } else {
            error.to_string()
        };

        Self { status, message }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for AuthResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({
                "error": self.message
            })),
        )
            .into_response()
    }
}

/// Logging middleware function
///
/// Logs request and response details including:
/// - Method and path
/// - Status code
/// - Response time
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        path = %uri.path(),
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "Request completed"
    );

    response
}
