//! HTTP router for authgate
//!
//! This module defines the axum router that handles all HTTP requests.
//! It provides routes for:
//! - Health checks
//! - Login, logout and current-user lookup
//! - Protected API endpoints behind the authorization and role gates

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::middleware::{
    logging_middleware, optional_auth, require_auth, require_role, AuthGate, AuthResponse,
    AuthenticatedUser, RoleGate,
};
use crate::auth::{redact, CredentialVerifier, SessionRegistry, TokenCodec};
use crate::config::SessionSettings;
use crate::error::AppError;
use crate::models::Identity;

/// Roles allowed through `/api/admin`
pub const ADMIN_ROLES: &[&str] = &["admin"];

/// Shortest accepted new password, in characters
pub const MIN_PASSWORD_LEN: usize = 6;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Active authorization gate (session or token)
    pub gate: AuthGate,

    /// Login credential check
    pub verifier: Arc<dyn CredentialVerifier>,

    /// Cookie naming and attributes
    pub session: SessionSettings,
}

impl AppState {
    /// State for session-handle authentication
    pub fn with_sessions(
        registry: Arc<SessionRegistry>,
        settings: SessionSettings,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            gate: AuthGate::session(registry, &settings),
            verifier,
            session: settings,
        }
    }

    /// State for signed-token authentication
    pub fn with_tokens(
        codec: Arc<TokenCodec>,
        settings: SessionSettings,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            gate: AuthGate::token(codec),
            verifier,
            session: settings,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Login request body
#[derive(Debug, Default, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

/// Login response body
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Token lifetime in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    pub user: Identity,
}

/// Password change request body
#[derive(Debug, Default, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,

    #[serde(default)]
    pub new_password: String,
}

/// Build the main application router
///
/// # Arguments
///
/// * `state` - Application state containing the gate and credential verifier
///
/// # Returns
///
/// An axum Router configured with all endpoints
pub fn build_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/api/admin/ping", get(admin_ping_handler))
        .layer(middleware::from_fn_with_state(
            RoleGate::new(ADMIN_ROLES.iter().copied()),
            require_role,
        ));

    let protected = Router::new()
        .route("/api/me", get(me_handler))
        .route("/api/auth/change-password", post(change_password_handler))
        .merge(admin)
        .layer(middleware::from_fn_with_state(
            state.gate.clone(),
            require_auth,
        ));

    let optional = Router::new()
        .route("/api/auth/me", get(current_user_handler))
        .layer(middleware::from_fn_with_state(
            state.gate.clone(),
            optional_auth,
        ));

    Router::new()
        // Health endpoint (no auth required)
        .route("/health", get(health_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler))
        .merge(optional)
        .merge(protected)
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}

/// Health check endpoint handler
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Login endpoint handler
///
/// Verifies the credentials, then either opens a session (setting the
/// session cookie) or issues a signed token, depending on the active gate.
async fn login_handler(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = match body {
        Ok(Json(request)) if !request.username.is_empty() && !request.password.is_empty() => {
            request
        }
        _ => {
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "Username and password are required"
                })),
            )
                .into_response())
        }
    };

    let identity = state
        .verifier
        .verify(&request.username, &request.password)
        .await
        .map_err(|e| {
            tracing::info!(login = %request.username, error = %e, "Login rejected");
            e
        })?;

    let response = match &state.gate {
        AuthGate::Session { registry, .. } => {
            let handle = registry.create(identity.clone());
            tracing::info!(
                user_id = %identity.user_id,
                session = %redact(&handle),
                "Login successful"
            );

            let cookie = session_cookie(&state.session, &handle)?;
            let body = LoginResponse {
                success: true,
                message: "Login successful".to_string(),
                session_id: Some(handle),
                token: None,
                expires_in: None,
                user: identity,
            };
            ([(header::SET_COOKIE, cookie)], Json(body)).into_response()
        }
        AuthGate::Token { codec } => {
            let token = codec.issue(&identity)?;
            tracing::info!(user_id = %identity.user_id, "Login successful, token issued");

            Json(LoginResponse {
                success: true,
                message: "Login successful".to_string(),
                session_id: None,
                token: Some(token),
                expires_in: Some(codec.ttl().as_secs()),
                user: identity,
            })
            .into_response()
        }
    };

    Ok(response)
}

/// Logout endpoint handler
///
/// Always succeeds. In session mode the presented session is deleted and the
/// cookie cleared; tokens cannot be revoked.
async fn logout_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    let body = Json(serde_json::json!({
        "message": "Logged out successfully",
        "success": true
    }));

    match &state.gate {
        AuthGate::Session { registry, .. } => {
            if let Some(handle) = state.gate.credential(&headers) {
                registry.delete(handle);
                tracing::info!(session = %redact(handle), "Logged out");
            }
            let cookie = clear_session_cookie(&state.session)?;
            Ok(([(header::SET_COOKIE, cookie)], body).into_response())
        }
        AuthGate::Token { .. } => Ok(body.into_response()),
    }
}

/// Change the caller's password
async fn change_password_handler(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    body: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let request = match body {
        Ok(Json(request))
            if !request.current_password.is_empty()
                && request.new_password.chars().count() >= MIN_PASSWORD_LEN =>
        {
            request
        }
        _ => {
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "Current password and new password (min 6 characters) are required"
                })),
            )
                .into_response())
        }
    };

    state
        .verifier
        .change_password(
            &identity.user_id,
            &request.current_password,
            &request.new_password,
        )
        .await
        .map_err(|e| {
            tracing::info!(user_id = %identity.user_id, error = %e, "Password change rejected");
            e
        })?;

    Ok(Json(serde_json::json!({
        "message": "Password changed successfully"
    }))
    .into_response())
}

/// Current user, or `authenticated: false` when the request is anonymous
async fn current_user_handler(user: Option<AuthenticatedUser>) -> impl IntoResponse {
    match user {
        Some(AuthenticatedUser(identity)) => Json(serde_json::json!({
            "authenticated": true,
            "user": identity
        })),
        None => Json(serde_json::json!({
            "authenticated": false,
            "user": null
        })),
    }
}

/// Current user (authentication required)
async fn me_handler(AuthenticatedUser(identity): AuthenticatedUser) -> impl IntoResponse {
    Json(identity)
}

/// Admin-only liveness check
async fn admin_ping_handler(AuthenticatedUser(identity): AuthenticatedUser) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "user_id": identity.user_id
    }))
}

/// `Set-Cookie` value carrying a new session handle
pub fn session_cookie(settings: &SessionSettings, handle: &str) -> Result<HeaderValue, AppError> {
    cookie_value(settings, handle, settings.idle_timeout_secs)
}

/// `Set-Cookie` value that expires the session cookie
pub fn clear_session_cookie(settings: &SessionSettings) -> Result<HeaderValue, AppError> {
    cookie_value(settings, "", 0)
}

fn cookie_value(settings: &SessionSettings, value: &str, max_age: u64) -> Result<HeaderValue, AppError> {
    let cross_site = if settings.cross_site {
        "; Secure; SameSite=None"
    } else {
        ""
    };
    let cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly{}",
        settings.cookie_name, value, max_age, cross_site
    );

    HeaderValue::from_str(&cookie).map_err(|e| AppError::Internal(format!("Invalid cookie: {}", e)))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Auth(e) => AuthResponse::from_error(e).into_response(),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({
                        "error": "Internal server error"
                    })),
                )
                    .into_response()
            }
        }
    }
}
