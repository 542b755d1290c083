//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use authgate::auth::{hash_password, SessionConfig, SessionRegistry, StaticCredentials, TokenCodec};
use authgate::config::{SessionSettings, UserAccount};
use authgate::server::AppState;

/// Password shared by every test account
pub const TEST_PASSWORD: &str = "correct horse battery staple";

/// Signing secret for token-mode tests
pub const TEST_SECRET: &[u8] = b"integration-test-secret";

/// Argon2 hash of [`TEST_PASSWORD`], computed once per test binary
pub fn test_password_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password(TEST_PASSWORD).expect("Failed to hash test password"))
        .clone()
}

/// Build a test account
pub fn test_account(id: &str, username: &str, role_name: &str, active: bool) -> UserAccount {
    UserAccount {
        id: id.to_string(),
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password_hash: test_password_hash(),
        role_id: format!("role-{}", role_name),
        role_name: role_name.to_string(),
        active,
    }
}

/// alice (admin), bob (user) and carol (inactive editor)
pub fn create_test_credentials() -> Arc<StaticCredentials> {
    Arc::new(StaticCredentials::new(vec![
        test_account("u1", "alice", "admin", true),
        test_account("u2", "bob", "user", true),
        test_account("u3", "carol", "editor", false),
    ]))
}

/// Session settings with the given idle timeout and same-site cookies
pub fn create_test_session_settings(idle_timeout: Duration) -> SessionSettings {
    SessionSettings {
        idle_timeout_secs: idle_timeout.as_secs().max(1),
        sweep_interval_secs: 1,
        cross_site: false,
        ..Default::default()
    }
}

/// Create a session-mode application state and its registry
pub fn create_session_state(config: SessionConfig) -> (AppState, Arc<SessionRegistry>) {
    let settings = create_test_session_settings(config.idle_timeout);
    let registry = Arc::new(SessionRegistry::new(config));
    let state = AppState::with_sessions(registry.clone(), settings, create_test_credentials());
    (state, registry)
}

/// Create a token-mode application state and its codec
pub fn create_token_state() -> (AppState, Arc<TokenCodec>) {
    let codec = Arc::new(TokenCodec::new(TEST_SECRET));
    let state = AppState::with_tokens(
        codec.clone(),
        SessionSettings::default(),
        create_test_credentials(),
    );
    (state, codec)
}

/// Run a test server in the background and return the address
/// The server will be shut down when the returned shutdown sender is dropped or sent
pub async fn run_test_server(
    state: AppState,
) -> (std::net::SocketAddr, tokio::sync::oneshot::Sender<()>) {
    use tokio::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let app = authgate::server::build_router(state)
        .layer(tower_http::trace::TraceLayer::new_for_http());

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    (addr, shutdown_tx)
}

/// Log in and return the response body
pub async fn login(
    client: &reqwest::Client,
    addr: std::net::SocketAddr,
    username: &str,
    password: &str,
) -> reqwest::Response {
    client
        .post(format!("http://{}/api/auth/login", addr))
        .json(&serde_json::json!({
            "username": username,
            "password": password
        }))
        .send()
        .await
        .expect("Login request failed")
}
