//! Session flow integration tests
//!
//! Tests the session mechanism end to end:
//! - Login, cookie and header credentials
//! - Logout and idle expiry
//! - Background sweeping and concurrent access

mod common;

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::time::Duration;

use authgate::auth::{SessionConfig, SessionRegistry};
use authgate::models::Identity;
use authgate::server::LoginResponse;
use common::*;
use reqwest::StatusCode;

fn short_lived(idle_timeout: Duration) -> SessionConfig {
    SessionConfig {
        idle_timeout,
        sweep_interval: Duration::from_millis(50),
    }
}

/// Test 1: Login sets a cookie that authenticates later requests
#[tokio::test]
async fn test_login_cookie_authenticates() {
    let (state, registry) = create_session_state(SessionConfig::default());
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let response = login(&client, addr, "alice", TEST_PASSWORD).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get("set-cookie")
        .expect("Missing Set-Cookie")
        .to_str()
        .unwrap()
        .to_string();
    let body: LoginResponse = response.json().await.unwrap();
    let handle = body.session_id.expect("Missing session_id");

    assert!(cookie.starts_with(&format!("session_id={};", handle)));
    assert!(cookie.contains("HttpOnly"));
    assert_eq!(body.user.username, "alice");
    assert_eq!(registry.len(), 1);

    let me = client
        .get(format!("http://{}/api/me", addr))
        .header("Cookie", format!("session_id={}", handle))
        .send()
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::OK);

    let identity: Identity = me.json().await.unwrap();
    assert_eq!(identity.user_id, "u1");
    assert_eq!(identity.role_name, "admin");
}

/// Test 2: Login by email and authenticate through the header
#[tokio::test]
async fn test_login_by_email_header_credential() {
    let (state, _) = create_session_state(SessionConfig::default());
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let body: LoginResponse = login(&client, addr, "bob@example.com", TEST_PASSWORD)
        .await
        .json()
        .await
        .unwrap();
    let handle = body.session_id.unwrap();

    let me = client
        .get(format!("http://{}/api/me", addr))
        .header("X-Session-ID", &handle)
        .send()
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::OK);
}

/// Test 3: Failed logins never create sessions
#[tokio::test]
async fn test_failed_logins() {
    let (state, registry) = create_session_state(SessionConfig::default());
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let wrong = login(&client, addr, "alice", "wrong password").await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let unknown = login(&client, addr, "mallory", TEST_PASSWORD).await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);

    let inactive = login(&client, addr, "carol", TEST_PASSWORD).await;
    assert_eq!(inactive.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = inactive.json().await.unwrap();
    assert_eq!(body["error"], "Account is inactive");

    assert!(registry.is_empty());
}

/// Test 4: Logout invalidates the session
#[tokio::test]
async fn test_logout_invalidates_session() {
    let (state, registry) = create_session_state(SessionConfig::default());
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let body: LoginResponse = login(&client, addr, "alice", TEST_PASSWORD)
        .await
        .json()
        .await
        .unwrap();
    let handle = body.session_id.unwrap();

    let logout = client
        .post(format!("http://{}/api/auth/logout", addr))
        .header("Cookie", format!("session_id={}", handle))
        .send()
        .await
        .unwrap();
    assert_eq!(logout.status(), StatusCode::OK);
    assert!(registry.is_empty());

    let me = client
        .get(format!("http://{}/api/me", addr))
        .header("Cookie", format!("session_id={}", handle))
        .send()
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = me.json().await.unwrap();
    assert_eq!(body["error"], "Invalid or expired session");
}

/// Test 5: An idle session expires
#[tokio::test]
async fn test_idle_session_expires() {
    let (state, registry) = create_session_state(short_lived(Duration::from_millis(200)));
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let body: LoginResponse = login(&client, addr, "alice", TEST_PASSWORD)
        .await
        .json()
        .await
        .unwrap();
    let handle = body.session_id.unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;

    let me = client
        .get(format!("http://{}/api/me", addr))
        .header("X-Session-ID", &handle)
        .send()
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);

    // Lazy expiry removed the record
    assert!(!registry.contains(&handle));
}

/// Test 6: Regular use keeps a session alive past the idle timeout
#[tokio::test]
async fn test_activity_extends_session() {
    let (state, _) = create_session_state(short_lived(Duration::from_millis(300)));
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();

    let body: LoginResponse = login(&client, addr, "alice", TEST_PASSWORD)
        .await
        .json()
        .await
        .unwrap();
    let handle = body.session_id.unwrap();

    for _ in 0..8 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let me = client
            .get(format!("http://{}/api/me", addr))
            .header("X-Session-ID", &handle)
            .send()
            .await
            .unwrap();
        assert_eq!(me.status(), StatusCode::OK);
    }
}

/// Test 7: The sweeper removes idle sessions that are never looked up
#[tokio::test]
async fn test_sweeper_removes_idle_sessions() {
    let registry = Arc::new(SessionRegistry::new(short_lived(Duration::from_millis(100))));
    let sweeper = registry.spawn_sweeper();

    let handle = registry.create(Identity::new("u1", "alice", "a@example.com", "r1", "admin"));
    assert!(registry.contains(&handle));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!registry.contains(&handle));
    assert!(registry.is_empty());

    sweeper.stop().await;
}

/// Test 8: Concurrent creates yield distinct handles
#[test]
fn test_concurrent_creates_are_unique() {
    const CALLERS: usize = 1000;

    let registry = Arc::new(SessionRegistry::with_defaults());
    let start = Barrier::new(CALLERS);

    let handles: Vec<String> = std::thread::scope(|scope| {
        let callers: Vec<_> = (0..CALLERS)
            .map(|i| {
                let registry = &registry;
                let start = &start;
                scope.spawn(move || {
                    start.wait();
                    registry.create(Identity::new(
                        format!("u{}", i),
                        "user",
                        "user@example.com",
                        "r",
                        "user",
                    ))
                })
            })
            .collect();

        callers.into_iter().map(|c| c.join().unwrap()).collect()
    });

    let unique: HashSet<&String> = handles.iter().collect();
    assert_eq!(handles.len(), CALLERS);
    assert_eq!(unique.len(), CALLERS);
    assert_eq!(registry.len(), CALLERS);
}

/// Test 9: A delete on one thread is visible to lookups on every other
#[test]
fn test_delete_visible_across_threads() {
    let registry = Arc::new(SessionRegistry::with_defaults());
    let handles: Vec<String> = (0..100)
        .map(|i| registry.create(Identity::new(format!("u{}", i), "u", "u@example.com", "r", "user")))
        .collect();

    std::thread::scope(|scope| {
        for chunk in handles.chunks(25) {
            let registry = &registry;
            scope.spawn(move || {
                for handle in chunk {
                    registry.delete(handle);
                }
            });
        }
    });

    std::thread::scope(|scope| {
        for chunk in handles.chunks(10) {
            let registry = &registry;
            scope.spawn(move || {
                for handle in chunk {
                    assert_eq!(registry.lookup(handle), None);
                }
            });
        }
    });
}

/// Test 10: Identity attributes round-trip through a session unchanged
#[test]
fn test_identity_preserved() {
    let registry = SessionRegistry::with_defaults();
    let identity = Identity::new("u1", "alice", "alice@example.com", "r1", "admin");

    let handle = registry.create(identity.clone());
    assert_eq!(registry.lookup(&handle), Some(identity));
    assert_eq!(registry.lookup("not-a-handle"), None);
}

/// Test 11: A changed password replaces the old one for later logins
#[tokio::test]
async fn test_change_password_flow() {
    let (state, _registry) = create_session_state(SessionConfig::default());
    let (addr, _shutdown) = run_test_server(state).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/api/auth/change-password", addr);

    let body: LoginResponse = login(&client, addr, "bob", TEST_PASSWORD)
        .await
        .json()
        .await
        .unwrap();
    let handle = body.session_id.expect("Missing session_id");

    let unauthenticated = client
        .post(&url)
        .json(&serde_json::json!({
            "current_password": TEST_PASSWORD,
            "new_password": "a brand new password"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);

    let too_short = client
        .post(&url)
        .header("Cookie", format!("session_id={}", handle))
        .json(&serde_json::json!({
            "current_password": TEST_PASSWORD,
            "new_password": "12345"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(too_short.status(), StatusCode::BAD_REQUEST);

    let wrong_current = client
        .post(&url)
        .header("Cookie", format!("session_id={}", handle))
        .json(&serde_json::json!({
            "current_password": "not my password",
            "new_password": "a brand new password"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_current.status(), StatusCode::UNAUTHORIZED);
    let error: serde_json::Value = wrong_current.json().await.unwrap();
    assert_eq!(error["error"], "Current password is incorrect");

    let changed = client
        .post(&url)
        .header("Cookie", format!("session_id={}", handle))
        .json(&serde_json::json!({
            "current_password": TEST_PASSWORD,
            "new_password": "a brand new password"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(changed.status(), StatusCode::OK);
    let message: serde_json::Value = changed.json().await.unwrap();
    assert_eq!(message["message"], "Password changed successfully");

    // The existing session survives the change
    let me = client
        .get(format!("http://{}/api/me", addr))
        .header("Cookie", format!("session_id={}", handle))
        .send()
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::OK);

    let old = login(&client, addr, "bob", TEST_PASSWORD).await;
    assert_eq!(old.status(), StatusCode::UNAUTHORIZED);

    let new = login(&client, addr, "bob", "a brand new password").await;
    assert_eq!(new.status(), StatusCode::OK);

    // Other accounts are untouched
    let alice = login(&client, addr, "alice", TEST_PASSWORD).await;
    assert_eq!(alice.status(), StatusCode::OK);
}

