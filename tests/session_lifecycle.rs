//! End-to-end tests for the session SDK against a mock auth backend.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

use emr_sdk::{SessionClient, SessionConfig, SessionController};

/// Counters and switches shared with the mock backend handlers.
#[derive(Default)]
struct AuthBackend {
    session_expired: AtomicBool,
    activity_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

async fn start_auth_backend(state: Arc<AuthBackend>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let refresh_state = state.clone();
    let activity_state = state.clone();
    let logout_state = state;

    let app = Router::new()
        .route(
            "/api/auth/refresh-token",
            post(move || {
                let state = refresh_state.clone();
                async move {
                    if state.session_expired.load(Ordering::SeqCst) {
                        (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({"data": {"code": "SESSION_EXPIRED", "message": "Session expired"}})),
                        )
                            .into_response()
                    } else {
                        Json(json!({"data": {"expiresIn": 300}})).into_response()
                    }
                }
            }),
        )
        .route(
            "/api/auth/record-activity",
            post(move || {
                let state = activity_state.clone();
                async move {
                    state.activity_calls.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"data": {}}))
                }
            }),
        )
        .route(
            "/api/auth/logout",
            post(move || {
                let state = logout_state.clone();
                async move {
                    state.logout_calls.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"data": {}}))
                }
            }),
        );

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

fn fast_config() -> SessionConfig {
    SessionConfig {
        idle_timeout: Duration::from_secs(60),
        idle_check_interval: Duration::from_millis(50),
        refresh_interval: Duration::from_millis(200),
    }
}

#[tokio::test]
async fn test_refresh_envelope_roundtrip() {
    let backend = Arc::new(AuthBackend::default());
    let addr = start_auth_backend(backend.clone()).await;
    let client = SessionClient::new(&format!("http://{}", addr)).expect("client builds");

    let renewed = client.refresh_token().await.expect("refresh succeeds");
    assert_eq!(renewed.expires_in, 300);

    backend.session_expired.store(true, Ordering::SeqCst);
    let err = client.refresh_token().await.expect_err("refresh rejected");
    assert!(err.is_session_expired());
}

#[tokio::test]
async fn test_forced_logout_and_reauthentication() {
    let backend = Arc::new(AuthBackend::default());
    let addr = start_auth_backend(backend.clone()).await;
    let client = SessionClient::new(&format!("http://{}", addr)).expect("client builds");

    let controller = SessionController::start(Arc::new(client), fast_config(), "dr-jones");

    // A few refresh ticks succeed against the live backend.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!controller.is_expired());

    // The backend invalidates the session; the next refresh forces expiry.
    backend.session_expired.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(600)).await;
    let snapshot = controller.snapshot();
    assert!(snapshot.expired);
    assert!(snapshot.ui_frozen);
    assert!(snapshot.credential.is_none());

    // Re-authentication runs the logout handshake and unfreezes.
    backend.session_expired.store(false, Ordering::SeqCst);
    controller.reauthenticate("dr-jones").await;
    assert_eq!(backend.logout_calls.load(Ordering::SeqCst), 1);
    assert!(!controller.is_expired());

    controller.shutdown();
}

#[tokio::test]
async fn test_activity_heartbeat_reaches_backend() {
    let backend = Arc::new(AuthBackend::default());
    let addr = start_auth_backend(backend.clone()).await;
    let client = SessionClient::new(&format!("http://{}", addr)).expect("client builds");

    let controller = SessionController::start(Arc::new(client), fast_config(), "dr-jones");

    controller.record_activity();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(backend.activity_calls.load(Ordering::SeqCst) >= 1);
    assert!(!controller.is_expired());

    controller.shutdown();
}
