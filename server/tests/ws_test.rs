//! Integration tests for WebSocket connection, auth, ping/pong, and
//! registry cleanup.

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use opsdesk_server::state::AppState;

/// Helper: start the server on a random port and return (base_url, addr, state).
/// The state handle lets tests inspect the live connection registry.
async fn start_test_server() -> (String, SocketAddr, AppState) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = opsdesk_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = opsdesk_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");
    let registry = Arc::new(opsdesk_server::ws::ConnectionRegistry::new());

    let state = AppState {
        db,
        jwt_secret,
        registry,
    };

    let app = opsdesk_server::routes::build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    let base_url = format!("http://{}", addr);
    (base_url, addr, state)
}

/// Register a user and return (access_token, user_id).
async fn register_user(base_url: &str, username: &str, role: &str) -> (String, i64) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/auth/register", base_url))
        .json(&json!({
            "username": username,
            "password": "hunter2",
            "name": username,
            "role": role,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 201, "Registration failed for {}", username);
    let body: serde_json::Value = resp.json().await.unwrap();
    let access_token = body["access_token"].as_str().unwrap().to_string();
    let user_id = body["user_id"].as_i64().unwrap();

    (access_token, user_id)
}

#[tokio::test]
async fn test_ws_connection_with_valid_jwt() {
    let (base_url, addr, state) = start_test_server().await;
    let (access_token, user_id) = register_user(&base_url, "wsuser1", "technician").await;

    // Connect to WebSocket with valid JWT
    let ws_url = format!("ws://{}/ws/live?token={}", addr, access_token);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect to WebSocket");

    let (mut _write, mut read) = ws_stream.split();

    // The connection stays open and idle: no unsolicited messages
    let result = tokio::time::timeout(Duration::from_millis(500), read.next()).await;
    assert!(result.is_err(), "Expected idle connection, got message");

    assert_eq!(state.registry.count_for_user(user_id), 1);
}

#[tokio::test]
async fn test_ws_auth_failure_invalid_token() {
    let (_base_url, addr, state) = start_test_server().await;

    // Use a completely invalid token
    let ws_url = format!("ws://{}/ws/live?token=invalid_jwt_token", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("WebSocket should upgrade even with invalid token");

    let (mut _write, mut read) = ws_stream.split();

    // Server should immediately send a close frame with code 1008
    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected close message within timeout");

    match msg {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(
                frame.code,
                tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::from(1008),
                "Expected close code 1008 (policy violation)"
            );
        }
        Some(Ok(Message::Close(None))) => {
            // Close without frame — acceptable for invalid token
        }
        other => {
            if let Some(Ok(msg)) = other {
                assert!(msg.is_close(), "Expected close message, got: {:?}", msg);
            }
        }
    }

    // A refused handshake registers nothing
    assert_eq!(state.registry.total_count(), 0);
}

#[tokio::test]
async fn test_ws_ping_pong() {
    let (base_url, addr, _state) = start_test_server().await;
    let (access_token, _user_id) = register_user(&base_url, "pingpong", "technician").await;

    let ws_url = format!("ws://{}/ws/live?token={}", addr, access_token);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect");

    let (mut write, mut read) = ws_stream.split();

    // Send a client ping
    write
        .send(Message::Ping(vec![42, 43, 44].into()))
        .await
        .expect("Failed to send ping");

    // We should receive a pong back
    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected pong within timeout");

    match msg {
        Some(Ok(Message::Pong(data))) => {
            assert_eq!(data.as_ref(), &[42, 43, 44], "Pong data should match ping");
        }
        other => {
            panic!("Expected Pong message, got: {:?}", other);
        }
    }
}

#[tokio::test]
async fn test_ws_connection_cleanup_on_disconnect() {
    let (base_url, addr, state) = start_test_server().await;
    let (access_token, user_id) = register_user(&base_url, "cleanup", "technician").await;

    let ws_url = format!("ws://{}/ws/live?token={}", addr, access_token);

    // Connect and then immediately close
    {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .expect("Failed to connect");

        let (mut write, _read) = ws_stream.split();

        // Send close frame
        write
            .send(Message::Close(None))
            .await
            .expect("Failed to send close");
    }

    // Give the server a moment to clean up
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The registry entry is gone once the actor stops
    assert_eq!(state.registry.count_for_user(user_id), 0);
    assert_eq!(state.registry.total_count(), 0);

    // Reconnect should work fine (connection was cleaned up)
    let (ws_stream2, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to reconnect after cleanup");

    let (mut _write2, mut read2) = ws_stream2.split();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.registry.count_for_user(user_id), 1);

    // Connection should be alive with no unsolicited messages
    let result = tokio::time::timeout(Duration::from_millis(300), read2.next()).await;
    assert!(result.is_err(), "Expected idle connection after reconnect");
}

#[tokio::test]
async fn test_ws_multiple_connections_per_user() {
    let (base_url, addr, state) = start_test_server().await;
    let (access_token, user_id) = register_user(&base_url, "twotabs", "technician").await;

    let ws_url = format!("ws://{}/ws/live?token={}", addr, access_token);

    let (tab_a, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    let (tab_b, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.registry.count_for_user(user_id), 2);

    // Closing one tab leaves the sibling registered
    let (mut write_a, _read_a) = tab_a.split();
    write_a.send(Message::Close(None)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(state.registry.count_for_user(user_id), 1);
    drop(tab_b);
}
