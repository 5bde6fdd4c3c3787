// Integration tests for the Home Assistant session over a real socket
//
// A local tokio-tungstenite server plays Home Assistant. The client runs its
// normal reconnecting session against it.

use futures::{SinkExt, StreamExt};
use keydeck::backend::{Backend, HomeAssistantClient, HomeAssistantConfig, SessionPhase};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type ServerSocket = WebSocketStream<TcpStream>;

async fn start_client() -> (TcpListener, Arc<HomeAssistantClient>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = HomeAssistantConfig {
        url: format!("ws://127.0.0.1:{port}/api/websocket"),
        token: "long-lived-token".to_string(),
        insecure: false,
        reconnect_delay_secs: 1,
    };
    let client = Arc::new(HomeAssistantClient::new("home", &config).unwrap());
    tokio::spawn(Arc::clone(&client).run());
    (listener, client)
}

async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("client did not connect")
        .unwrap();
    accept_async(stream).await.unwrap()
}

async fn send(ws: &mut ServerSocket, frame: Value) {
    ws.send(Message::Text(frame.to_string())).await.unwrap();
}

async fn recv(ws: &mut ServerSocket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no frame from client");
        match msg {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("connection ended: {other:?}"),
        }
    }
}

/// Server side of the handshake; returns the get_states request id
async fn handshake(ws: &mut ServerSocket) -> u64 {
    send(ws, json!({"type": "auth_required", "ha_version": "2024.5.0"})).await;
    assert_eq!(
        recv(ws).await,
        json!({"type": "auth", "access_token": "long-lived-token"})
    );
    send(ws, json!({"type": "auth_ok", "ha_version": "2024.5.0"})).await;

    let subscribe = recv(ws).await;
    assert_eq!(subscribe["type"], "subscribe_events");
    let get_states = recv(ws).await;
    assert_eq!(get_states["type"], "get_states");
    get_states["id"].as_u64().unwrap()
}

fn light(state: &str) -> Value {
    json!({
        "entity_id": "light.kitchen",
        "state": state,
        "attributes": {"friendly_name": "Kitchen"},
        "last_changed": "2024-05-01T10:00:00.000000+00:00",
        "last_reported": "2024-05-01T10:00:00.000000+00:00",
        "last_updated": "2024-05-01T10:00:00.000000+00:00",
        "context": {"id": "01HX", "parent_id": null, "user_id": null}
    })
}

async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

fn kitchen_state(client: &HomeAssistantClient) -> Option<String> {
    client
        .get_entity_info("light.kitchen")
        .map(|state| state.state.clone())
}

// ── handshake, initial states, events and service calls ─────────────────────

#[tokio::test]
async fn test_sync_and_call_service() {
    let (listener, client) = start_client().await;
    let mut ws = accept(&listener).await;

    let get_states_id = handshake(&mut ws).await;
    send(&mut ws, json!({"id": 1, "type": "result", "success": true, "result": null})).await;
    send(
        &mut ws,
        json!({"id": get_states_id, "type": "result", "success": true, "result": [light("on")]}),
    )
    .await;
    wait_for("initial states", || kitchen_state(&client).as_deref() == Some("on")).await;
    assert_eq!(client.phase(), SessionPhase::Synced);

    send(
        &mut ws,
        json!({
            "id": 1,
            "type": "event",
            "event": {
                "event_type": "state_changed",
                "data": {"entity_id": "light.kitchen", "new_state": light("off")}
            }
        }),
    )
    .await;
    wait_for("state change", || kitchen_state(&client).as_deref() == Some("off")).await;

    client.call_service("light", "turn_on", json!({}), json!({"entity_id": "light.kitchen"}));
    let call = recv(&mut ws).await;
    assert_eq!(call["type"], "call_service");
    assert_eq!(call["domain"], "light");
    assert_eq!(call["service"], "turn_on");
    assert_eq!(call["target"], json!({"entity_id": "light.kitchen"}));
    assert!(call["id"].as_u64().unwrap() > get_states_id);
}

// ── reconnect keeps the cache and redoes the handshake ──────────────────────

#[tokio::test]
async fn test_reconnect_after_server_close() {
    let (listener, client) = start_client().await;

    let mut ws = accept(&listener).await;
    let first_id = handshake(&mut ws).await;
    send(
        &mut ws,
        json!({"id": first_id, "type": "result", "success": true, "result": [light("on")]}),
    )
    .await;
    wait_for("initial states", || kitchen_state(&client).is_some()).await;

    ws.close(None).await.unwrap();
    drop(ws);
    wait_for("disconnect", || client.phase() == SessionPhase::Disconnected).await;
    assert_eq!(kitchen_state(&client).as_deref(), Some("on"));

    // Service calls while disconnected are dropped
    client.call_service("light", "turn_off", json!({}), json!({"entity_id": "light.kitchen"}));

    let mut ws = accept(&listener).await;
    let second_id = handshake(&mut ws).await;
    assert!(second_id > first_id);

    send(
        &mut ws,
        json!({"id": second_id, "type": "result", "success": true, "result": [light("off")]}),
    )
    .await;
    wait_for("fresh states", || kitchen_state(&client).as_deref() == Some("off")).await;
}

// ── server never answers: the client keeps retrying ─────────────────────────

#[tokio::test]
async fn test_retries_after_failed_connection() {
    let (listener, client) = start_client().await;

    // Refuse the first attempt by dropping the socket before the upgrade
    let (stream, _) = listener.accept().await.unwrap();
    drop(stream);

    let mut ws = accept(&listener).await;
    handshake(&mut ws).await;
    assert_eq!(client.phase(), SessionPhase::Subscribing);
}
