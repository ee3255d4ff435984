//! Integration tests for room fan-out through the HTTP ingress and the
//! room socket relay.

mod common;

use common::{TestClient, TestServer, token};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_deleted_event_reaches_room_only() {
    let server = TestServer::spawn(17301).await.expect("Failed to spawn test server");
    let base = server.ws_url();
    let mut a = TestClient::room(&base, 3, &token(1, "a")).await.unwrap();
    let mut b = TestClient::room(&base, 3, &token(2, "b")).await.unwrap();
    let mut other = TestClient::room(&base, 4, &token(3, "c")).await.unwrap();
    server
        .wait_for("/stats", |s| s["roomConnections"] == 3)
        .await
        .unwrap();

    let event = json!({
        "type": "deleted",
        "clientId": "abc",
        "senderId": 7,
        "senderName": "alice",
        "content": "alice retracted a message"
    });
    assert_eq!(server.post("/broadcast/rooms/3", &event).await.unwrap(), 202);

    for client in [&mut a, &mut b] {
        let got = client.recv().await.unwrap();
        assert_eq!(got["type"], "deleted");
        assert_eq!(got["clientId"], "abc");
        assert_eq!(got["roomId"], 3);
    }
    assert!(other.is_silent_for(Duration::from_millis(300)).await);
}

#[tokio::test]
async fn test_closed_room_connection_is_deregistered() {
    let server = TestServer::spawn(17303).await.expect("Failed to spawn test server");
    let base = server.ws_url();
    let mut live = TestClient::room(&base, 3, &token(1, "a")).await.unwrap();
    let gone = TestClient::room(&base, 3, &token(2, "b")).await.unwrap();
    server
        .wait_for("/rooms/3", |r| r["connections"] == 2)
        .await
        .unwrap();

    gone.close().await.unwrap();
    server
        .wait_for("/rooms/3", |r| r["connections"] == 1)
        .await
        .unwrap();

    let event = json!({"type": "message", "clientId": "m1", "senderId": 1, "senderName": "a", "content": "hi"});
    assert_eq!(server.post("/broadcast/rooms/3", &event).await.unwrap(), 202);
    assert_eq!(live.recv().await.unwrap()["content"], "hi");
}

#[tokio::test]
async fn test_messages_arrive_in_dispatch_order() {
    let server = TestServer::spawn(17305).await.expect("Failed to spawn test server");
    let mut client = TestClient::room(&server.ws_url(), 9, &token(1, "a")).await.unwrap();
    server
        .wait_for("/rooms/9", |r| r["connections"] == 1)
        .await
        .unwrap();

    for n in 0..10 {
        let event = json!({"type": "message", "clientId": format!("c{n}"), "content": n.to_string()});
        assert_eq!(server.post("/broadcast/rooms/9", &event).await.unwrap(), 202);
    }
    for n in 0..10 {
        assert_eq!(client.recv().await.unwrap()["clientId"], format!("c{n}"));
    }
}

#[tokio::test]
async fn test_global_delete_reaches_notify_and_every_room() {
    let server = TestServer::spawn(17307).await.expect("Failed to spawn test server");
    let base = server.ws_url();
    let mut notify = TestClient::notify(&base, &token(1, "a")).await.unwrap();
    let mut room3 = TestClient::room(&base, 3, &token(2, "b")).await.unwrap();
    let mut room4 = TestClient::room(&base, 4, &token(3, "c")).await.unwrap();
    server
        .wait_for("/stats", |s| s["roomConnections"] == 2 && s["notifyConnections"] == 1)
        .await
        .unwrap();

    let event = json!({"type": "delete", "clientId": "abc", "senderId": 7, "senderName": "alice"});
    assert_eq!(server.post("/broadcast/all", &event).await.unwrap(), 202);

    for client in [&mut notify, &mut room3, &mut room4] {
        let got = client.recv().await.unwrap();
        assert_eq!(got["type"], "delete");
        assert_eq!(got["clientId"], "abc");
    }
}

#[tokio::test]
async fn test_invalid_events_are_rejected() {
    let server = TestServer::spawn(17309).await.expect("Failed to spawn test server");
    let missing_client_id = json!({"type": "message", "content": "hi"});
    assert_eq!(server.post("/broadcast/rooms/3", &missing_client_id).await.unwrap(), 400);

    let other_room = json!({"type": "message", "roomId": 4, "clientId": "x"});
    assert_eq!(server.post("/broadcast/rooms/3", &other_room).await.unwrap(), 400);
}

#[tokio::test]
async fn test_read_receipts_relay_to_room_peers() {
    let server = TestServer::spawn(17311).await.expect("Failed to spawn test server");
    let base = server.ws_url();
    let mut reader = TestClient::room(&base, 3, &token(8, "bob")).await.unwrap();
    let mut author = TestClient::room(&base, 3, &token(7, "alice")).await.unwrap();
    let mut other = TestClient::room(&base, 4, &token(9, "carol")).await.unwrap();
    server
        .wait_for("/stats", |s| s["roomConnections"] == 3)
        .await
        .unwrap();

    reader.send_json(&json!({"type": "ping"})).await.unwrap();
    let receipt = json!({"type": "read", "roomId": 3, "userId": 8, "client_id": "c-1", "messageId": 12});
    reader.send_json(&receipt).await.unwrap();

    assert_eq!(author.recv().await.unwrap(), receipt);
    assert!(reader.is_silent_for(Duration::from_millis(300)).await);
    assert!(other.is_silent_for(Duration::from_millis(100)).await);
}
