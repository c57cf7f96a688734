//! Live relay tests: feed fanout, stream presence, chat, and socket auth.

mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};

use common::TestServer;

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(server: &TestServer, path: &str, token: &str) -> Socket {
    let url = server.ws_url(&format!("{}?token={}", path, token));
    let (socket, _) = connect_async(url).await.expect("websocket handshake");
    socket
}

/// Reads the next JSON event off the socket, skipping control frames.
async fn next_event(socket: &mut Socket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("parse event");
        }
    }
}

async fn send_json(socket: &mut Socket, payload: Value) {
    socket
        .send(Message::Text(payload.to_string().into()))
        .await
        .expect("send frame");
}

async fn create_loop(server: &TestServer, token: &str, body: Value) -> Value {
    let client = reqwest::Client::new();
    let resp: Value = client
        .post(format!("{}/api/v1/loops", server.base_url))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .expect("create loop")
        .json()
        .await
        .expect("parse loop");
    resp["data"].clone()
}

#[tokio::test]
async fn feed_socket_receives_public_loops() {
    let server = TestServer::start().await;
    let (_, alice) = server.create_user("alice").await;
    let (bob_id, bob) = server.create_user("bob").await;

    let mut feed = connect(&server, "/ws/feed", &alice).await;
    // Give the server a beat to wire the subscription up
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Private loops never hit the feed relay
    create_loop(
        &server,
        &bob,
        json!({"content_text": "just for me", "public": false}),
    )
    .await;
    let public = create_loop(&server, &bob, json!({"content_text": "hello world"})).await;

    let event = next_event(&mut feed).await;
    assert_eq!(event["type"], "new_loop");
    assert_eq!(event["loop_id"], public["id"]);
    assert_eq!(event["author_id"], bob_id.as_str());
    assert_eq!(event["username"], "bob");
    assert_eq!(event["content_text"], "hello world");
}

#[tokio::test]
async fn stream_presence_and_chat() {
    let server = TestServer::start().await;
    let (alice_id, alice) = server.create_user("alice").await;
    let (bob_id, bob) = server.create_user("bob").await;
    let client = reqwest::Client::new();

    let resp: Value = client
        .post(format!("{}/api/v1/streams", server.base_url))
        .bearer_auth(&alice)
        .json(&json!({"title": "loop session"}))
        .send()
        .await
        .expect("create stream")
        .json()
        .await
        .expect("parse stream");
    let stream_id = resp["data"]["id"].as_str().expect("stream id").to_string();

    let mut host = connect(&server, &format!("/ws/streams/{}", stream_id), &alice).await;

    // Joining echoes back, which doubles as the subscription handshake
    let event = next_event(&mut host).await;
    assert_eq!(event["type"], "stream_joined");
    assert_eq!(event["user_id"], alice_id.as_str());
    assert_eq!(event["viewer_count"], 1);

    // REST sees the socket-derived viewer count
    let resp: Value = client
        .get(format!("{}/api/v1/streams/{}", server.base_url, stream_id))
        .bearer_auth(&bob)
        .send()
        .await
        .expect("get stream")
        .json()
        .await
        .expect("parse stream");
    assert_eq!(resp["data"]["viewer_count"], 1);

    let mut viewer = connect(&server, &format!("/ws/streams/{}", stream_id), &bob).await;

    let event = next_event(&mut viewer).await;
    assert_eq!(event["type"], "stream_joined");
    assert_eq!(event["user_id"], bob_id.as_str());
    assert_eq!(event["viewer_count"], 2);

    let event = next_event(&mut host).await;
    assert_eq!(event["type"], "stream_joined");
    assert_eq!(event["user_id"], bob_id.as_str());
    assert_eq!(event["viewer_count"], 2);

    // Chat fans out to everyone in the room, sender included
    send_json(&mut viewer, json!({"type": "chat", "content": "nice set"})).await;

    let event = next_event(&mut host).await;
    assert_eq!(event["type"], "chat");
    assert_eq!(event["sender_id"], bob_id.as_str());
    assert_eq!(event["username"], "bob");
    assert_eq!(event["content"], "nice set");

    let event = next_event(&mut viewer).await;
    assert_eq!(event["type"], "chat");
    assert_eq!(event["content"], "nice set");

    // Chat is persisted for the stream page
    let resp: Value = client
        .get(format!(
            "{}/api/v1/streams/{}/messages",
            server.base_url, stream_id
        ))
        .bearer_auth(&alice)
        .send()
        .await
        .expect("list messages")
        .json()
        .await
        .expect("parse messages");
    let messages = resp["data"].as_array().expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "nice set");
    assert_eq!(messages[0]["sender_id"], bob_id.as_str());

    // Typing indicators relay without persisting
    send_json(&mut viewer, json!({"type": "typing_start"})).await;
    let event = next_event(&mut host).await;
    assert_eq!(event["type"], "typing_start");
    assert_eq!(event["user_id"], bob_id.as_str());
    let event = next_event(&mut viewer).await;
    assert_eq!(event["type"], "typing_start");

    // Leaving shrinks the room
    viewer.close(None).await.expect("close viewer");
    let event = next_event(&mut host).await;
    assert_eq!(event["type"], "stream_left");
    assert_eq!(event["user_id"], bob_id.as_str());
    assert_eq!(event["viewer_count"], 1);

    // Ending the stream tells the remaining viewers
    let resp = client
        .post(format!(
            "{}/api/v1/streams/{}/end",
            server.base_url, stream_id
        ))
        .bearer_auth(&alice)
        .json(&json!({}))
        .send()
        .await
        .expect("end stream");
    assert!(resp.status().is_success());

    let event = next_event(&mut host).await;
    assert_eq!(event["type"], "stream_ended");
    assert_eq!(event["stream_id"], stream_id.as_str());
}

#[tokio::test]
async fn gift_notifications_reach_the_feed_socket() {
    let server = TestServer::start().await;
    let (alice_id, alice) = server.create_user("alice").await;
    let (bob_id, bob) = server.create_user("bob").await;
    server.grant_coins(&alice_id, 50).await;

    let mut feed = connect(&server, "/ws/feed", &bob).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/v1/gifts", server.base_url))
        .bearer_auth(&alice)
        .json(&json!({"recipient_id": bob_id, "gift_type": "rose", "coins": 25}))
        .send()
        .await
        .expect("send gift");
    assert!(resp.status().is_success());

    let event = next_event(&mut feed).await;
    assert_eq!(event["type"], "notification");
    assert_eq!(event["notification"]["kind"], "gift");
    assert_eq!(event["notification"]["coins"], 25);
    assert_eq!(event["notification"]["actor_id"], alice_id.as_str());
}

#[tokio::test]
async fn sockets_reject_bad_tokens() {
    let server = TestServer::start().await;

    let url = server.ws_url("/ws/feed?token=loop_bogus123_badbadbadbadbadbadbadbad");
    match connect_async(url).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status().as_u16(), 401),
        other => panic!("expected 401 rejection, got {:?}", other.map(|_| "connected")),
    }

    let url = server.ws_url("/ws/feed");
    match connect_async(url).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status().as_u16(), 401),
        other => panic!("expected 401 rejection, got {:?}", other.map(|_| "connected")),
    }
}

#[tokio::test]
async fn stream_sockets_require_a_live_stream() {
    let server = TestServer::start().await;
    let (_, alice) = server.create_user("alice").await;
    let client = reqwest::Client::new();

    let url = server.ws_url(&format!("/ws/streams/missing?token={}", alice));
    match connect_async(url).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status().as_u16(), 404),
        other => panic!("expected 404 rejection, got {:?}", other.map(|_| "connected")),
    }

    let resp: Value = client
        .post(format!("{}/api/v1/streams", server.base_url))
        .bearer_auth(&alice)
        .json(&json!({"title": "short lived"}))
        .send()
        .await
        .expect("create stream")
        .json()
        .await
        .expect("parse stream");
    let stream_id = resp["data"]["id"].as_str().expect("stream id").to_string();

    client
        .post(format!(
            "{}/api/v1/streams/{}/end",
            server.base_url, stream_id
        ))
        .bearer_auth(&alice)
        .json(&json!({}))
        .send()
        .await
        .expect("end stream");

    let url = server.ws_url(&format!("/ws/streams/{}?token={}", stream_id, alice));
    match connect_async(url).await {
        Err(tungstenite::Error::Http(resp)) => assert_eq!(resp.status().as_u16(), 410),
        other => panic!("expected 410 rejection, got {:?}", other.map(|_| "connected")),
    }
}

#[tokio::test]
async fn chat_validates_frames() {
    let server = TestServer::start().await;
    let (_, alice) = server.create_user("alice").await;
    let (bob_id, bob) = server.create_user("bob").await;
    let client = reqwest::Client::new();

    let resp: Value = client
        .post(format!("{}/api/v1/streams", server.base_url))
        .bearer_auth(&alice)
        .json(&json!({"title": "strict room"}))
        .send()
        .await
        .expect("create stream")
        .json()
        .await
        .expect("parse stream");
    let stream_id = resp["data"]["id"].as_str().expect("stream id").to_string();

    let mut host = connect(&server, &format!("/ws/streams/{}", stream_id), &alice).await;
    next_event(&mut host).await; // own join

    let mut viewer = connect(&server, &format!("/ws/streams/{}", stream_id), &bob).await;
    next_event(&mut viewer).await; // own join
    next_event(&mut host).await; // viewer join

    // Garbage and empty frames are dropped, valid chat still flows after
    send_json(&mut viewer, json!({"type": "explode"})).await;
    send_json(&mut viewer, json!({"type": "chat", "content": "   "})).await;
    send_json(&mut viewer, json!({"type": "chat", "content": "still here"})).await;

    let event = next_event(&mut host).await;
    assert_eq!(event["type"], "chat");
    assert_eq!(event["content"], "still here");
    assert_eq!(event["sender_id"], bob_id.as_str());

    let resp: Value = client
        .get(format!(
            "{}/api/v1/streams/{}/messages",
            server.base_url, stream_id
        ))
        .bearer_auth(&alice)
        .send()
        .await
        .expect("list messages")
        .json()
        .await
        .expect("parse messages");
    assert_eq!(resp["data"].as_array().expect("messages").len(), 1);
}
