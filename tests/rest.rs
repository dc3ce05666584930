mod common;

use std::{net::SocketAddr, time::Duration};

use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{protocol::frame::coding::CloseCode, Message},
    MaybeTlsStream, WebSocketStream,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn call(
    client: &Client,
    method: reqwest::Method,
    url: String,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = client.request(method, url);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn conversation_and_message_endpoints() {
    let world = common::world().await;
    let (a, b) = (world.user("Ada").await, world.user("Bob").await);
    let base = format!("http://{}", world.serve().await);
    let client = Client::new();

    let (status, body) = call(
        &client,
        reqwest::Method::POST,
        format!("{base}/conversations"),
        Some(&a.token),
        Some(json!({ "otherUserId": b.id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"]["otherUser"]["firstName"], json!("Bob"));
    assert_eq!(body["data"]["unreadCount"], json!(0));
    let conversation_id = body["data"]["id"].as_str().unwrap().to_owned();

    let (status, body) = call(
        &client,
        reqwest::Method::POST,
        format!("{base}/messages"),
        Some(&a.token),
        Some(json!({ "conversationId": conversation_id, "text": "hello bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], json!("Message sent successfully"));
    assert_eq!(body["data"]["type"], json!("text"));
    assert_eq!(body["data"]["status"], json!("sent"));
    assert_eq!(body["data"]["receiver"]["id"], json!(b.id));
    let message_id = body["data"]["id"].as_str().unwrap().to_owned();

    let (status, body) = call(
        &client,
        reqwest::Method::GET,
        format!("{base}/conversations?page=1&size=10"),
        Some(&b.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], json!(1));
    assert_eq!(body["data"]["totalPages"], json!(1));
    assert_eq!(body["data"]["conversations"][0]["unreadCount"], json!(1));
    assert_eq!(body["data"]["conversations"][0]["lastMessage"]["text"], json!("hello bob"));

    let (status, body) = call(
        &client,
        reqwest::Method::GET,
        format!("{base}/messages/conversation/{conversation_id}?size=abc"),
        Some(&b.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["size"], json!(50));
    assert_eq!(body["data"]["messages"][0]["text"], json!("hello bob"));

    let (_, body) = call(
        &client,
        reqwest::Method::GET,
        format!("{base}/conversations/{conversation_id}"),
        Some(&b.token),
        None,
    )
    .await;
    assert_eq!(body["data"]["unreadCount"], json!(0));

    let (status, body) = call(
        &client,
        reqwest::Method::DELETE,
        format!("{base}/messages/{message_id}"),
        Some(&b.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "success": false, "message": "Access denied" }));

    let (status, _) = call(
        &client,
        reqwest::Method::DELETE,
        format!("{base}/messages/{message_id}"),
        Some(&a.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &client,
        reqwest::Method::PATCH,
        format!("{base}/messages/conversation/{conversation_id}/read"),
        Some(&b.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("Messages marked as read"));

    let (status, _) = call(
        &client,
        reqwest::Method::PATCH,
        format!("{base}/conversations/{conversation_id}/read"),
        Some(&a.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &client,
        reqwest::Method::DELETE,
        format!("{base}/conversations/{conversation_id}"),
        Some(&a.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &client,
        reqwest::Method::GET,
        format!("{base}/conversations/{conversation_id}"),
        Some(&a.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], json!("Conversation not found"));
}

#[tokio::test]
async fn rejections_use_the_uniform_body() {
    let world = common::world().await;
    let a = world.user("Ada").await;
    let base = format!("http://{}", world.serve().await);
    let client = Client::new();

    let (status, body) = call(&client, reqwest::Method::GET, format!("{base}/conversations"), None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));

    let (status, body) = call(
        &client,
        reqwest::Method::GET,
        format!("{base}/conversations"),
        Some("forged"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], json!("Invalid token"));

    let (status, body) = call(
        &client,
        reqwest::Method::GET,
        format!("{base}/conversations/not-an-id"),
        Some(&a.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], json!("Invalid conversation ID"));

    let (status, body) = call(
        &client,
        reqwest::Method::POST,
        format!("{base}/conversations"),
        Some(&a.token),
        Some(json!({ "otherUserId": a.id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], json!("Cannot create conversation with yourself"));

    let (status, body) = call(
        &client,
        reqwest::Method::POST,
        format!("{base}/messages"),
        Some(&a.token),
        Some(json!({ "text": "orphan" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], json!("Conversation ID is required"));

    let (status, body) = call(&client, reqwest::Method::GET, format!("{base}/nowhere"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "success": false, "message": "Route not found" }));

    let ready = client.get(format!("{base}/")).send().await.unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
    assert_eq!(ready.text().await.unwrap(), "Server is ready");
}

async fn open_socket(addr: SocketAddr, token: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}/ws?token={token}")).await.unwrap();
    socket
}

async fn next_frame(socket: &mut Socket) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("socket went quiet")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn next_event(socket: &mut Socket, event: &str) -> Value {
    loop {
        let frame = next_frame(socket).await;
        if frame["event"] == json!(event) {
            return frame;
        }
    }
}

async fn emit(socket: &mut Socket, frame: Value) {
    socket.send(Message::text(frame.to_string())).await.unwrap();
}

#[tokio::test]
async fn websocket_rejects_bad_tokens() {
    let world = common::world().await;
    let addr = world.serve().await;

    let mut socket = open_socket(addr, "forged").await;
    let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match message {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Policy);
            assert!(frame.reason.as_str().starts_with("Authentication error"));
        }
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn websocket_delivers_between_online_users() {
    let world = common::world().await;
    let (a, b) = (world.user("Ada").await, world.user("Bob").await);
    let conversation = world.state.conversations.create_or_get(a.id, b.id).await.unwrap();
    let addr = world.serve().await;

    let mut ada = open_socket(addr, &a.token).await;
    // an answered ack means ada's session is active
    emit(&mut ada, json!({ "event": "get_online_users", "ack": 1 })).await;
    assert_eq!(next_event(&mut ada, "ack").await["ack"], json!(1));

    let mut bob = open_socket(addr, &b.token).await;
    let online = next_event(&mut ada, "user_online").await;
    assert_eq!(online["data"]["userId"], json!(b.id));

    emit(
        &mut ada,
        json!({
            "event": "send_message",
            "data": { "conversationId": conversation.id, "text": "over the wire" },
            "ack": 2,
        }),
    )
    .await;

    let incoming = next_event(&mut bob, "new_message").await;
    assert_eq!(incoming["data"]["text"], json!("over the wire"));
    assert_eq!(incoming["data"]["sender"]["id"], json!(a.id));

    let delivered = next_event(&mut ada, "message_delivered").await;
    assert_eq!(delivered["data"]["conversationId"], json!(conversation.id));
    assert_eq!(delivered["data"]["messageId"], incoming["data"]["id"]);

    let ack = next_event(&mut ada, "ack").await;
    assert_eq!(ack["ack"], json!(2));
    assert_eq!(ack["data"]["success"], json!(true));

    emit(
        &mut bob,
        json!({
            "event": "typing",
            "data": { "conversationId": conversation.id, "receiverId": a.id },
        }),
    )
    .await;
    let typing = next_event(&mut ada, "user_typing").await;
    assert_eq!(typing["data"]["userId"], json!(b.id));

    emit(
        &mut bob,
        json!({ "event": "mark_as_read", "data": { "conversationId": conversation.id }, "ack": 3 }),
    )
    .await;
    let read = next_event(&mut ada, "messages_read").await;
    assert_eq!(read["data"]["readBy"], json!(b.id));

    bob.close(None).await.unwrap();
    let offline = next_event(&mut ada, "user_offline").await;
    assert_eq!(offline["data"]["userId"], json!(b.id));
}
