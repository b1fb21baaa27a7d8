//! HTTP-level tests for the Telegram channel against a mock Bot API.

use futures_util::StreamExt;
use mockito::Matcher;
use relay::channels::{ChatTransport, TelegramChannel};
use relay::event::{InboundEvent, Platform, SenderId};
use serde_json::json;

const TOKEN: &str = "123:abc";

#[tokio::test]
async fn send_posts_chat_id_and_text() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/bot123:abc/sendMessage")
        .match_body(Matcher::Json(json!({ "chat_id": "42", "text": "hello" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "ok": true, "result": { "message_id": 1 } }).to_string())
        .create_async()
        .await;

    let channel = TelegramChannel::with_api_base(Some(TOKEN.to_string()), server.url());
    channel
        .send(&SenderId::new(Platform::Telegram, "42"), "hello")
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn send_reports_api_failure() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/bot123:abc/sendMessage")
        .with_status(400)
        .with_body(r#"{"ok":false,"description":"Bad Request: message text is empty"}"#)
        .create_async()
        .await;

    let channel = TelegramChannel::with_api_base(Some(TOKEN.to_string()), server.url());
    let err = channel
        .send(&SenderId::new(Platform::Telegram, "42"), "")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("sendMessage failed"));
}

#[tokio::test]
async fn missing_token_is_a_config_error() {
    let channel = TelegramChannel::with_api_base(None, "http://127.0.0.1:1");
    let err = channel
        .send(&SenderId::new(Platform::Telegram, "42"), "hi")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not configured"));
}

#[tokio::test]
async fn listen_yields_updates_and_resubscription_skips_pulled_ones() {
    let mut server = mockito::Server::new_async().await;
    let _webhook = server
        .mock("POST", "/bot123:abc/deleteWebhook")
        .with_status(200)
        .with_body(r#"{"ok":true,"result":true}"#)
        .expect(2)
        .create_async()
        .await;
    let first_poll = server
        .mock("GET", "/bot123:abc/getUpdates")
        .match_query(Matcher::Regex("^timeout=30$".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "ok": true,
                "result": [
                    { "update_id": 10, "message": { "chat": { "id": 7 }, "text": "hi" } },
                    { "update_id": 11, "message": { "chat": { "id": 8 }, "text": "/start" } }
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let second_poll = server
        .mock("GET", "/bot123:abc/getUpdates")
        .match_query(Matcher::Regex("offset=11".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "ok": true,
                "result": [
                    { "update_id": 11, "message": { "chat": { "id": 8 }, "text": "/start" } }
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let channel = TelegramChannel::with_api_base(Some(TOKEN.to_string()), server.url());

    let mut events = channel.listen();
    let first = events.next().await.unwrap().unwrap();
    assert_eq!(
        first,
        InboundEvent::NewMessage {
            sender_id: SenderId::new(Platform::Telegram, "7"),
            text: "hi".to_string(),
            directed_at_bot: true,
        }
    );
    drop(events);

    let mut events = channel.listen();
    let next = events.next().await.unwrap().unwrap();
    assert!(matches!(next, InboundEvent::Command { ref name, .. } if name == "start"));

    first_poll.assert_async().await;
    second_poll.assert_async().await;
}

#[tokio::test]
async fn listen_surfaces_poll_errors() {
    let mut server = mockito::Server::new_async().await;
    let _webhook = server
        .mock("POST", "/bot123:abc/deleteWebhook")
        .with_status(200)
        .with_body(r#"{"ok":true,"result":true}"#)
        .create_async()
        .await;
    let _poll = server
        .mock("GET", "/bot123:abc/getUpdates")
        .match_query(Matcher::Any)
        .with_status(502)
        .with_body("Bad Gateway")
        .create_async()
        .await;

    let channel = TelegramChannel::with_api_base(Some(TOKEN.to_string()), server.url());
    let err = channel.listen().next().await.unwrap().unwrap_err();
    assert!(err.to_string().contains("getUpdates failed"));
}
