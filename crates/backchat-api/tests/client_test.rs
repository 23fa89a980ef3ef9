// Integration tests for `ChatClient` using wiremock.
#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use backchat_api::{ChatClient, Error, MessageId, NewMessage};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, ChatClient) {
    let server = MockServer::start().await;
    let client = ChatClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();
    (server, client)
}

fn message_json(id: &str, username: &str, content: &str) -> serde_json::Value {
    json!({
        "id": id,
        "username": username,
        "content": content,
        "is_admin": false,
        "timestamp": "2024-05-01T12:00:00.000000"
    })
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_list_messages_preserves_server_order() {
    let (server, client) = setup().await;

    let body = json!([
        message_json("m1", "alice", "first"),
        message_json("m2", "bob", "second"),
    ]);

    Mock::given(method("GET"))
        .and(path("/api/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let messages = client.list_messages(None).await.unwrap();

    let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
    assert_eq!(messages[1].username, "bob");
}

#[tokio::test]
async fn test_list_messages_with_limit() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/messages"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let messages = client.list_messages(Some(10)).await.unwrap();
    assert!(messages.is_empty());
}

#[tokio::test]
async fn test_create_message_posts_body() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/messages"))
        .and(body_json(json!({
            "username": "alice",
            "content": "hi",
            "is_admin": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_json("m9", "alice", "hi")))
        .expect(1)
        .mount(&server)
        .await;

    let created = client
        .create_message(&NewMessage {
            username: "alice".into(),
            content: "hi".into(),
            is_admin: false,
        })
        .await
        .unwrap();

    assert_eq!(created.id, MessageId::from("m9"));
    assert_eq!(created.content, "hi");
    assert!(!created.is_admin);
}

#[tokio::test]
async fn test_delete_message() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/api/admin/messages/m1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client.delete_message(&MessageId::from("m1")).await.unwrap();
    assert!(resp.success);
}

#[tokio::test]
async fn test_admin_login_success() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/admin/login"))
        .and(body_json(json!({ "username": "admin", "password": "hunter2" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "success": true, "token": "admin_token_123" })),
        )
        .mount(&server)
        .await;

    let resp = client
        .admin_login("admin", &SecretString::from("hunter2".to_string()))
        .await
        .unwrap();
    assert!(resp.success);
    assert_eq!(resp.token.as_deref(), Some("admin_token_123"));
}

// ── Error-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_delete_unknown_message_is_not_found() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/api/admin/messages/ghost"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "detail": "Message not found" })),
        )
        .mount(&server)
        .await;

    let err = client
        .delete_message(&MessageId::from("ghost"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(err, Error::NotFound { ref id } if id == "ghost"));
}

#[tokio::test]
async fn test_admin_login_rejected() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/admin/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "detail": "Invalid credentials" })),
        )
        .mount(&server)
        .await;

    let err = client
        .admin_login("admin", &SecretString::from("wrong".to_string()))
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Authentication { ref message } if message == "Invalid credentials"),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/messages"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.list_messages(None).await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_garbled_snapshot_keeps_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/api/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client.list_messages(None).await.unwrap_err();
    match err {
        Error::Deserialization { body, .. } => assert_eq!(body, "<html>oops</html>"),
        other => panic!("expected deserialization error, got {other:?}"),
    }
}
