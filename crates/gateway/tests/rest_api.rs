//! REST API integration tests.
//!
//! These tests verify:
//! - The envelope contract and exact user-facing messages
//! - Session lifecycle over HTTP: add with pairing, find, status, delete
//! - Direct and group sends including receiver validation
//! - Fallback handling for unknown routes
//!
//! Each test spins the real router on an ephemeral port and talks to it
//! over HTTP, with the in-memory transport scripted underneath.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;

use rmsg_gateway::{router, AppState};
use rmsg_session_core::{CredentialStore, SessionConfig, SessionManager};
use rmsg_transport::{
    AuthState, AuthVariant, GroupMetadata, GroupParticipant, Jid, MemoryTransportFactory,
    SessionId,
};

struct TestGateway {
    base: String,
    factory: MemoryTransportFactory,
    store: Arc<CredentialStore>,
    client: reqwest::Client,
    _dir: TempDir,
}

impl TestGateway {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

async fn spawn_gateway() -> TestGateway {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig {
        sessions_dir: dir.path().to_path_buf(),
        ..SessionConfig::default()
    };
    let store = Arc::new(CredentialStore::new(dir.path()));
    let factory = MemoryTransportFactory::new();
    let manager = SessionManager::new(config, Arc::clone(&store), Arc::new(factory.clone()));

    let app = router(AppState { manager });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestGateway {
        base: format!("http://{addr}"),
        factory,
        store,
        client: reqwest::Client::new(),
        _dir: dir,
    }
}

async fn seed_registered(gw: &TestGateway, id: &str) {
    gw.store
        .save(
            &SessionId::new(id),
            AuthVariant::Modern,
            &AuthState::registered(&Jid::user(id)),
        )
        .await
        .unwrap();
}

async fn body_of(resp: reqwest::Response) -> (u16, Value) {
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn test_add_session_hands_out_a_scannable_qr() {
    let gw = spawn_gateway().await;

    let resp = gw
        .client
        .post(gw.url("/sessions/add"))
        .json(&json!({ "id": "alpha" }))
        .send()
        .await
        .unwrap();
    let (status, body) = body_of(resp).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "QR code received, please scan the QR code.");
    let qr = body["data"]["qr"].as_str().unwrap();
    assert!(qr.starts_with("data:image/svg+xml;base64,"));

    let resp = gw.client.get(gw.url("/sessions/status/alpha")).send().await.unwrap();
    let (status, body) = body_of(resp).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["state"], "awaiting_pairing");

    // While the pairing hangs, the id is taken.
    let resp = gw
        .client
        .post(gw.url("/sessions/add"))
        .json(&json!({ "id": "alpha" }))
        .send()
        .await
        .unwrap();
    let (status, body) = body_of(resp).await;
    assert_eq!(status, 409);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Session already exists.");
}

#[tokio::test]
async fn test_add_with_stored_credentials_comes_up_ready() {
    let gw = spawn_gateway().await;
    seed_registered(&gw, "alpha").await;

    let resp = gw
        .client
        .post(gw.url("/sessions/add"))
        .json(&json!({ "id": "alpha" }))
        .send()
        .await
        .unwrap();
    let (status, body) = body_of(resp).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "The session has been successfully created.");

    let resp = gw.client.get(gw.url("/sessions/find/alpha")).send().await.unwrap();
    let (status, body) = body_of(resp).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Session found.");

    let resp = gw.client.get(gw.url("/sessions/status/alpha")).send().await.unwrap();
    let (_, body) = body_of(resp).await;
    assert_eq!(body["data"]["state"], "open");
}

#[tokio::test]
async fn test_unknown_session_is_a_uniform_404() {
    let gw = spawn_gateway().await;

    for path in ["/sessions/find/ghost", "/sessions/status/ghost"] {
        let resp = gw.client.get(gw.url(path)).send().await.unwrap();
        let (status, body) = body_of(resp).await;
        assert_eq!(status, 404);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Session not found.");
        assert_eq!(body["data"], json!({}));
    }
}

#[tokio::test]
async fn test_chat_send_reaches_the_transport() {
    let gw = spawn_gateway().await;
    seed_registered(&gw, "alpha").await;

    let resp = gw
        .client
        .post(gw.url("/chats/send?id=alpha"))
        .json(&json!({ "receiver": "+49 155 0001", "message": "hello", "delay": 0 }))
        .send()
        .await
        .unwrap();
    let (status, body) = body_of(resp).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "The message has been successfully sent.");

    let sent = gw.factory.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to.as_str(), "491550001@s.whatsapp.net");
    assert_eq!(sent[0].content.conversation(), Some("hello"));
}

#[tokio::test]
async fn test_chat_send_rejects_unreachable_receivers() {
    let gw = spawn_gateway().await;
    seed_registered(&gw, "alpha").await;
    gw.factory.set_exists(&Jid::user("4915550002"), false).await;

    let resp = gw
        .client
        .post(gw.url("/chats/send?id=alpha"))
        .json(&json!({ "receiver": "4915550002", "message": "hello", "delay": 0 }))
        .send()
        .await
        .unwrap();
    let (status, body) = body_of(resp).await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "The receiver number is not exists.");
    assert!(gw.factory.sent().await.is_empty());
}

#[tokio::test]
async fn test_chat_send_without_a_session_is_404() {
    let gw = spawn_gateway().await;

    let resp = gw
        .client
        .post(gw.url("/chats/send?id=ghost"))
        .json(&json!({ "receiver": "4915550003", "message": "hello" }))
        .send()
        .await
        .unwrap();
    let (status, body) = body_of(resp).await;
    assert_eq!(status, 404);
    assert_eq!(body["message"], "Session not found.");
}

fn group_fixture() -> GroupMetadata {
    GroupMetadata {
        id: Jid::group("12036304-1618"),
        subject: "Weekend plans".to_string(),
        description: Some("Trips and hikes".to_string()),
        owner: Some(Jid::user("4915550000")),
        creation: Some(1_700_000_000),
        participants: vec![
            GroupParticipant { id: Jid::user("4915550000"), admin: true, super_admin: true },
            GroupParticipant { id: Jid::user("4915550001"), admin: false, super_admin: false },
        ],
    }
}

#[tokio::test]
async fn test_group_list_and_metadata_shapes() {
    let gw = spawn_gateway().await;
    seed_registered(&gw, "alpha").await;
    gw.factory.set_groups(&SessionId::new("alpha"), vec![group_fixture()]).await;

    // Opening happens lazily on first use.
    let resp = gw.client.get(gw.url("/groups?id=alpha")).send().await.unwrap();
    let (status, body) = body_of(resp).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "All group fetched successfully");
    let groups = body["data"].as_array().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["id"], "12036304-1618@g.us");
    assert_eq!(groups[0]["subject"], "Weekend plans");
    assert_eq!(groups[0]["memberCount"], 2);
    assert_eq!(groups[0]["participants"][0]["isSuperAdmin"], true);

    let resp = gw
        .client
        .get(gw.url("/groups/meta/12036304-1618?id=alpha"))
        .send()
        .await
        .unwrap();
    let (status, body) = body_of(resp).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["subject"], "Weekend plans");
    assert_eq!(body["data"]["owner"], "4915550000@s.whatsapp.net");

    let resp = gw.client.get(gw.url("/groups/meta/999?id=alpha")).send().await.unwrap();
    let (status, body) = body_of(resp).await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "The group is not exists.");
}

#[tokio::test]
async fn test_group_send_validates_the_group_first() {
    let gw = spawn_gateway().await;
    seed_registered(&gw, "alpha").await;
    let group = Jid::group("12036304-1618");
    gw.factory.set_exists(&group, true).await;

    let resp = gw
        .client
        .post(gw.url("/groups/send?id=alpha"))
        .json(&json!({ "receiver": "12036304-1618", "message": "hi all" }))
        .send()
        .await
        .unwrap();
    let (status, body) = body_of(resp).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "The message has been successfully sent.");
    let sent = gw.factory.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, group);

    let resp = gw
        .client
        .post(gw.url("/groups/send?id=alpha"))
        .json(&json!({ "receiver": "999", "message": "hi" }))
        .send()
        .await
        .unwrap();
    let (status, body) = body_of(resp).await;
    assert_eq!(status, 400);
    assert_eq!(body["message"], "The group is not exists.");
}

#[tokio::test]
async fn test_delete_session_purges_credentials() {
    let gw = spawn_gateway().await;
    seed_registered(&gw, "alpha").await;

    let resp = gw
        .client
        .post(gw.url("/sessions/add"))
        .json(&json!({ "id": "alpha" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = gw.client.delete(gw.url("/sessions/delete/alpha")).send().await.unwrap();
    let (status, body) = body_of(resp).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "The session has been successfully deleted.");

    let blob = gw
        .store
        .load(&SessionId::new("alpha"), AuthVariant::Modern)
        .await
        .unwrap();
    assert!(blob.is_none());

    let resp = gw.client.delete(gw.url("/sessions/delete/alpha")).send().await.unwrap();
    let (status, _) = body_of(resp).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_unknown_routes_answer_in_the_envelope() {
    let gw = spawn_gateway().await;

    let resp = gw.client.get(gw.url("/nope")).send().await.unwrap();
    let (status, body) = body_of(resp).await;
    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "The requested url cannot be found.");
}

#[tokio::test]
async fn test_send_waits_out_the_requested_delay() {
    let gw = spawn_gateway().await;
    seed_registered(&gw, "alpha").await;

    let started = std::time::Instant::now();
    let resp = gw
        .client
        .post(gw.url("/chats/send?id=alpha"))
        .json(&json!({ "receiver": "4915550004", "message": "later", "delay": 300 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert!(started.elapsed() >= Duration::from_millis(300));
}
