//! Star-port HTTP API tests: member admission and the message surface

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use starmesh::common::NodeConfig;
use starmesh::galaxy::GalaxyDirectory;
use starmesh::http::{star_api, PeerClient};
use starmesh::message::{MessageService, MessageStore};
use starmesh::node::NodeState;
use starmesh::star::StarDirectory;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;

struct Harness {
    router: Router,
    star: String,
}

fn coordinator(max_members: usize) -> Harness {
    let cfg = NodeConfig {
        max_members,
        group_id: "7".into(),
        ..Default::default()
    };
    let state = Arc::new(NodeState::new(&cfg, "1000".into(), "10.1.0.1".parse().unwrap()));
    let star = state.promote().unwrap();
    state.set_ready();

    let members = Arc::new(StarDirectory::new(state.clone()));
    members.seed_self();
    let galaxy = Arc::new(GalaxyDirectory::new(state.clone()));
    galaxy.seed_self();
    let store = Arc::new(MessageStore::new());
    let messages = Arc::new(MessageService::new(
        state.clone(),
        store,
        galaxy,
        PeerClient::new(Duration::from_secs(1)).unwrap(),
    ));
    let (fatal_tx, _fatal_rx) = mpsc::channel(4);

    let router = star_api::router(star_api::StarApi {
        node: state,
        members,
        messages,
        fatal_tx,
    });
    Harness { router, star }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let mut req = builder.body(body).unwrap();
    let peer: SocketAddr = "10.1.0.2:40000".parse().unwrap();
    req.extensions_mut()
        .insert(axum::extract::ConnectInfo(peer));

    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn member(star: &str, id: &str) -> Value {
    json!({
        "star": star,
        "sol": "1000",
        "component": id,
        "com-ip": "10.1.0.2",
        "com-tcp": 8000,
        "status": "200",
    })
}

#[tokio::test]
async fn test_register_then_status_visible() {
    let h = coordinator(4);
    let uri = format!("/v1/system?star={}", h.star);
    let (status, _) = send(&h.router, "POST", &uri, Some(member(&h.star, "2000"))).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/v1/system/2000?star={}", h.star);
    let (status, body) = send(&h.router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["component"], "2000");
}

#[tokio::test]
async fn test_register_requires_star_param() {
    let h = coordinator(4);
    let (status, _) = send(&h.router, "POST", "/v1/system", Some(member(&h.star, "2000"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_capacity_exhausted() {
    let h = coordinator(2);
    let uri = format!("/v1/system?star={}", h.star);
    let (status, _) = send(&h.router, "POST", &uri, Some(member(&h.star, "2000"))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&h.router, "POST", &uri, Some(member(&h.star, "3000"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_duplicate_member_conflicts() {
    let h = coordinator(4);
    let uri = format!("/v1/system?star={}", h.star);
    send(&h.router, "POST", &uri, Some(member(&h.star, "2000"))).await;
    let (status, _) = send(&h.router, "POST", &uri, Some(member(&h.star, "2000"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_wrong_star_unauthorized() {
    let h = coordinator(4);
    let (status, _) = send(
        &h.router,
        "POST",
        "/v1/system?star=someone-else",
        Some(member("someone-else", "2000")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deregister_by_member() {
    let h = coordinator(4);
    let uri = format!("/v1/system?star={}", h.star);
    send(&h.router, "POST", &uri, Some(member(&h.star, "2000"))).await;

    // Caller address 10.1.0.2 matches the registered record.
    let uri = format!("/v1/system/2000?star={}", h.star);
    let (status, _) = send(&h.router, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&h.router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_status_conflicts() {
    let h = coordinator(4);
    let uri = format!("/v1/system/9999?star={}", h.star);
    let (status, _) = send(&h.router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

fn message(origin: &str) -> Value {
    json!({
        "origin": origin,
        "sender": "1000",
        "subject": "hello there",
        "message": "payload",
    })
}

#[tokio::test]
async fn test_message_accept_and_fetch() {
    let h = coordinator(4);
    let uri = format!("/v1/messages?star={}", h.star);
    let (status, body) = send(&h.router, "POST", &uri, Some(message("1000"))).await;
    assert_eq!(status, StatusCode::OK);
    let id = body["msg-id"].as_str().unwrap().to_string();
    assert!(id.ends_with(&format!(":{}", h.star)));

    let uri = format!("/v1/messages/{}?star={}", id, h.star);
    let (status, body) = send(&h.router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalResults"], 1);
    assert_eq!(body["messages"][0]["msg-id"], id.as_str());
    assert_eq!(body["messages"][0]["msg-type"], "active");
}

#[tokio::test]
async fn test_message_invalid_origin() {
    let h = coordinator(4);
    let uri = format!("/v1/messages?star={}", h.star);
    let (status, _) = send(&h.router, "POST", &uri, Some(message("not-an-origin"))).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn test_v2_accepts_star_suffixed_origin() {
    let h = coordinator(4);
    let uri = format!("/v2/messages?star={}", h.star);
    let (status, _) = send(&h.router, "POST", &uri, Some(message("1000:some-star"))).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/v1/messages?star={}", h.star);
    let (status, _) = send(&h.router, "POST", &uri, Some(message("1000:some-star"))).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn test_delete_is_not_idempotent() {
    let h = coordinator(4);
    let uri = format!("/v1/messages?star={}", h.star);
    let (_, body) = send(&h.router, "POST", &uri, Some(message("1000"))).await;
    let id = body["msg-id"].as_str().unwrap().to_string();

    let uri = format!("/v1/messages/{}?star={}", id, h.star);
    let (status, _) = send(&h.router, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&h.router, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A deleted message reveals only its id and status.
    let (status, body) = send(&h.router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["messages"][0]["status"], "deleted");
    assert!(body["messages"][0].get("message").is_none());
}

#[tokio::test]
async fn test_list_default_scope_and_views() {
    let h = coordinator(4);
    let uri = format!("/v1/messages?star={}", h.star);
    let (_, body) = send(&h.router, "POST", &uri, Some(message("1000"))).await;
    let first = body["msg-id"].as_str().unwrap().to_string();
    send(&h.router, "POST", &uri, Some(message("2000"))).await;

    let del = format!("/v1/messages/{}?star={}", first, h.star);
    send(&h.router, "DELETE", &del, None).await;

    let uri = format!("/v1/messages?star={}", h.star);
    let (status, body) = send(&h.router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scope"], "active");
    assert_eq!(body["view"], "id");
    assert_eq!(body["totalResults"], 1);

    let uri = format!("/v1/messages?star={}&scope=all&view=header", h.star);
    let (_, body) = send(&h.router, "GET", &uri, None).await;
    assert_eq!(body["totalResults"], 2);
}
