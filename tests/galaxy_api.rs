//! Galaxy-port HTTP API tests: sibling directory and message relay

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use starmesh::common::NodeConfig;
use starmesh::galaxy::GalaxyDirectory;
use starmesh::http::{galaxy_api, PeerClient};
use starmesh::message::{MessageService, MessageStore};
use starmesh::node::NodeState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct Harness {
    router: Router,
    star: String,
}

fn coordinator() -> Harness {
    let cfg = NodeConfig {
        group_id: "7".into(),
        ..Default::default()
    };
    let state = Arc::new(NodeState::new(&cfg, "1000".into(), "10.2.0.1".parse().unwrap()));
    let star = state.promote().unwrap();
    state.set_ready();

    let galaxy = Arc::new(GalaxyDirectory::new(state.clone()));
    galaxy.seed_self();
    let store = Arc::new(MessageStore::new());
    let messages = Arc::new(MessageService::new(
        state.clone(),
        store,
        galaxy.clone(),
        PeerClient::new(Duration::from_secs(1)).unwrap(),
    ));

    let router = galaxy_api::router(galaxy_api::GalaxyApi {
        node: state,
        galaxy,
        messages,
    });
    Harness { router, star }
}

async fn send_from(
    router: &Router,
    peer: &str,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let mut req = builder.body(body).unwrap();
    let peer: SocketAddr = peer.parse().unwrap();
    req.extensions_mut()
        .insert(axum::extract::ConnectInfo(peer));

    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn sibling(star: &str, ip: &str) -> Value {
    json!({
        "star": star,
        "sol": "2000",
        "sol-ip": ip,
        "sol-tcp": 8000,
        "no-com": 1,
        "status": "200",
    })
}

#[tokio::test]
async fn test_register_returns_local_descriptor() {
    let h = coordinator();
    let (status, body) = send_from(
        &h.router,
        "10.2.0.2:40000",
        "POST",
        "/v1/star",
        Some(sibling("other", "10.2.0.2")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["star"], h.star.as_str());
    assert_eq!(body["sol"], "1000");
    assert_eq!(body["no-com"], 4);
}

#[tokio::test]
async fn test_register_twice_conflicts() {
    let h = coordinator();
    let payload = sibling("other", "10.2.0.2");
    send_from(&h.router, "10.2.0.2:40000", "POST", "/v1/star", Some(payload.clone())).await;
    let (status, _) =
        send_from(&h.router, "10.2.0.2:40000", "POST", "/v1/star", Some(payload)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_list_includes_self_and_siblings() {
    let h = coordinator();
    send_from(
        &h.router,
        "10.2.0.2:40000",
        "POST",
        "/v1/star",
        Some(sibling("other", "10.2.0.2")),
    )
    .await;
    let (status, body) = send_from(&h.router, "10.2.0.2:40000", "GET", "/v1/star", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalResults"], 2);
}

#[tokio::test]
async fn test_get_unknown_star() {
    let h = coordinator();
    let (status, _) = send_from(&h.router, "10.2.0.2:40000", "GET", "/v1/star/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_refreshes_member_count() {
    let h = coordinator();
    send_from(
        &h.router,
        "10.2.0.2:40000",
        "POST",
        "/v1/star",
        Some(sibling("other", "10.2.0.2")),
    )
    .await;
    let mut updated = sibling("other", "10.2.0.2");
    updated["no-com"] = json!(3);
    let (status, body) = send_from(
        &h.router,
        "10.2.0.2:40000",
        "PATCH",
        "/v1/star/other",
        Some(updated),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["star"], h.star.as_str());

    let (_, body) = send_from(&h.router, "10.2.0.2:40000", "GET", "/v1/star/other", None).await;
    assert_eq!(body["no-com"], 3);
}

#[tokio::test]
async fn test_deregister_checks_caller_address() {
    let h = coordinator();
    send_from(
        &h.router,
        "10.2.0.2:40000",
        "POST",
        "/v1/star",
        Some(sibling("other", "10.2.0.2")),
    )
    .await;

    let (status, _) = send_from(
        &h.router,
        "10.9.9.9:40000",
        "DELETE",
        "/v1/star/other",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send_from(
        &h.router,
        "10.2.0.2:40000",
        "DELETE",
        "/v1/star/other",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

fn relayed(origin: &str) -> Value {
    json!({
        "origin": origin,
        "sender": "2000",
        "subject": "federated",
        "message": "payload",
        "version": "2",
    })
}

#[tokio::test]
async fn test_relay_accepted_once() {
    let h = coordinator();
    let uri = format!("/v1/messages/7@1000:other?star={}", h.star);
    let (status, body) = send_from(
        &h.router,
        "10.2.0.2:40000",
        "POST",
        &uri,
        Some(relayed("1000:other")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["msg-id"], "7@1000:other");

    let (status, _) = send_from(
        &h.router,
        "10.2.0.2:40000",
        "POST",
        &uri,
        Some(relayed("1000:other")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_relay_wrong_star_unauthorized() {
    let h = coordinator();
    let (status, _) = send_from(
        &h.router,
        "10.2.0.2:40000",
        "POST",
        "/v1/messages/7@1000:other?star=not-us",
        Some(relayed("1000:other")),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
