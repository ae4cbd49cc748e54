//! HTTP API served on the star port
//!
//! Member management and the message surface. Everything here requires the
//! caller to name the star it believes it is talking to; a missing star
//! parameter is a 400 before any routing decision.

use crate::common::{Error, Rejection};
use crate::message::{MessageRecord, MessageService, WireVersion};
use crate::node::NodeState;
use crate::star::{MemberRecord, StarDirectory};
use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct StarApi {
    pub node: Arc<NodeState>,
    pub members: Arc<StarDirectory>,
    pub messages: Arc<MessageService>,
    pub fatal_tx: mpsc::Sender<Error>,
}

#[derive(Debug, Deserialize)]
pub struct StarQuery {
    star: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    star: Option<String>,
    scope: Option<String>,
    view: Option<String>,
}

fn require_star(star: Option<String>) -> Result<String, Rejection> {
    star.filter(|s| !s.is_empty()).ok_or(Rejection::BadRequest)
}

pub fn router(api: StarApi) -> Router {
    Router::new()
        .route("/v1/system", post(register_member))
        .route(
            "/v1/system/:id",
            get(member_status)
                .patch(update_member)
                .delete(deregister_member),
        )
        .route("/v1/messages", post(submit_v1).get(list_messages))
        .route(
            "/v1/messages/:id",
            get(get_message).delete(delete_message),
        )
        .route("/v2/messages", post(submit_v2))
        .layer(TraceLayer::new_for_http())
        .with_state(api)
}

async fn register_member(
    State(api): State<StarApi>,
    Query(q): Query<StarQuery>,
    Json(record): Json<MemberRecord>,
) -> Result<impl IntoResponse, Rejection> {
    require_star(q.star)?;
    api.members.register(record)?;
    Ok(StatusCode::OK)
}

async fn update_member(
    State(api): State<StarApi>,
    Path(id): Path<String>,
    Query(q): Query<StarQuery>,
    Json(record): Json<MemberRecord>,
) -> Result<impl IntoResponse, Rejection> {
    require_star(q.star)?;
    api.members.update(&id, &record)?;
    Ok(StatusCode::OK)
}

/// Removal of a member. On a coordinator this drops the record; on a member
/// it is the coordinator telling this node to leave, which ends the process.
async fn deregister_member(
    State(api): State<StarApi>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
    Query(q): Query<StarQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let star = require_star(q.star)?;
    if api.node.is_coordinator() {
        api.members.deregister(&id, &star, Some(addr.ip()))?;
        return Ok(StatusCode::OK);
    }
    if !api.node.is_ready() {
        return Err(Rejection::Unavailable);
    }
    let sol = api.node.sol().ok_or(Rejection::Unavailable)?;
    if id != api.node.node_id || star != sol.star_id || addr.ip() != sol.ip {
        return Err(Rejection::Unauthorized);
    }
    info!("coordinator asked this node to leave");
    let _ = api
        .fatal_tx
        .send(Error::fatal("deregistered by coordinator"))
        .await;
    Ok(StatusCode::OK)
}

/// Status lookup, also used as the coordinator's liveness probe. A member
/// answers for its own id only.
async fn member_status(
    State(api): State<StarApi>,
    Path(id): Path<String>,
    Query(q): Query<StarQuery>,
) -> Result<impl IntoResponse, Rejection> {
    require_star(q.star)?;
    if api.node.is_coordinator() {
        let record = api.members.status_of(&id)?;
        return Ok(Json(record).into_response());
    }
    if !api.node.is_ready() {
        return Err(Rejection::Unavailable);
    }
    if id != api.node.node_id {
        return Err(Rejection::Conflict);
    }
    let sol = api.node.sol().ok_or(Rejection::Unavailable)?;
    Ok(Json(MemberRecord {
        star: sol.star_id,
        sol: sol.sol_id,
        component: api.node.node_id.clone(),
        com_ip: api.node.ip.to_string(),
        com_tcp: api.node.star_port,
        status: "200".to_string(),
        integrated_at: 0,
        last_interaction: 0,
    })
    .into_response())
}

async fn submit_v1(
    State(api): State<StarApi>,
    Query(q): Query<StarQuery>,
    Json(msg): Json<MessageRecord>,
) -> Result<impl IntoResponse, Rejection> {
    let star = require_star(q.star)?;
    let id = api.messages.submit(WireVersion::V1, &star, msg).await?;
    Ok(Json(json!({ "msg-id": id })))
}

async fn submit_v2(
    State(api): State<StarApi>,
    Query(q): Query<StarQuery>,
    Json(msg): Json<MessageRecord>,
) -> Result<impl IntoResponse, Rejection> {
    let star = require_star(q.star)?;
    let id = api.messages.submit(WireVersion::V2, &star, msg).await?;
    Ok(Json(json!({ "msg-id": id })))
}

async fn list_messages(
    State(api): State<StarApi>,
    Query(q): Query<ListQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let star = require_star(q.star)?;
    let scope = q.scope.unwrap_or_else(|| "active".to_string());
    let view = q.view.unwrap_or_else(|| "id".to_string());
    let envelope = api.messages.list(&star, &scope, &view).await?;
    Ok(Json(envelope))
}

async fn get_message(
    State(api): State<StarApi>,
    Path(id): Path<String>,
    Query(q): Query<StarQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let star = require_star(q.star)?;
    let envelope = api.messages.get(&id, &star).await?;
    Ok(Json(envelope))
}

async fn delete_message(
    State(api): State<StarApi>,
    Path(id): Path<String>,
    Query(q): Query<StarQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let star = require_star(q.star)?;
    api.messages.delete(&id, &star).await?;
    Ok(StatusCode::OK)
}
