//! HTTP API served on the galaxy port
//!
//! The sibling-star directory, plus the narrow message carve-out used by
//! coordinator-to-coordinator relay. The wider message surface and member
//! management stay on the star port.

use crate::common::Rejection;
use crate::galaxy::{GalaxyDirectory, SiblingStar};
use crate::message::{MessageRecord, MessageService};
use crate::node::NodeState;
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
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct GalaxyApi {
    pub node: Arc<NodeState>,
    pub galaxy: Arc<GalaxyDirectory>,
    pub messages: Arc<MessageService>,
}

#[derive(Debug, Deserialize)]
pub struct StarQuery {
    star: Option<String>,
}

fn require_star(star: Option<String>) -> Result<String, Rejection> {
    star.filter(|s| !s.is_empty()).ok_or(Rejection::BadRequest)
}

pub fn router(api: GalaxyApi) -> Router {
    Router::new()
        .route("/v1/star", post(register_star).get(list_stars))
        .route(
            "/v1/star/:id",
            get(get_star).patch(update_star).delete(deregister_star),
        )
        .route(
            "/v1/messages/:id",
            post(relay_message).delete(delete_message),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(api)
}

async fn register_star(
    State(api): State<GalaxyApi>,
    Json(descriptor): Json<SiblingStar>,
) -> Result<impl IntoResponse, Rejection> {
    let own = api.galaxy.register(descriptor)?;
    Ok(Json(own))
}

async fn list_stars(State(api): State<GalaxyApi>) -> Result<impl IntoResponse, Rejection> {
    let stars = api.galaxy.all()?;
    Ok(Json(json!({
        "totalResults": stars.len(),
        "stars": stars,
    })))
}

async fn get_star(
    State(api): State<GalaxyApi>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Rejection> {
    let descriptor = api.galaxy.get(&id)?;
    Ok(Json(descriptor))
}

async fn update_star(
    State(api): State<GalaxyApi>,
    Path(id): Path<String>,
    Json(descriptor): Json<SiblingStar>,
) -> Result<impl IntoResponse, Rejection> {
    let own = api.galaxy.update(&id, descriptor)?;
    Ok(Json(own))
}

async fn deregister_star(
    State(api): State<GalaxyApi>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Rejection> {
    api.galaxy.deregister(&id, Some(addr.ip()))?;
    Ok(StatusCode::OK)
}

/// A sibling coordinator delivers a message copy addressed to this star.
async fn relay_message(
    State(api): State<GalaxyApi>,
    Path(id): Path<String>,
    Query(q): Query<StarQuery>,
    Json(msg): Json<MessageRecord>,
) -> Result<impl IntoResponse, Rejection> {
    let star = require_star(q.star)?;
    api.messages.receive_relay(&id, &star, msg)?;
    Ok(Json(json!({ "msg-id": id })))
}

async fn delete_message(
    State(api): State<GalaxyApi>,
    Path(id): Path<String>,
    Query(q): Query<StarQuery>,
) -> Result<impl IntoResponse, Rejection> {
    let star = require_star(q.star)?;
    api.messages.delete(&id, &star).await?;
    Ok(StatusCode::OK)
}
