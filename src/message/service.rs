//! Message acceptance, processing and galaxy fan-out
//!
//! Members validate and forward to their coordinator; coordinators mint
//! ids, store, and relay copies to every sibling star. Duplicate ids are
//! rejected with 409, which is also what terminates relay loops.

use crate::common::{first_line, is_email_address, is_member_id, timestamp_now, Error, Rejection};
use crate::galaxy::{GalaxyDirectory, SiblingStar};
use crate::http::PeerClient;
use crate::message::{MessageRecord, MessageStore};
use crate::node::NodeState;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// The two accepted wire formats. They differ only in how the origin field
/// is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireVersion {
    V1,
    V2,
}

impl WireVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireVersion::V1 => "1",
            WireVersion::V2 => "2",
        }
    }

    /// V1 origins are a bare member id or email address; V2 origins carry a
    /// star suffix after the first colon.
    pub fn origin_is_valid(&self, origin: &str) -> bool {
        let candidate = match self {
            WireVersion::V1 => origin,
            WireVersion::V2 => origin.split(':').next().unwrap_or_default(),
        };
        is_member_id(candidate) || is_email_address(candidate)
    }
}

/// Siblings a stored message is relayed to: everyone except the star it
/// came from. The caller's own star is never in the sibling list.
pub fn fanout_targets<'a>(
    siblings: &'a [SiblingStar],
    from_star: Option<&str>,
) -> Vec<&'a SiblingStar> {
    siblings
        .iter()
        .filter(|s| Some(s.star.as_str()) != from_star)
        .collect()
}

pub struct MessageService {
    state: Arc<NodeState>,
    store: Arc<MessageStore>,
    galaxy: Arc<GalaxyDirectory>,
    client: PeerClient,
}

impl MessageService {
    pub fn new(
        state: Arc<NodeState>,
        store: Arc<MessageStore>,
        galaxy: Arc<GalaxyDirectory>,
        client: PeerClient,
    ) -> Self {
        Self {
            state,
            store,
            galaxy,
            client,
        }
    }

    fn check_star(&self, star: &str) -> Result<String, Rejection> {
        if !self.state.is_ready() {
            return Err(Rejection::Unavailable);
        }
        let local = self.state.local_star().ok_or(Rejection::Unavailable)?;
        if star != local {
            return Err(Rejection::Unauthorized);
        }
        Ok(local)
    }

    /// Accept a message from a client. Returns the assigned message id.
    pub async fn submit(
        &self,
        version: WireVersion,
        star: &str,
        mut msg: MessageRecord,
    ) -> Result<String, Rejection> {
        self.check_star(star)?;
        if !version.origin_is_valid(&msg.origin) {
            return Err(Rejection::PreconditionFailed);
        }
        if msg.sender.trim().is_empty() {
            return Err(Rejection::PreconditionFailed);
        }
        if msg.subject.trim().is_empty() {
            return Err(Rejection::PreconditionFailed);
        }
        // The accepting node vouches for the sender.
        msg.sender = self.state.node_id.clone();
        msg.subject = first_line(&msg.subject);
        msg.version = version.as_str().to_string();

        if self.state.is_coordinator() {
            if let Some(id) = &msg.msg_id {
                if self.store.contains(id) {
                    return Err(Rejection::Conflict);
                }
            }
            Ok(self.process_as_sol(msg))
        } else {
            let sol = self.state.sol().ok_or(Rejection::Unavailable)?;
            self.client
                .forward_message(sol.ip, sol.port, star, &msg)
                .await
                .map_err(forward_rejection)
        }
    }

    /// Accept a copy relayed by a sibling coordinator on the galaxy port.
    pub fn receive_relay(
        &self,
        id: &str,
        star: &str,
        mut msg: MessageRecord,
    ) -> Result<(), Rejection> {
        self.check_star(star)?;
        if !self.state.is_coordinator() {
            return Err(Rejection::Unavailable);
        }
        if id.is_empty() {
            return Err(Rejection::BadRequest);
        }
        if self.store.contains(id) {
            return Err(Rejection::Conflict);
        }
        msg.msg_id = Some(id.to_string());
        // Every hop vouches for itself, same as on the submit path.
        msg.sender = self.state.node_id.clone();
        self.process_as_sol(msg);
        Ok(())
    }

    /// Coordinator-side processing: mint the id, stamp timestamps, store and
    /// fan out. Only called once per unique id.
    fn process_as_sol(&self, mut msg: MessageRecord) -> String {
        let local = self.state.local_star().unwrap_or_default();
        let now = timestamp_now();
        let id = msg.msg_id.clone().unwrap_or_else(|| {
            format!("{}@{}:{}", self.store.next_nonce(), msg.origin, local)
        });
        msg.msg_id = Some(id.clone());

        if MessageRecord::id_star(&id) == Some(local.as_str()) {
            // Originated here: bind the origin to this star.
            msg.created = Some(now);
            msg.origin = format!("{}:{}", msg.origin, local);
        } else {
            msg.from_star = MessageRecord::id_star(&msg.origin).map(str::to_string);
            msg.received = Some(now);
        }
        msg.changed = Some(now);
        msg.status = "active".to_string();
        msg.star = Some(local.clone());
        info!(msg_id = %id, from_star = ?msg.from_star, "message stored");

        let from_star = msg.from_star.clone();
        self.store.insert(msg.clone());
        self.spawn_fanout(msg, from_star);
        id
    }

    fn spawn_fanout(&self, msg: MessageRecord, from_star: Option<String>) {
        let siblings = self.galaxy.siblings();
        if siblings.is_empty() {
            return;
        }
        let client = self.client.clone();
        let galaxy_port = self.state.galaxy_port;
        tokio::spawn(async move {
            let now = timestamp_now();
            for target in fanout_targets(&siblings, from_star.as_deref()) {
                let copy = MessageRecord {
                    star: Some(target.star.clone()),
                    to_star: Some(target.star.clone()),
                    delivered: Some(now),
                    version: WireVersion::V2.as_str().to_string(),
                    ..msg.clone()
                };
                if let Err(e) = client
                    .relay_message(target.sol_ip, galaxy_port, &target.star, &copy)
                    .await
                {
                    // Losing one sibling must not stop the others.
                    warn!(star = %target.star, error = %e, "message relay failed");
                }
            }
        });
    }

    /// Delete a message (coordinator) or forward the request (member).
    pub async fn delete(&self, id: &str, star: &str) -> Result<(), Rejection> {
        self.check_star(star)?;
        if self.state.is_coordinator() {
            self.store.mark_deleted(id)
        } else {
            let sol = self.state.sol().ok_or(Rejection::Unavailable)?;
            self.client
                .forward_delete(sol.ip, sol.port, id, star)
                .await
                .map_err(forward_rejection)
        }
    }

    /// List stored messages, scoped and projected per the query.
    pub async fn list(
        &self,
        star: &str,
        scope: &str,
        view: &str,
    ) -> Result<serde_json::Value, Rejection> {
        let local = self.check_star(star)?;
        if !self.state.is_coordinator() {
            let sol = self.state.sol().ok_or(Rejection::Unavailable)?;
            return self
                .client
                .forward_list(sol.ip, sol.port, star, scope, view)
                .await
                .map_err(forward_rejection);
        }
        let messages: Vec<serde_json::Value> = self
            .store
            .all()
            .into_iter()
            // Anything other than "all" lists active messages.
            .filter(|m| scope == "all" || m.status == "active")
            .map(|m| list_entry(&m, view))
            .collect();
        Ok(json!({
            "star": local,
            "totalResults": messages.len(),
            "scope": scope,
            "view": view,
            "messages": messages,
        }))
    }

    /// Fetch one message by id. Deleted messages reveal only id and status.
    pub async fn get(&self, id: &str, star: &str) -> Result<serde_json::Value, Rejection> {
        let local = self.check_star(star)?;
        if !self.state.is_coordinator() {
            let sol = self.state.sol().ok_or(Rejection::Unavailable)?;
            return self
                .client
                .forward_get(sol.ip, sol.port, id, star)
                .await
                .map_err(forward_rejection);
        }
        let msg = self.store.get(id).ok_or(Rejection::NotFound)?;
        let body = if msg.status == "deleted" {
            json!({ "msg-id": id, "status": msg.status })
        } else {
            serde_json::to_value(&msg).map_err(|_| Rejection::Internal)?
        };
        Ok(json!({
            "star": local,
            "totalResults": 1,
            "messages": [body],
        }))
    }
}

fn forward_rejection(err: Error) -> Rejection {
    match err {
        Error::PeerRejected { status } => Rejection::from_status(status),
        _ => Rejection::Internal,
    }
}

fn list_entry(msg: &MessageRecord, view: &str) -> serde_json::Value {
    let id = msg.msg_id.clone().unwrap_or_default();
    if view == "header" && msg.status != "deleted" {
        json!({
            "msg-id": id,
            "status": msg.status,
            "version": msg.version,
            "origin": msg.origin,
            "created": msg.created,
            "changed": msg.changed,
            "subject": msg.subject,
        })
    } else {
        json!({ "msg-id": id, "status": msg.status })
    }
}
