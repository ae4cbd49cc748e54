//! Coordinator discovery over UDP broadcast
//!
//! A booting node broadcasts `HELLO?` on the star port and waits for a
//! unicast JSON reply from the group's coordinator. After the configured
//! number of unanswered rounds it promotes itself.

use crate::common::NodeConfig;
use crate::node::{NodeState, SolInfo};
use crate::transport::{Channel, UdpMux};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The probe sent by booting nodes.
pub const HELLO: &str = "HELLO?";

/// Unicast reply a coordinator sends to a probing node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloReply {
    pub star: String,
    pub sol: String,
    #[serde(rename = "sol-ip")]
    pub sol_ip: IpAddr,
    #[serde(rename = "sol-tcp")]
    pub sol_tcp: u16,
    pub component: String,
}

/// How discovery concluded.
#[derive(Debug)]
pub enum Outcome {
    /// A coordinator answered; this node joins its star.
    Adopted(SolInfo),
    /// No answer; this node is now the coordinator of a new star.
    Promoted(String),
}

pub struct Discovery {
    state: Arc<NodeState>,
    mux: Arc<UdpMux>,
    attempts: u32,
    wait: Duration,
}

impl Discovery {
    pub fn new(state: Arc<NodeState>, mux: Arc<UdpMux>, config: &NodeConfig) -> Self {
        Self {
            state,
            mux,
            attempts: config.discovery_attempts,
            wait: Duration::from_secs(config.discovery_wait_secs),
        }
    }

    /// Run the probe rounds until a coordinator is found or promotion.
    pub async fn run(&self) -> crate::Result<Outcome> {
        for round in 1..=self.attempts {
            info!(round, "broadcasting coordinator probe");
            if let Err(e) = self.mux.broadcast(Channel::Star, HELLO).await {
                warn!(error = %e, "probe broadcast failed");
            }
            let deadline = tokio::time::Instant::now() + self.wait;
            while tokio::time::Instant::now() < deadline {
                if self.state.sol_discovered() {
                    if let Some(sol) = self.state.sol() {
                        info!(star = %sol.star_id, sol = %sol.sol_id, "coordinator found");
                        return Ok(Outcome::Adopted(sol));
                    }
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
        match self.state.promote() {
            Some(star) => {
                info!(star = %star, "no coordinator answered, promoting self");
                Ok(Outcome::Promoted(star))
            }
            // A reply landed between the last poll and promotion.
            None => {
                let sol = self
                    .state
                    .sol()
                    .ok_or_else(|| crate::Error::Internal("discovery concluded without sol".into()))?;
                Ok(Outcome::Adopted(sol))
            }
        }
    }
}

/// Build the reply to a probe, or `None` when this node must stay silent
/// (not a ready coordinator, or probing itself).
pub fn probe_reply(state: &NodeState, sender_ip: IpAddr) -> Option<HelloReply> {
    if !state.is_coordinator() || !state.is_ready() {
        return None;
    }
    if sender_ip == state.ip {
        return None;
    }
    let sol = state.sol()?;
    Some(HelloReply {
        star: sol.star_id,
        sol: sol.sol_id,
        sol_ip: sol.ip,
        sol_tcp: sol.port,
        component: "empty".to_string(),
    })
}

/// Absorb a unicast probe reply. The first reply wins; later or malformed
/// ones are ignored. Returns whether the node adopted the coordinator.
pub fn absorb_reply(state: &NodeState, payload: &str) -> bool {
    if state.sol_discovered() {
        return false;
    }
    let reply: HelloReply = match serde_json::from_str(payload) {
        Ok(r) => r,
        Err(_) => {
            debug!("ignoring non-reply datagram during discovery");
            return false;
        }
    };
    state.adopt_sol(SolInfo {
        star_id: reply.star,
        sol_id: reply.sol,
        ip: reply.sol_ip,
        port: reply.sol_tcp,
    })
}

/// Dispatch one datagram from the star channel.
pub async fn handle_star_datagram(state: &NodeState, mux: &UdpMux, payload: &str, source: SocketAddr) {
    if payload == HELLO {
        if let Some(reply) = probe_reply(state, source.ip()) {
            let to = SocketAddr::new(source.ip(), state.star_port);
            match serde_json::to_string(&reply) {
                Ok(json) => {
                    if let Err(e) = mux.unicast(Channel::Star, &json, to).await {
                        warn!(%to, error = %e, "probe reply failed");
                    }
                }
                Err(e) => warn!(error = %e, "probe reply serialization failed"),
            }
        }
    } else {
        absorb_reply(state, payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::NodeConfig;

    fn node(id: &str, ip: &str) -> NodeState {
        NodeState::new(&NodeConfig::default(), id.into(), ip.parse().unwrap())
    }

    #[test]
    fn test_member_stays_silent() {
        let s = node("1000", "10.0.0.1");
        assert!(probe_reply(&s, "10.0.0.2".parse().unwrap()).is_none());
    }

    #[test]
    fn test_coordinator_answers_probe() {
        let s = node("1000", "10.0.0.1");
        let star = s.promote().unwrap();
        s.set_ready();
        let reply = probe_reply(&s, "10.0.0.2".parse().unwrap()).unwrap();
        assert_eq!(reply.star, star);
        assert_eq!(reply.sol, "1000");
        assert_eq!(reply.component, "empty");
    }

    #[test]
    fn test_own_probe_suppressed() {
        let s = node("1000", "10.0.0.1");
        s.promote().unwrap();
        s.set_ready();
        assert!(probe_reply(&s, "10.0.0.1".parse().unwrap()).is_none());
    }

    #[test]
    fn test_absorb_first_reply_only() {
        let s = node("2000", "10.0.0.2");
        let first = r#"{"star":"abc","sol":"1000","sol-ip":"10.0.0.1","sol-tcp":8000,"component":"empty"}"#;
        let second = r#"{"star":"def","sol":"3000","sol-ip":"10.0.0.3","sol-tcp":8000,"component":"empty"}"#;
        assert!(absorb_reply(&s, first));
        assert!(!absorb_reply(&s, second));
        assert_eq!(s.local_star().as_deref(), Some("abc"));
    }

    #[test]
    fn test_absorb_rejects_garbage() {
        let s = node("2000", "10.0.0.2");
        assert!(!absorb_reply(&s, "not json"));
        assert!(!s.sol_discovered());
    }

    #[test]
    fn test_reply_wire_format() {
        let reply = HelloReply {
            star: "abc".into(),
            sol: "1000".into(),
            sol_ip: "10.0.0.1".parse().unwrap(),
            sol_tcp: 8000,
            component: "empty".into(),
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains("\"sol-ip\""));
        assert!(json.contains("\"sol-tcp\""));
    }
}
