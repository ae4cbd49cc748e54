//! Process-wide node state
//!
//! A single context struct shared by every component instead of globals.
//! Single-value fields are atomics; the compound role transition (role +
//! coordinator identity) is guarded by one mutex so discovery and election
//! complete as an atomic unit even under concurrent UDP callbacks.

use crate::common::{star_id, NodeConfig};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, RwLock};

/// Role of a node within its star.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Member,
    Coordinator,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Member => write!(f, "member"),
            NodeRole::Coordinator => write!(f, "coordinator"),
        }
    }
}

/// Identity of the star's coordinator as known to this node. For a
/// coordinator this describes the node itself.
#[derive(Debug, Clone)]
pub struct SolInfo {
    pub star_id: String,
    pub sol_id: String,
    pub ip: IpAddr,
    pub port: u16,
}

/// Shared mutable node state.
///
/// Identity fields are immutable after boot; `role`, readiness and the
/// coordinator identity change exactly once, during discovery/election.
pub struct NodeState {
    pub node_id: String,
    pub group_id: String,
    pub ip: IpAddr,
    pub star_port: u16,
    pub galaxy_port: u16,
    pub max_members: usize,

    role: AtomicU8,
    ready: AtomicBool,
    discovered: AtomicBool,
    sol: RwLock<Option<SolInfo>>,
    transition: Mutex<()>,
}

const ROLE_MEMBER: u8 = 0;
const ROLE_COORDINATOR: u8 = 1;

impl NodeState {
    pub fn new(config: &NodeConfig, node_id: String, ip: IpAddr) -> Self {
        Self {
            node_id,
            group_id: config.group_id.clone(),
            ip,
            star_port: config.star_port,
            galaxy_port: config.galaxy_port,
            max_members: config.max_members,
            role: AtomicU8::new(ROLE_MEMBER),
            ready: AtomicBool::new(false),
            discovered: AtomicBool::new(false),
            sol: RwLock::new(None),
            transition: Mutex::new(()),
        }
    }

    pub fn role(&self) -> NodeRole {
        match self.role.load(Ordering::SeqCst) {
            ROLE_COORDINATOR => NodeRole::Coordinator,
            _ => NodeRole::Member,
        }
    }

    pub fn is_coordinator(&self) -> bool {
        self.role() == NodeRole::Coordinator
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Has discovery concluded (either by adoption or promotion)?
    pub fn sol_discovered(&self) -> bool {
        self.discovered.load(Ordering::SeqCst)
    }

    /// Snapshot of the coordinator identity, if discovery has concluded.
    pub fn sol(&self) -> Option<SolInfo> {
        self.sol.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The star this node belongs to, once known.
    pub fn local_star(&self) -> Option<String> {
        self.sol().map(|s| s.star_id)
    }

    /// Adopt a remote coordinator announced via a probe reply. Returns false
    /// if discovery already concluded, in which case the reply is ignored.
    pub fn adopt_sol(&self, info: SolInfo) -> bool {
        let _guard = self.transition.lock().unwrap_or_else(|e| e.into_inner());
        if self.discovered.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.sol.write().unwrap_or_else(|e| e.into_inner()) = Some(info);
        true
    }

    /// Self-promote to coordinator. Returns the freshly derived star id, or
    /// `None` when a probe reply won the race and the node stays a member.
    pub fn promote(&self) -> Option<String> {
        let _guard = self.transition.lock().unwrap_or_else(|e| e.into_inner());
        if self.discovered.swap(true, Ordering::SeqCst) {
            return None;
        }
        let star = star_id(self.ip, &self.group_id, &self.node_id);
        *self.sol.write().unwrap_or_else(|e| e.into_inner()) = Some(SolInfo {
            star_id: star.clone(),
            sol_id: self.node_id.clone(),
            ip: self.ip,
            port: self.star_port,
        });
        self.role.store(ROLE_COORDINATOR, Ordering::SeqCst);
        Some(star)
    }
}
