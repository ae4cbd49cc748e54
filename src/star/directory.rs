//! Member directory held by the star's coordinator
//!
//! Admission, refresh, status and departure for the members of one star.
//! Rejections carry the status code peers act upon, so the checks here run
//! in a fixed order.

use crate::common::{timestamp_now, Rejection};
use crate::node::NodeState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// A member as registered with the coordinator.
///
/// Field names follow the wire format; the two timestamps are local
/// bookkeeping and never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub star: String,
    pub sol: String,
    pub component: String,
    #[serde(rename = "com-ip")]
    pub com_ip: String,
    #[serde(rename = "com-tcp")]
    pub com_tcp: u16,
    pub status: String,
    #[serde(skip)]
    pub integrated_at: u64,
    #[serde(skip)]
    pub last_interaction: u64,
}

/// Coordinator-side registry of active and departed members.
pub struct StarDirectory {
    state: Arc<NodeState>,
    active: RwLock<HashMap<String, MemberRecord>>,
    inactive: RwLock<HashMap<String, MemberRecord>>,
}

impl StarDirectory {
    pub fn new(state: Arc<NodeState>) -> Self {
        Self {
            state,
            active: RwLock::new(HashMap::new()),
            inactive: RwLock::new(HashMap::new()),
        }
    }

    /// Insert the coordinator's own record, done once at promotion.
    pub fn seed_self(&self) {
        let now = timestamp_now();
        let Some(sol) = self.state.sol() else {
            return;
        };
        let record = MemberRecord {
            star: sol.star_id,
            sol: sol.sol_id.clone(),
            component: sol.sol_id.clone(),
            com_ip: self.state.ip.to_string(),
            com_tcp: self.state.star_port,
            status: "200".to_string(),
            integrated_at: now,
            last_interaction: now,
        };
        self.active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(sol.sol_id, record);
    }

    fn check_ready_and_sol(&self) -> Result<(), Rejection> {
        if !self.state.is_ready() || !self.state.is_coordinator() {
            return Err(Rejection::Unavailable);
        }
        Ok(())
    }

    /// Admit a new member. Order: availability, star identity, sol identity,
    /// capacity, duplicate id.
    pub fn register(&self, record: MemberRecord) -> Result<(), Rejection> {
        self.check_ready_and_sol()?;
        let sol = self.state.sol().ok_or(Rejection::Unavailable)?;
        if record.star != sol.star_id {
            return Err(Rejection::Unauthorized);
        }
        if record.sol != sol.sol_id {
            return Err(Rejection::Unauthorized);
        }
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        if active.len() >= self.state.max_members {
            return Err(Rejection::NoRoom);
        }
        if active.contains_key(&record.component) {
            return Err(Rejection::Conflict);
        }
        let now = timestamp_now();
        let id = record.component.clone();
        info!(member = %id, ip = %record.com_ip, "member registered");
        active.insert(
            id,
            MemberRecord {
                integrated_at: now,
                last_interaction: now,
                ..record
            },
        );
        Ok(())
    }

    /// Liveness refresh. The payload must match the stored record exactly;
    /// only `last_interaction` is updated.
    pub fn update(&self, id: &str, record: &MemberRecord) -> Result<(), Rejection> {
        self.check_ready_and_sol()?;
        let sol = self.state.sol().ok_or(Rejection::Unavailable)?;
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        let Some(existing) = active.get_mut(id) else {
            return Err(Rejection::NotFound);
        };
        if record.star != sol.star_id || record.sol != sol.sol_id || record.component != id {
            return Err(Rejection::Unauthorized);
        }
        if record.com_ip != existing.com_ip
            || record.com_tcp != existing.com_tcp
            || record.status != existing.status
        {
            return Err(Rejection::Conflict);
        }
        existing.last_interaction = timestamp_now();
        debug!(member = %id, "member refreshed");
        Ok(())
    }

    /// Remove a member, on its own request or on the coordinator's. The
    /// caller's address must match the record unless the coordinator itself
    /// initiates the removal.
    pub fn deregister(
        &self,
        id: &str,
        star: &str,
        caller_ip: Option<IpAddr>,
    ) -> Result<(), Rejection> {
        self.check_ready_and_sol()?;
        let sol = self.state.sol().ok_or(Rejection::Unavailable)?;
        if id.is_empty() {
            return Err(Rejection::Unauthorized);
        }
        if star != sol.star_id {
            return Err(Rejection::Unauthorized);
        }
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        let Some(record) = active.get(id) else {
            return Err(Rejection::NotFound);
        };
        if let Some(ip) = caller_ip {
            if record.com_ip != ip.to_string() {
                return Err(Rejection::Unauthorized);
            }
        }
        let mut record = active.remove(id).ok_or(Rejection::NotFound)?;
        record.status = "left".to_string();
        record.last_interaction = timestamp_now();
        info!(member = %id, "member deregistered");
        self.inactive
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), record);
        Ok(())
    }

    /// Status lookup. An unknown id yields 409, which doubles as the probe
    /// signal that the queried node does not consider itself that member.
    pub fn status_of(&self, id: &str) -> Result<MemberRecord, Rejection> {
        self.check_ready_and_sol()?;
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or(Rejection::Conflict)
    }

    /// Refresh a member's interaction timestamp after a successful probe.
    pub fn touch(&self, id: &str) {
        if let Some(record) = self
            .active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(id)
        {
            record.last_interaction = timestamp_now();
        }
    }

    /// Mark a member unreachable and move it out of the active set.
    pub fn mark_disconnected(&self, id: &str) {
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        if let Some(mut record) = active.remove(id) {
            record.status = "disconnected".to_string();
            record.last_interaction = timestamp_now();
            self.inactive
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(id.to_string(), record);
        }
    }

    /// Snapshot of all active members (coordinator included).
    pub fn active_members(&self) -> Vec<MemberRecord> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::NodeConfig;

    fn coordinator(max_members: usize) -> (Arc<NodeState>, StarDirectory, String) {
        let cfg = NodeConfig {
            max_members,
            group_id: "7".into(),
            ..Default::default()
        };
        let state = Arc::new(NodeState::new(&cfg, "1000".into(), "10.1.0.1".parse().unwrap()));
        let star = state.promote().unwrap();
        state.set_ready();
        let dir = StarDirectory::new(state.clone());
        dir.seed_self();
        (state, dir, star)
    }

    fn member(star: &str, id: &str, ip: &str) -> MemberRecord {
        MemberRecord {
            star: star.to_string(),
            sol: "1000".to_string(),
            component: id.to_string(),
            com_ip: ip.to_string(),
            com_tcp: 8000,
            status: "200".to_string(),
            integrated_at: 0,
            last_interaction: 0,
        }
    }

    #[test]
    fn test_register_and_count() {
        let (_state, dir, star) = coordinator(4);
        assert_eq!(dir.active_count(), 1);
        dir.register(member(&star, "2000", "10.1.0.2")).unwrap();
        assert_eq!(dir.active_count(), 2);
    }

    #[test]
    fn test_register_wrong_star() {
        let (_state, dir, _star) = coordinator(4);
        let err = dir.register(member("someone-else", "2000", "10.1.0.2"));
        assert_eq!(err, Err(Rejection::Unauthorized));
    }

    #[test]
    fn test_register_capacity() {
        let (_state, dir, star) = coordinator(2);
        dir.register(member(&star, "2000", "10.1.0.2")).unwrap();
        let err = dir.register(member(&star, "3000", "10.1.0.3"));
        assert_eq!(err, Err(Rejection::NoRoom));
    }

    #[test]
    fn test_register_duplicate() {
        let (_state, dir, star) = coordinator(4);
        dir.register(member(&star, "2000", "10.1.0.2")).unwrap();
        let err = dir.register(member(&star, "2000", "10.1.0.2"));
        assert_eq!(err, Err(Rejection::Conflict));
    }

    #[test]
    fn test_update_unknown() {
        let (_state, dir, star) = coordinator(4);
        let err = dir.update("2000", &member(&star, "2000", "10.1.0.2"));
        assert_eq!(err, Err(Rejection::NotFound));
    }

    #[test]
    fn test_update_detects_drift() {
        let (_state, dir, star) = coordinator(4);
        dir.register(member(&star, "2000", "10.1.0.2")).unwrap();
        let mut drifted = member(&star, "2000", "10.1.0.2");
        drifted.com_tcp = 9000;
        assert_eq!(dir.update("2000", &drifted), Err(Rejection::Conflict));
        assert!(dir.update("2000", &member(&star, "2000", "10.1.0.2")).is_ok());
    }

    #[test]
    fn test_deregister_moves_to_inactive() {
        let (_state, dir, star) = coordinator(4);
        dir.register(member(&star, "2000", "10.1.0.2")).unwrap();
        dir.deregister("2000", &star, Some("10.1.0.2".parse().unwrap()))
            .unwrap();
        assert_eq!(dir.active_count(), 1);
        assert_eq!(dir.status_of("2000"), Err(Rejection::Conflict));
    }

    #[test]
    fn test_deregister_wrong_caller() {
        let (_state, dir, star) = coordinator(4);
        dir.register(member(&star, "2000", "10.1.0.2")).unwrap();
        let err = dir.deregister("2000", &star, Some("10.9.9.9".parse().unwrap()));
        assert_eq!(err, Err(Rejection::Unauthorized));
    }

    #[test]
    fn test_not_ready_rejected() {
        let cfg = NodeConfig::default();
        let state = Arc::new(NodeState::new(&cfg, "1000".into(), "10.1.0.1".parse().unwrap()));
        let dir = StarDirectory::new(state);
        let err = dir.register(member("any", "2000", "10.1.0.2"));
        assert_eq!(err, Err(Rejection::Unavailable));
    }

    #[test]
    fn test_mark_disconnected() {
        let (_state, dir, star) = coordinator(4);
        dir.register(member(&star, "2000", "10.1.0.2")).unwrap();
        dir.mark_disconnected("2000");
        assert_eq!(dir.active_count(), 1);
    }
}
