//! Directory of sibling stars, held by each coordinator
//!
//! Every coordinator keeps its own view of the galaxy. Entries are learned
//! from announcements and from siblings introducing themselves over HTTP.

use crate::common::{timestamp_now, Rejection};
use crate::node::NodeState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Descriptor of a star's coordinator as exchanged between coordinators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiblingStar {
    pub star: String,
    pub sol: String,
    #[serde(rename = "sol-ip")]
    pub sol_ip: IpAddr,
    #[serde(rename = "sol-tcp")]
    pub sol_tcp: u16,
    #[serde(rename = "no-com")]
    pub no_com: usize,
    pub status: String,
    #[serde(skip)]
    pub last_interaction: u64,
}

pub struct GalaxyDirectory {
    state: Arc<NodeState>,
    active: RwLock<HashMap<String, SiblingStar>>,
    inactive: RwLock<HashMap<String, SiblingStar>>,
}

impl GalaxyDirectory {
    pub fn new(state: Arc<NodeState>) -> Self {
        Self {
            state,
            active: RwLock::new(HashMap::new()),
            inactive: RwLock::new(HashMap::new()),
        }
    }

    /// This coordinator's own descriptor.
    pub fn self_descriptor(&self) -> SiblingStar {
        let sol = self.state.sol();
        let (star, sol_id) = sol
            .map(|s| (s.star_id, s.sol_id))
            .unwrap_or_default();
        SiblingStar {
            star,
            sol: sol_id,
            sol_ip: self.state.ip,
            sol_tcp: self.state.star_port,
            no_com: self.state.max_members,
            status: "200".to_string(),
            last_interaction: timestamp_now(),
        }
    }

    /// Insert the coordinator's own star, done once at promotion.
    pub fn seed_self(&self) {
        let own = self.self_descriptor();
        self.active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(own.star.clone(), own);
    }

    fn check_sol(&self) -> Result<(), Rejection> {
        if !self.state.is_ready() || !self.state.is_coordinator() {
            return Err(Rejection::Unavailable);
        }
        Ok(())
    }

    pub fn lookup(&self, star: &str) -> Option<SiblingStar> {
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(star)
            .cloned()
    }

    pub fn insert(&self, descriptor: SiblingStar) {
        self.active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(descriptor.star.clone(), descriptor);
    }

    /// Refresh a known sibling from a descriptor it returned.
    pub fn refresh(&self, descriptor: &SiblingStar) {
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = active.get_mut(&descriptor.star) {
            existing.no_com = descriptor.no_com;
            existing.status = descriptor.status.clone();
            existing.last_interaction = timestamp_now();
        }
    }

    /// Siblings to fan messages out to (everyone but this star).
    pub fn siblings(&self) -> Vec<SiblingStar> {
        let own = self.state.local_star();
        self.active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|s| Some(s.star.as_str()) != own.as_deref())
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Result<Vec<SiblingStar>, Rejection> {
        self.check_sol()?;
        Ok(self
            .active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect())
    }

    /// A sibling introduces itself. Answers with this star's descriptor.
    pub fn register(&self, descriptor: SiblingStar) -> Result<SiblingStar, Rejection> {
        self.check_sol()?;
        if descriptor.star.is_empty() {
            return Err(Rejection::BadRequest);
        }
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        if active.contains_key(&descriptor.star) {
            return Err(Rejection::Conflict);
        }
        info!(star = %descriptor.star, ip = %descriptor.sol_ip, "star registered");
        active.insert(
            descriptor.star.clone(),
            SiblingStar {
                last_interaction: timestamp_now(),
                ..descriptor
            },
        );
        drop(active);
        Ok(self.self_descriptor())
    }

    /// A known sibling refreshes its descriptor.
    pub fn update(&self, id: &str, descriptor: SiblingStar) -> Result<SiblingStar, Rejection> {
        self.check_sol()?;
        if id.is_empty() || descriptor.star != id {
            return Err(Rejection::BadRequest);
        }
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        let Some(existing) = active.get_mut(id) else {
            return Err(Rejection::Conflict);
        };
        existing.no_com = descriptor.no_com;
        existing.status = descriptor.status;
        existing.last_interaction = timestamp_now();
        drop(active);
        Ok(self.self_descriptor())
    }

    pub fn get(&self, id: &str) -> Result<SiblingStar, Rejection> {
        self.check_sol()?;
        if id.is_empty() {
            return Err(Rejection::BadRequest);
        }
        self.lookup(id).ok_or(Rejection::NotFound)
    }

    /// A sibling withdraws its star. The caller's address must match the
    /// stored descriptor.
    pub fn deregister(&self, id: &str, caller_ip: Option<IpAddr>) -> Result<(), Rejection> {
        self.check_sol()?;
        if id.is_empty() {
            return Err(Rejection::BadRequest);
        }
        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        let Some(record) = active.get(id) else {
            return Err(Rejection::NotFound);
        };
        if let Some(ip) = caller_ip {
            if record.sol_ip != ip {
                return Err(Rejection::Unauthorized);
            }
        }
        let mut record = active.remove(id).ok_or(Rejection::NotFound)?;
        record.status = "left".to_string();
        record.last_interaction = timestamp_now();
        info!(star = %id, "star deregistered");
        self.inactive
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), record);
        Ok(())
    }

    /// Drop this coordinator's own entry during shutdown.
    pub fn remove_local(&self, star: &str) {
        self.active
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(star);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::NodeConfig;

    fn setup() -> (Arc<NodeState>, GalaxyDirectory, String) {
        let state = Arc::new(NodeState::new(
            &NodeConfig::default(),
            "1000".into(),
            "10.2.0.1".parse().unwrap(),
        ));
        let star = state.promote().unwrap();
        state.set_ready();
        let dir = GalaxyDirectory::new(state.clone());
        dir.seed_self();
        (state, dir, star)
    }

    fn sibling(star: &str, ip: &str) -> SiblingStar {
        SiblingStar {
            star: star.to_string(),
            sol: "2000".to_string(),
            sol_ip: ip.parse().unwrap(),
            sol_tcp: 8000,
            no_com: 1,
            status: "200".to_string(),
            last_interaction: 0,
        }
    }

    #[test]
    fn test_register_returns_own_descriptor() {
        let (_state, dir, star) = setup();
        let reply = dir.register(sibling("other", "10.2.0.2")).unwrap();
        assert_eq!(reply.star, star);
        assert_eq!(reply.sol, "1000");
        assert!(dir.lookup("other").is_some());
    }

    #[test]
    fn test_register_duplicate() {
        let (_state, dir, _star) = setup();
        dir.register(sibling("other", "10.2.0.2")).unwrap();
        assert_eq!(
            dir.register(sibling("other", "10.2.0.2")),
            Err(Rejection::Conflict)
        );
    }

    #[test]
    fn test_update_unknown_conflicts() {
        let (_state, dir, _star) = setup();
        assert_eq!(
            dir.update("other", sibling("other", "10.2.0.2")),
            Err(Rejection::Conflict)
        );
    }

    #[test]
    fn test_update_id_mismatch() {
        let (_state, dir, _star) = setup();
        dir.register(sibling("other", "10.2.0.2")).unwrap();
        assert_eq!(
            dir.update("other", sibling("different", "10.2.0.2")),
            Err(Rejection::BadRequest)
        );
    }

    #[test]
    fn test_siblings_exclude_self() {
        let (_state, dir, star) = setup();
        dir.register(sibling("other", "10.2.0.2")).unwrap();
        let siblings = dir.siblings();
        assert_eq!(siblings.len(), 1);
        assert_ne!(siblings[0].star, star);
    }

    #[test]
    fn test_deregister_checks_caller() {
        let (_state, dir, _star) = setup();
        dir.register(sibling("other", "10.2.0.2")).unwrap();
        assert_eq!(
            dir.deregister("other", Some("10.9.9.9".parse().unwrap())),
            Err(Rejection::Unauthorized)
        );
        dir.deregister("other", Some("10.2.0.2".parse().unwrap()))
            .unwrap();
        assert!(dir.lookup("other").is_none());
    }

    #[test]
    fn test_get_unknown() {
        let (_state, dir, _star) = setup();
        assert_eq!(dir.get("nope"), Err(Rejection::NotFound));
        assert_eq!(dir.get(""), Err(Rejection::BadRequest));
    }
}
