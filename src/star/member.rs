//! Member-side star membership
//!
//! Registration with the coordinator, the periodic liveness refresh, and
//! orderly departure. A coordinator verdict against this node is fatal;
//! network trouble gets a bounded number of retries first.

use crate::common::{Error, NodeConfig, Result};
use crate::http::PeerClient;
use crate::node::NodeState;
use crate::star::MemberRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct MemberAgent {
    state: Arc<NodeState>,
    client: PeerClient,
    refresh_interval: Duration,
    retry_delay: Duration,
    retry_attempts: u32,
}

impl MemberAgent {
    pub fn new(state: Arc<NodeState>, client: PeerClient, config: &NodeConfig) -> Self {
        Self {
            state,
            client,
            refresh_interval: Duration::from_secs(config.refresh_interval_secs),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            retry_attempts: config.retry_attempts,
        }
    }

    /// This node's own registration record.
    pub fn own_record(&self) -> Result<MemberRecord> {
        let sol = self
            .state
            .sol()
            .ok_or_else(|| Error::Internal("member without coordinator".into()))?;
        Ok(MemberRecord {
            star: sol.star_id,
            sol: sol.sol_id,
            component: self.state.node_id.clone(),
            com_ip: self.state.ip.to_string(),
            com_tcp: self.state.star_port,
            status: "200".to_string(),
            integrated_at: 0,
            last_interaction: 0,
        })
    }

    /// Register with the coordinator. Any rejection is fatal: without a
    /// place in the star the node has no reason to run.
    pub async fn register(&self) -> Result<()> {
        let sol = self
            .state
            .sol()
            .ok_or_else(|| Error::Internal("member without coordinator".into()))?;
        let record = self.own_record()?;
        match self.client.register_member(sol.ip, sol.port, &record).await {
            Ok(()) => {
                info!(sol = %sol.sol_id, star = %sol.star_id, "registered with coordinator");
                Ok(())
            }
            Err(Error::PeerRejected { status }) => Err(Error::fatal(format!(
                "coordinator refused registration with status {}",
                status
            ))),
            Err(e) => Err(Error::fatal(format!("registration failed: {}", e))),
        }
    }

    /// Periodic refresh keeping this member out of the stale sweep. Runs
    /// until a fatal condition, which is reported on `fatal_tx`.
    pub fn spawn_refresh_loop(self: Arc<Self>, fatal_tx: mpsc::Sender<Error>) {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(self.refresh_interval).await;
                if let Err(e) = self.refresh_once().await {
                    let _ = fatal_tx.send(e).await;
                    return;
                }
            }
        });
    }

    async fn refresh_once(&self) -> Result<()> {
        let sol = self
            .state
            .sol()
            .ok_or_else(|| Error::Internal("member without coordinator".into()))?;
        let record = self.own_record()?;
        let mut attempt = 0;
        loop {
            match self.client.update_member(sol.ip, sol.port, &record).await {
                Ok(()) => return Ok(()),
                // The coordinator no longer recognizes this node.
                Err(Error::PeerRejected {
                    status: status @ (401 | 404 | 409),
                }) => {
                    return Err(Error::fatal(format!(
                        "coordinator rejected refresh with status {}",
                        status
                    )));
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry_attempts {
                        return Err(Error::fatal(format!(
                            "coordinator unreachable after {} attempts: {}",
                            attempt, e
                        )));
                    }
                    warn!(attempt, error = %e, "refresh failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// Best-effort departure notice, sent on shutdown.
    pub async fn deregister(&self) {
        let Some(sol) = self.state.sol() else {
            return;
        };
        for attempt in 1..=self.retry_attempts {
            match self
                .client
                .deregister_member(sol.ip, sol.port, &self.state.node_id, &sol.star_id)
                .await
            {
                Ok(()) => {
                    info!("deregistered from coordinator");
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "deregistration failed");
                    if attempt < self.retry_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
    }
}
