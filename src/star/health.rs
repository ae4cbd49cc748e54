//! Coordinator-side member health monitor
//!
//! Members refresh themselves every 30 seconds; any member silent past the
//! stale threshold gets probed once. A probe that cannot reach the member
//! marks it disconnected and removes it from the active set.

use crate::common::{timestamp_now, NodeConfig, Result};
use crate::http::PeerClient;
use crate::node::NodeState;
use crate::star::{MemberRecord, StarDirectory};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Does this member need a liveness probe? The coordinator never probes
/// itself.
fn is_stale(member: &MemberRecord, own_id: &str, now: u64, stale_after: u64) -> bool {
    member.component != own_id && now.saturating_sub(member.last_interaction) > stale_after
}

/// Fold a probe outcome back into the directory. A clean 200 refreshes the
/// member; any network error is terminal for its membership. Other status
/// codes are logged and left for the next sweep.
fn apply_probe(directory: &StarDirectory, id: &str, outcome: Result<u16>) {
    match outcome {
        Ok(200) => directory.touch(id),
        Ok(status) => {
            warn!(member = %id, status, "stale member answered oddly");
        }
        Err(e) => {
            warn!(member = %id, error = %e, "stale member unreachable, dropping");
            directory.mark_disconnected(id);
        }
    }
}

pub struct HealthMonitor {
    state: Arc<NodeState>,
    directory: Arc<StarDirectory>,
    client: PeerClient,
    stale_after: u64,
    sweep_interval: Duration,
}

impl HealthMonitor {
    pub fn new(
        state: Arc<NodeState>,
        directory: Arc<StarDirectory>,
        client: PeerClient,
        config: &NodeConfig,
    ) -> Self {
        Self {
            state,
            directory,
            client,
            stale_after: config.stale_after_secs,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
        }
    }

    pub fn spawn(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(self.sweep_interval).await;
                self.sweep().await;
            }
        });
    }

    async fn sweep(&self) {
        let now = timestamp_now();
        let Some(star) = self.state.local_star() else {
            return;
        };
        for member in self.directory.active_members() {
            if !is_stale(&member, &self.state.node_id, now, self.stale_after) {
                continue;
            }
            let Ok(ip) = member.com_ip.parse() else {
                warn!(member = %member.component, ip = %member.com_ip, "unparsable member address");
                continue;
            };
            debug!(member = %member.component, "probing stale member");
            let outcome = self
                .client
                .member_status(ip, member.com_tcp, &member.component, &star)
                .await;
            apply_probe(&self.directory, &member.component, outcome);
        }
    }
}
