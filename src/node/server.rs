//! Node lifecycle: boot, discovery, serving, orderly shutdown

use crate::common::{detect_local_ip, random_node_id, Config, Error, Result};
use crate::galaxy::{self, GalaxyDirectory};
use crate::http::{galaxy_api, star_api, PeerClient};
use crate::message::{MessageService, MessageStore};
use crate::node::NodeState;
use crate::star::{
    discovery::{Discovery, Outcome},
    HealthMonitor, MemberAgent, StarDirectory,
};
use crate::transport::{Channel, Datagram, UdpMux};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// A starmesh node. Boots as a plain member, may end up coordinator.
pub struct Node {
    config: Config,
}

impl Node {
    pub fn new(config: Config) -> Result<Self> {
        config.node.validate()?;
        Ok(Self { config })
    }

    /// Run the node until a fatal condition or SIGINT.
    pub async fn serve(self) -> Result<()> {
        let cfg = &self.config.node;
        let node_id = random_node_id();
        let ip = cfg.bind_ip.unwrap_or_else(detect_local_ip);
        info!(node_id = %node_id, %ip, group = %cfg.group_id, "node starting");

        let state = Arc::new(NodeState::new(cfg, node_id, ip));
        let (mux, udp_rx) = UdpMux::bind(cfg.star_port, cfg.galaxy_port, cfg.udp_queue_depth).await?;
        let client = PeerClient::new(Duration::from_secs(cfg.http_timeout_secs))?;

        let members = Arc::new(StarDirectory::new(state.clone()));
        let galaxy_dir = Arc::new(GalaxyDirectory::new(state.clone()));
        let store = Arc::new(MessageStore::new());
        let messages = Arc::new(MessageService::new(
            state.clone(),
            store,
            galaxy_dir.clone(),
            client.clone(),
        ));

        let (fatal_tx, mut fatal_rx) = mpsc::channel::<Error>(4);

        spawn_dispatcher(
            udp_rx,
            state.clone(),
            mux.clone(),
            galaxy_dir.clone(),
            client.clone(),
        );
        self.spawn_http(&state, &members, &galaxy_dir, &messages, &fatal_tx)
            .await?;

        // Discovery decides the role; everything after depends on it.
        let discovery = Discovery::new(state.clone(), mux.clone(), cfg);
        let mut agent: Option<Arc<MemberAgent>> = None;
        match discovery.run().await? {
            Outcome::Adopted(_) => {
                let a = Arc::new(MemberAgent::new(state.clone(), client.clone(), cfg));
                a.register().await?;
                state.set_ready();
                a.clone().spawn_refresh_loop(fatal_tx.clone());
                agent = Some(a);
            }
            Outcome::Promoted(star) => {
                members.seed_self();
                galaxy_dir.seed_self();
                state.set_ready();
                Arc::new(HealthMonitor::new(
                    state.clone(),
                    members.clone(),
                    client.clone(),
                    cfg,
                ))
                .spawn();
                if let Err(e) = galaxy::announce(&mux, &star).await {
                    warn!(error = %e, "galaxy announcement failed");
                }
            }
        }
        info!(role = %state.role(), "node ready");

        let outcome = tokio::select! {
            Some(fatal) = fatal_rx.recv() => {
                error!(error = %fatal, "fatal condition, shutting down");
                Err(fatal)
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                Ok(())
            }
        };

        self.shutdown(&state, &members, &galaxy_dir, &client, agent)
            .await;
        outcome
    }

    async fn spawn_http(
        &self,
        state: &Arc<NodeState>,
        members: &Arc<StarDirectory>,
        galaxy_dir: &Arc<GalaxyDirectory>,
        messages: &Arc<MessageService>,
        fatal_tx: &mpsc::Sender<Error>,
    ) -> Result<()> {
        let star_router = star_api::router(star_api::StarApi {
            node: state.clone(),
            members: members.clone(),
            messages: messages.clone(),
            fatal_tx: fatal_tx.clone(),
        });
        let galaxy_router = galaxy_api::router(galaxy_api::GalaxyApi {
            node: state.clone(),
            galaxy: galaxy_dir.clone(),
            messages: messages.clone(),
        });

        for (port, router) in [
            (state.star_port, star_router),
            (state.galaxy_port, galaxy_router),
        ] {
            let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!(%addr, "http listener bound");
            tokio::spawn(async move {
                if let Err(e) = axum::serve(
                    listener,
                    router.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .await
                {
                    error!(error = %e, "http server terminated");
                }
            });
        }
        Ok(())
    }

    /// Orderly departure. Members tell their coordinator; a coordinator
    /// dissolves its star and withdraws from every sibling.
    async fn shutdown(
        &self,
        state: &Arc<NodeState>,
        members: &Arc<StarDirectory>,
        galaxy_dir: &Arc<GalaxyDirectory>,
        client: &PeerClient,
        agent: Option<Arc<MemberAgent>>,
    ) {
        if let Some(agent) = agent {
            agent.deregister().await;
            return;
        }
        if !state.is_coordinator() {
            return;
        }
        let Some(sol) = state.sol() else { return };
        let retry_delay = Duration::from_secs(self.config.node.retry_delay_secs);

        for member in members.active_members() {
            if member.component == state.node_id {
                continue;
            }
            let Ok(ip) = member.com_ip.parse::<IpAddr>() else {
                continue;
            };
            for attempt in 1..=self.config.node.retry_attempts {
                match client
                    .deregister_member(ip, member.com_tcp, &member.component, &sol.star_id)
                    .await
                {
                    Ok(()) => break,
                    Err(Error::PeerRejected { status: 401 }) => break,
                    Err(e) => {
                        warn!(member = %member.component, attempt, error = %e, "member dismissal failed");
                        if attempt < self.config.node.retry_attempts {
                            tokio::time::sleep(retry_delay).await;
                        }
                    }
                }
            }
        }

        galaxy_dir.remove_local(&sol.star_id);
        for sibling in galaxy_dir.siblings() {
            for attempt in 1..=2 {
                match client
                    .deregister_star(sibling.sol_ip, state.galaxy_port, &sol.star_id)
                    .await
                {
                    Ok(()) => break,
                    Err(e) => {
                        warn!(star = %sibling.star, attempt, error = %e, "sibling withdrawal failed");
                        if attempt < 2 {
                            tokio::time::sleep(retry_delay).await;
                        }
                    }
                }
            }
        }
        info!("star dissolved");
    }
}

fn spawn_dispatcher(
    mut rx: mpsc::Receiver<Datagram>,
    state: Arc<NodeState>,
    mux: Arc<UdpMux>,
    galaxy_dir: Arc<GalaxyDirectory>,
    client: PeerClient,
) {
    tokio::spawn(async move {
        while let Some(datagram) = rx.recv().await {
            match datagram.channel {
                Channel::Star => {
                    crate::star::discovery::handle_star_datagram(
                        &state,
                        &mux,
                        &datagram.payload,
                        datagram.source,
                    )
                    .await;
                }
                Channel::Galaxy => {
                    galaxy::handle_galaxy_datagram(
                        &state,
                        &galaxy_dir,
                        &client,
                        &datagram.payload,
                        datagram.source,
                    )
                    .await;
                }
            }
        }
    });
}
