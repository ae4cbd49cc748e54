//! Inter-star federation: sibling directory and announcement handling

pub mod directory;

pub use directory::{GalaxyDirectory, SiblingStar};

use crate::http::PeerClient;
use crate::node::NodeState;
use crate::transport::{Channel, UdpMux};
use std::net::SocketAddr;
use tracing::{debug, info, warn};

/// Prefix of the broadcast a freshly promoted coordinator sends on the
/// galaxy port.
pub const ANNOUNCE_PREFIX: &str = "HELLO? I AM ";

/// Broadcast this star's existence to coordinators of other stars.
pub async fn announce(mux: &UdpMux, star: &str) -> crate::Result<()> {
    mux.broadcast(Channel::Galaxy, &format!("{}{}", ANNOUNCE_PREFIX, star))
        .await
}

/// Extract the star id from an announcement payload.
pub fn parse_announcement(payload: &str) -> Option<&str> {
    payload
        .strip_prefix(ANNOUNCE_PREFIX)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// What to do about an announcement, decided against local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnouncementAction {
    /// Not a coordinator, own star, or an address conflict.
    Ignore,
    /// Unknown sibling: introduce ourselves and learn its descriptor.
    Register,
    /// Known sibling re-announcing from the same address: refresh.
    Update,
}

/// Classify an announcement. Address conflicts (same star id announced from
/// a different host) are ignored rather than overwritten.
pub fn classify_announcement(
    state: &NodeState,
    directory: &GalaxyDirectory,
    star: &str,
    sender_ip: std::net::IpAddr,
) -> AnnouncementAction {
    if !state.is_coordinator() || !state.is_ready() {
        return AnnouncementAction::Ignore;
    }
    if state.local_star().as_deref() == Some(star) {
        return AnnouncementAction::Ignore;
    }
    match directory.lookup(star) {
        None => AnnouncementAction::Register,
        Some(known) if known.sol_ip == sender_ip => AnnouncementAction::Update,
        Some(known) => {
            warn!(
                star = %star,
                known_ip = %known.sol_ip,
                announced_ip = %sender_ip,
                "ignoring star announcement from conflicting address"
            );
            AnnouncementAction::Ignore
        }
    }
}

/// Dispatch one datagram from the galaxy channel.
pub async fn handle_galaxy_datagram(
    state: &NodeState,
    directory: &GalaxyDirectory,
    client: &PeerClient,
    payload: &str,
    source: SocketAddr,
) {
    let Some(star) = parse_announcement(payload) else {
        debug!(%source, "ignoring unrecognized galaxy datagram");
        return;
    };
    let action = classify_announcement(state, directory, star, source.ip());
    let own = directory.self_descriptor();
    match action {
        AnnouncementAction::Ignore => {}
        AnnouncementAction::Register => {
            match client
                .register_star(source.ip(), state.galaxy_port, &own)
                .await
            {
                Ok(descriptor) if descriptor.star == star => {
                    info!(star = %star, ip = %source.ip(), "sibling star registered");
                    directory.insert(descriptor);
                }
                Ok(descriptor) => {
                    warn!(
                        announced = %star,
                        returned = %descriptor.star,
                        "sibling returned mismatching descriptor, dropping"
                    );
                }
                Err(e) => warn!(star = %star, error = %e, "sibling introduction failed"),
            }
        }
        AnnouncementAction::Update => {
            match client.update_star(source.ip(), state.galaxy_port, &own).await {
                Ok(descriptor) => {
                    debug!(star = %star, "sibling refreshed");
                    directory.refresh(&descriptor);
                }
                Err(e) => warn!(star = %star, error = %e, "sibling refresh failed"),
            }
        }
    }
}
