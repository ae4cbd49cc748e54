//! Configuration for starmesh nodes

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from `starmesh.toml` (if present) and the
    /// `STARMESH_` environment, falling back to defaults. CLI arguments are
    /// merged on top by the binary.
    pub fn load() -> Self {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("starmesh").required(false))
            .add_source(config::Environment::with_prefix("STARMESH").separator("__"));

        match builder.build() {
            Ok(settings) => settings.try_deserialize().unwrap_or_default(),
            Err(_) => Config::default(),
        }
    }
}

/// Node configuration
///
/// The star and galaxy ports are bound twice: once for UDP discovery and
/// once for the HTTP control plane. All nodes of a deployment must share the
/// same port numbers, since probe replies and announcements are addressed to
/// the local port number on the sender's host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Intra-star port (UDP discovery + HTTP member management)
    #[serde(default = "default_star_port")]
    pub star_port: u16,

    /// Inter-star port (UDP announcements + HTTP galaxy directory)
    #[serde(default = "default_galaxy_port")]
    pub galaxy_port: u16,

    /// Group identifier scoping star membership
    #[serde(default = "default_group_id")]
    pub group_id: String,

    /// Maximum number of members admitted to the star (coordinator included)
    #[serde(default = "default_max_members")]
    pub max_members: usize,

    /// Local address override; auto-detected when unset
    #[serde(default)]
    pub bind_ip: Option<IpAddr>,

    /// Number of discovery broadcasts before self-promotion
    #[serde(default = "default_discovery_attempts")]
    pub discovery_attempts: u32,

    /// Wait window after each discovery broadcast (seconds)
    #[serde(default = "default_discovery_wait_secs")]
    pub discovery_wait_secs: u64,

    /// Member liveness refresh interval (seconds)
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Delay between bounded retries (seconds)
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Bounded retry attempts for control-plane calls
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Member is considered stale after this many seconds without interaction
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Health monitor sweep interval (seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Outbound HTTP timeout (seconds)
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Depth of the inbound UDP packet queue
    #[serde(default = "default_udp_queue_depth")]
    pub udp_queue_depth: usize,
}

fn default_star_port() -> u16 {
    8000
}
fn default_galaxy_port() -> u16 {
    8100
}
fn default_group_id() -> String {
    "0".to_string()
}
fn default_max_members() -> usize {
    4
}
fn default_discovery_attempts() -> u32 {
    3
}
fn default_discovery_wait_secs() -> u64 {
    10
}
fn default_refresh_interval_secs() -> u64 {
    30
}
fn default_retry_delay_secs() -> u64 {
    10
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_stale_after_secs() -> u64 {
    60
}
fn default_sweep_interval_secs() -> u64 {
    5
}
fn default_http_timeout_secs() -> u64 {
    5
}
fn default_udp_queue_depth() -> usize {
    256
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            star_port: default_star_port(),
            galaxy_port: default_galaxy_port(),
            group_id: default_group_id(),
            max_members: default_max_members(),
            bind_ip: None,
            discovery_attempts: default_discovery_attempts(),
            discovery_wait_secs: default_discovery_wait_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            retry_attempts: default_retry_attempts(),
            stale_after_secs: default_stale_after_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            udp_queue_depth: default_udp_queue_depth(),
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> crate::Result<()> {
        if self.star_port == self.galaxy_port {
            return Err(crate::Error::InvalidConfig(
                "star_port and galaxy_port must differ".into(),
            ));
        }
        if self.max_members == 0 {
            return Err(crate::Error::InvalidConfig(
                "max_members must be at least 1".into(),
            ));
        }
        if self.group_id.is_empty() {
            return Err(crate::Error::InvalidConfig("group_id is required".into()));
        }
        Ok(())
    }
}
