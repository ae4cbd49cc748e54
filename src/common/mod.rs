//! Common utilities and types shared across starmesh

pub mod config;
pub mod error;
pub mod utils;

pub use config::{Config, NodeConfig};
pub use error::{Error, Rejection, Result};
pub use utils::{
    detect_local_ip, first_line, is_email_address, is_member_id, random_node_id, star_id,
    timestamp_now,
};
