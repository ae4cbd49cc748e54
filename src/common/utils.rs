//! Utility functions for starmesh

use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::net::IpAddr;

/// Get current Unix timestamp (seconds)
pub fn timestamp_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Generate a random 4-digit node identifier in [1000, 9999].
///
/// Not guaranteed unique; the coordinator rejects duplicates at admission.
pub fn random_node_id() -> String {
    rand::thread_rng().gen_range(1000..=9999).to_string()
}

/// Derive a star identifier from the coordinator address, group id and
/// coordinator node id. Deterministic, computed once at promotion.
pub fn star_id(address: IpAddr, group_id: &str, node_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(address.to_string().as_bytes());
    hasher.update(group_id.as_bytes());
    hasher.update(node_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Is this a well-formed member id (numeric, in [1000, 9999])?
pub fn is_member_id(value: &str) -> bool {
    matches!(value.parse::<u32>(), Ok(n) if (1000..=9999).contains(&n))
}

/// Syntactic email check for message origins: exactly one `@` separating a
/// non-empty local part from a dotted, whitespace-free domain.
pub fn is_email_address(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    if value.chars().any(char::is_whitespace) || domain.contains('@') {
        return false;
    }
    domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// Trim a message subject to its first line, discarding carriage returns.
pub fn first_line(subject: &str) -> String {
    subject
        .replace('\r', "")
        .split('\n')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Detect the local address by opening a UDP socket towards a public
/// address. No packet is sent; the kernel just picks the outbound interface.
pub fn detect_local_ip() -> IpAddr {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|sock| {
            sock.connect("8.8.8.8:80")?;
            sock.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or_else(|_| IpAddr::from([127, 0, 0, 1]))
}
