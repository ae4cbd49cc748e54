//! HTTP control plane: routers for both ports and the outbound peer client

pub mod client;
pub mod galaxy_api;
pub mod star_api;

pub use client::PeerClient;
