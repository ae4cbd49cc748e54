//! # starmesh
//!
//! A self-organizing hierarchical overlay network:
//! - UDP broadcast discovery and first-responder coordinator election
//! - Per-group "stars" with admission control and health monitoring
//! - Coordinator-to-coordinator federation into a "galaxy"
//! - Message relay with deduplication and fan-out across stars
//!
//! ## Architecture
//!
//! ```text
//!        ┌─────────────┐   HELLO? I AM <star>   ┌─────────────┐
//!        │  SOL (star A)│◄──────────────────────►│  SOL (star B)│
//!        │  directory   │   HTTP /v1/star CRUD   │  directory   │
//!        └──────┬───────┘   HTTP /v2/messages    └──────┬───────┘
//!               │ HELLO? / HTTP /v1/system              │
//!       ┌───────┴───────┐                        ┌──────┴───────┐
//!       │ member  member│                        │ member       │
//!       └───────────────┘                        └──────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! starmesh-node serve --star-port 8000 --galaxy-port 8100 --group 42 --max-members 4
//! ```
//!
//! A booting node broadcasts `HELLO?` on the star port. If a coordinator
//! answers, the node registers as a member and refreshes its liveness every
//! 30 seconds. If nobody answers after three attempts, the node promotes
//! itself to coordinator, announces its star on the galaxy port, and starts
//! accepting members and federated messages.

pub mod common;
pub mod galaxy;
pub mod http;
pub mod message;
pub mod node;
pub mod star;
pub mod transport;

// Re-export commonly used types
pub use common::{Config, Error, Rejection, Result};
pub use node::Node;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
