//! Intra-star plumbing: discovery, member directory, member agent, health

pub mod directory;
pub mod discovery;
pub mod health;
pub mod member;

pub use directory::{MemberRecord, StarDirectory};
pub use discovery::Discovery;
pub use health::HealthMonitor;
pub use member::MemberAgent;
