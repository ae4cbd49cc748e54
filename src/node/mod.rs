//! Node runtime: process-wide state and the serve loop

pub mod server;
pub mod state;

pub use server::Node;
pub use state::{NodeRole, NodeState, SolInfo};
