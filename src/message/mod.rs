//! Message handling: store, validation, relay and fan-out

pub mod service;
pub mod store;

pub use service::{MessageService, WireVersion};
pub use store::{MessageRecord, MessageStore};
