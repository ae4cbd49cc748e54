//! In-memory message store kept by each coordinator
//!
//! Messages are never physically removed; deletion blanks the body and
//! flips the status, keeping the id occupied for deduplication.

use crate::common::{timestamp_now, Rejection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

/// A message in wire form.
///
/// The status field travels as `msg-type`, an oddity of the wire format
/// kept for compatibility. Optional fields are omitted when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub star: Option<String>,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub sender: String,
    #[serde(rename = "msg-id", default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed: Option<u64>,
    #[serde(default)]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "msg-type", default)]
    pub status: String,
    #[serde(rename = "from-star", default, skip_serializing_if = "Option::is_none")]
    pub from_star: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received: Option<u64>,
    #[serde(rename = "to-star", default, skip_serializing_if = "Option::is_none")]
    pub to_star: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered: Option<u64>,
}

impl MessageRecord {
    /// The star a message id is bound to (the segment after the last colon).
    pub fn id_star(id: &str) -> Option<&str> {
        id.rsplit_once(':').map(|(_, star)| star)
    }
}

#[derive(Default)]
pub struct MessageStore {
    messages: RwLock<HashMap<String, MessageRecord>>,
    nonce: AtomicU32,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic local counter used when minting message ids.
    pub fn next_nonce(&self) -> u32 {
        self.nonce.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    pub fn insert(&self, record: MessageRecord) {
        if let Some(id) = record.msg_id.clone() {
            self.messages
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .insert(id, record);
        }
    }

    pub fn get(&self, id: &str) -> Option<MessageRecord> {
        self.messages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn all(&self) -> Vec<MessageRecord> {
        self.messages
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Blank the body and mark the message deleted. Deleting twice is an
    /// authorization error, not an idempotent no-op.
    pub fn mark_deleted(&self, id: &str) -> Result<(), Rejection> {
        let mut messages = self.messages.write().unwrap_or_else(|e| e.into_inner());
        let Some(record) = messages.get_mut(id) else {
            return Err(Rejection::NotFound);
        };
        if record.status == "deleted" {
            return Err(Rejection::Unauthorized);
        }
        record.status = "deleted".to_string();
        record.message = None;
        record.changed = Some(timestamp_now());
        Ok(())
    }
}
