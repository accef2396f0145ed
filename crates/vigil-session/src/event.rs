//! Transcript entry and export types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vigil_contracts::message::Message;

/// One message in a session's hash chain.
///
/// `this_hash` commits to `session_id`, `sequence`, `prev_hash`, and the
/// full message, so any change to a stored entry breaks the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Position in the session's chain, starting at 0.
    pub sequence: u64,
    pub session_id: String,
    pub message: Message,
    /// `this_hash` of the previous entry, or `GENESIS_HASH` for entry 0.
    pub prev_hash: String,
    pub this_hash: String,
}

impl TranscriptEntry {
    /// The `prev_hash` of the first entry in every chain.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// A point-in-time export of one session's chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub session_id: String,
    pub entries: Vec<TranscriptEntry>,
    pub exported_at: DateTime<Utc>,
    /// `this_hash` of the last entry; empty for an empty transcript.
    pub head_hash: String,
}

impl Transcript {
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().map(|e| &e.message)
    }
}
