//! Hash-chain primitives.
//!
//! Hash input layout (bytes, in order):
//!   1. session_id as UTF-8 bytes
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. compact JSON of the message

use sha2::{Digest, Sha256};

use vigil_contracts::{
    error::{VigilError, VigilResult},
    message::Message,
};

use crate::event::TranscriptEntry;

/// Compute the lowercase hex SHA-256 of one entry's fields.
pub fn hash_entry(
    session_id: &str,
    sequence: u64,
    message: &Message,
    prev_hash: &str,
) -> VigilResult<String> {
    let message_json = serde_json::to_vec(message).map_err(|e| VigilError::PersistenceFailed {
        reason: format!("message could not be serialized for hashing: {e}"),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&message_json);

    Ok(hex::encode(hasher.finalize()))
}

/// True when every entry links to its predecessor, sequences are gapless,
/// and every stored hash matches its recomputed value. An empty chain is
/// valid.
pub fn verify_chain(entries: &[TranscriptEntry]) -> bool {
    let mut expected_prev = TranscriptEntry::GENESIS_HASH.to_string();

    for (position, entry) in entries.iter().enumerate() {
        if entry.sequence != position as u64 || entry.prev_hash != expected_prev {
            return false;
        }

        let recomputed =
            match hash_entry(&entry.session_id, entry.sequence, &entry.message, &entry.prev_hash) {
                Ok(hash) => hash,
                Err(_) => return false,
            };
        if entry.this_hash != recomputed {
            return false;
        }

        expected_prev = entry.this_hash.clone();
    }

    true
}
