//! In-memory implementation of `SessionStore`.
//!
//! Each session gets its own chain. All chains live behind one `Mutex`, so
//! a store can be cloned into parallel plan steps; steps never share a
//! session, only the lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, warn};

use vigil_contracts::{
    error::{VigilError, VigilResult},
    message::Message,
};
use vigil_core::traits::SessionStore;

use crate::{
    chain::{hash_entry, verify_chain},
    event::{Transcript, TranscriptEntry},
};

#[derive(Debug, Default)]
pub(crate) struct SessionChain {
    pub(crate) entries: Vec<TranscriptEntry>,
}

impl SessionChain {
    fn head(&self) -> &str {
        self.entries
            .last()
            .map_or(TranscriptEntry::GENESIS_HASH, |e| e.this_hash.as_str())
    }
}

/// An append-only, hash-chained transcript store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTranscriptStore {
    pub(crate) sessions: Arc<Mutex<HashMap<String, SessionChain>>>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> VigilResult<MutexGuard<'_, HashMap<String, SessionChain>>> {
        self.sessions.lock().map_err(|e| VigilError::PersistenceFailed {
            reason: format!("transcript store lock poisoned: {e}"),
        })
    }

    /// Check one session's chain. Unknown sessions verify as empty chains.
    pub fn verify_integrity(&self, session_id: &str) -> bool {
        match self.lock() {
            Ok(sessions) => sessions
                .get(session_id)
                .map_or(true, |chain| verify_chain(&chain.entries)),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "integrity check could not read store");
                false
            }
        }
    }

    /// Export a snapshot of one session's chain.
    pub fn export_transcript(&self, session_id: &str) -> VigilResult<Transcript> {
        let sessions = self.lock()?;
        let entries = sessions
            .get(session_id)
            .map(|chain| chain.entries.clone())
            .unwrap_or_default();
        let head_hash = entries.last().map(|e| e.this_hash.clone()).unwrap_or_default();
        Ok(Transcript {
            session_id: session_id.to_string(),
            entries,
            exported_at: Utc::now(),
            head_hash,
        })
    }

    /// Ids of every session with at least one stored message, sorted.
    pub fn session_ids(&self) -> VigilResult<Vec<String>> {
        let mut ids: Vec<_> = self.lock()?.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

impl SessionStore for InMemoryTranscriptStore {
    fn append(&self, session_id: &str, message: &Message) -> VigilResult<()> {
        let mut sessions = self.lock()?;
        let chain = sessions.entry(session_id.to_string()).or_default();

        let sequence = chain.entries.len() as u64;
        let prev_hash = chain.head().to_string();
        let this_hash = hash_entry(session_id, sequence, message, &prev_hash)?;

        chain.entries.push(TranscriptEntry {
            sequence,
            session_id: session_id.to_string(),
            message: message.clone(),
            prev_hash,
            this_hash,
        });

        debug!(session_id = %session_id, sequence, role = ?message.role, "message appended to transcript");
        Ok(())
    }

    /// Messages in append order. Refuses to return a tampered chain.
    fn load(&self, session_id: &str) -> VigilResult<Vec<Message>> {
        let sessions = self.lock()?;
        let Some(chain) = sessions.get(session_id) else {
            return Ok(Vec::new());
        };
        if !verify_chain(&chain.entries) {
            warn!(session_id = %session_id, "transcript hash chain is broken");
            return Err(VigilError::PersistenceFailed {
                reason: format!("transcript for session '{session_id}' failed integrity check"),
            });
        }
        Ok(chain.entries.iter().map(|e| e.message.clone()).collect())
    }
}
