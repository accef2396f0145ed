//! # vigil-session
//!
//! Append-only, SHA-256 hash-chained transcript storage for vigil
//! conversations.
//!
//! ## Overview
//!
//! Every message a conversation appends is wrapped in a `TranscriptEntry`
//! that links to the previous entry of the same session through its hash.
//! Editing any stored message, even by one byte, breaks the chain and is
//! caught by `verify_chain`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vigil_session::InMemoryTranscriptStore;
//!
//! let store = InMemoryTranscriptStore::new();
//! let engine = ConversationLoop::new(config).with_store(Arc::new(store.clone()));
//! // ... run a conversation ...
//! assert!(store.verify_integrity(&session.id));
//! let transcript = store.export_transcript(&session.id)?;
//! ```

pub mod chain;
pub mod event;
pub mod memory;

pub use chain::{hash_entry, verify_chain};
pub use event::{Transcript, TranscriptEntry};
pub use memory::InMemoryTranscriptStore;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use vigil_contracts::{
        error::VigilError,
        message::{Message, ToolInvocation, ToolOutcome},
    };
    use vigil_core::{traits::SessionStore, Session};

    use super::{verify_chain, InMemoryTranscriptStore, TranscriptEntry};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn conversation() -> Vec<Message> {
        let call = ToolInvocation {
            id: "c1".to_string(),
            name: "read".to_string(),
            arguments: serde_json::json!({ "path": "README.md" }),
        };
        vec![
            Message::user("summarise the readme"),
            Message::assistant_with_tool_calls("", vec![call]),
            Message::tool_result(ToolOutcome::success("c1", serde_json::json!("# vigil"))),
            Message::assistant("It is a one-line readme."),
        ]
    }

    fn filled_store(session_id: &str) -> InMemoryTranscriptStore {
        let store = InMemoryTranscriptStore::new();
        for message in conversation() {
            store.append(session_id, &message).unwrap();
        }
        store
    }

    // ── Chain ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_hash_chain_integrity() {
        let store = filled_store("s-1");
        assert!(store.verify_integrity("s-1"));
        assert!(store.verify_integrity("never-written"));
    }

    #[test]
    fn test_first_entry_links_to_genesis() {
        let transcript = filled_store("s-1").export_transcript("s-1").unwrap();
        assert_eq!(transcript.entries[0].prev_hash, TranscriptEntry::GENESIS_HASH);
        for pair in transcript.entries.windows(2) {
            assert_eq!(pair[1].prev_hash, pair[0].this_hash);
        }
        assert_eq!(transcript.head_hash, transcript.entries[3].this_hash);
    }

    #[test]
    fn test_sequence_is_gapless_per_session() {
        let store = filled_store("s-1");
        store.append("s-2", &Message::user("other")).unwrap();

        let first = store.export_transcript("s-1").unwrap();
        let seqs: Vec<_> = first.entries.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, [0, 1, 2, 3]);

        let second = store.export_transcript("s-2").unwrap();
        assert_eq!(second.entries[0].sequence, 0);
        assert_eq!(second.entries[0].prev_hash, TranscriptEntry::GENESIS_HASH);
        assert_eq!(store.session_ids().unwrap(), ["s-1", "s-2"]);
    }

    #[test]
    fn test_tamper_detection() {
        let store = filled_store("s-1");
        {
            let mut sessions = store.sessions.lock().unwrap();
            let chain = sessions.get_mut("s-1").unwrap();
            chain.entries[2].message.content = "TAMPERED".to_string();
        }

        assert!(!store.verify_integrity("s-1"), "edited message must break the chain");
        match store.load("s-1") {
            Err(VigilError::PersistenceFailed { reason }) => assert!(reason.contains("integrity")),
            other => panic!("expected PersistenceFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_reordering_entries_is_detected() {
        let mut entries = filled_store("s-1").export_transcript("s-1").unwrap().entries;
        assert!(verify_chain(&entries));
        entries.swap(1, 2);
        assert!(!verify_chain(&entries));
    }

    // ── Load ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_load_round_trips_into_a_session() {
        let store = filled_store("s-1");
        let messages = store.load("s-1").unwrap();
        let exported: Vec<_> = store.export_transcript("s-1").unwrap().messages().cloned().collect();
        assert_eq!(messages, exported);

        let session = Session::restore("s-1", "readme", "model-a", messages);
        assert_eq!(session.messages().len(), 4);
        assert!(session.messages()[1].has_tool_calls());
        assert_eq!(session.last_message().unwrap().content, "It is a one-line readme.");
    }

    #[test]
    fn test_load_unknown_session_is_empty() {
        assert!(InMemoryTranscriptStore::new().load("ghost").unwrap().is_empty());
    }
}
