//! A deterministic stand-in for a language model.
//!
//! `ScriptedModel` replays canned turns. Each conversation is matched to a
//! script by the text of its first user message, and the turn to play is
//! the number of assistant messages already in the request. That keeps
//! replies deterministic when several plan steps share one model and run
//! in parallel.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use vigil_contracts::{
    error::VigilResult,
    message::{Role, ToolInvocation},
    usage::Usage,
};
use vigil_core::traits::{Model, ModelEvent, ModelEventStream, ModelRequest};

/// One model turn, in stream order.
pub type ScriptedTurn = Vec<ModelEvent>;

/// Played once a script runs out of turns.
pub const FALLBACK_REPLY: &str = "Done.";

#[derive(Debug, Default)]
pub struct ScriptedModel {
    scripts: Vec<(String, Vec<ScriptedTurn>)>,
    fallback: Vec<ScriptedTurn>,
    invocations: AtomicUsize,
}

impl ScriptedModel {
    /// A model that plays `turns` for every conversation.
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            fallback: turns,
            ..Self::default()
        }
    }

    /// Play `turns` for conversations whose first user message starts with
    /// `prompt_prefix`. The first matching script wins.
    pub fn with_script(mut self, prompt_prefix: impl Into<String>, turns: Vec<ScriptedTurn>) -> Self {
        self.scripts.push((prompt_prefix.into(), turns));
        self
    }

    /// Total `invoke` calls so far, across all conversations.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    fn script_for(&self, request: &ModelRequest) -> &[ScriptedTurn] {
        let prompt = request
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .map_or("", |m| m.content.as_str());
        self.scripts
            .iter()
            .find(|(prefix, _)| prompt.starts_with(prefix.as_str()))
            .map_or(self.fallback.as_slice(), |(_, turns)| turns.as_slice())
    }
}

#[async_trait]
impl Model for ScriptedModel {
    async fn invoke(
        &self,
        request: ModelRequest,
        cancel: CancellationToken,
    ) -> VigilResult<ModelEventStream> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let index = request
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count();
        let events = self
            .script_for(&request)
            .get(index)
            .cloned()
            .unwrap_or_else(|| text(FALLBACK_REPLY, Usage::default()));
        debug!(model = %request.model, turn = index, events = events.len(), "scripted turn");

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for event in events {
                if cancel.is_cancelled() || tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

// ── Turn builders ─────────────────────────────────────────────────────────────

/// A turn that answers with `reply` and requests no tools.
pub fn text(reply: &str, usage: Usage) -> ScriptedTurn {
    vec![ModelEvent::TextDelta(reply.to_string()), ModelEvent::Finish(usage)]
}

/// A turn that requests `calls`, optionally preceded by some narration.
pub fn calls(narration: Option<&str>, calls: Vec<ToolInvocation>, usage: Usage) -> ScriptedTurn {
    let mut events: ScriptedTurn = narration
        .map(|n| ModelEvent::TextDelta(n.to_string()))
        .into_iter()
        .collect();
    events.extend(calls.into_iter().map(ModelEvent::ToolCall));
    events.push(ModelEvent::Finish(usage));
    events
}

/// A turn that ends with a provider error.
pub fn failure(reason: &str) -> ScriptedTurn {
    vec![ModelEvent::Error(reason.to_string())]
}

pub fn invocation(id: &str, name: &str, arguments: Value) -> ToolInvocation {
    ToolInvocation {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}
