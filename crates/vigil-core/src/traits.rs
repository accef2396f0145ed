//! Contracts the engine depends on but does not implement.
//!
//! - `Model`            : untrusted; proposes text and tool calls
//! - `Tool`             : untrusted; the only place side effects happen
//! - `AgentRegistry`    : resolves agent ids to profiles
//! - `SessionStore`     : durable transcript sink
//! - `ArgumentValidator`: checks tool arguments against a tool's schema
//! - `ApprovalHandler`  : answers calls a rule set resolved to `ask`
//!
//! The conversation loop never dispatches a `Tool` unless the rule set
//! allowed the call and the repeat detector did not trip.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use vigil_contracts::{
    agent::AgentProfile,
    conversation::ApprovalDecision,
    error::VigilResult,
    message::{Message, ToolInvocation, ToolOutcome},
    usage::Usage,
};

use crate::conversation::PendingApproval;

/// What a tool tells the model about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub input_schema: Value,
}

/// Everything the model sees for one turn.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Model reference from the session (opaque to the engine).
    pub model: String,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDescriptor>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// One event in a model response, in stream order:
/// `TextDelta* ToolCall* ToolResult* (Finish | Error)`.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    TextDelta(String),
    ToolCall(ToolInvocation),
    /// A result for a call the provider executed itself. Informational only.
    ToolResult(ToolOutcome),
    Finish(Usage),
    Error(String),
}

/// The receiving half of a model response stream.
pub type ModelEventStream = mpsc::Receiver<ModelEvent>;

/// A language model, backed by a provider the engine knows nothing about.
#[async_trait]
pub trait Model: Send + Sync {
    /// Start one model turn and return its event stream.
    ///
    /// Implementations should stop producing events once `cancel` fires.
    /// An `Err` here is treated exactly like a stream `Error` event.
    async fn invoke(
        &self,
        request: ModelRequest,
        cancel: CancellationToken,
    ) -> VigilResult<ModelEventStream>;
}

/// An executable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn describe(&self) -> ToolDescriptor;

    /// Run the tool. May fail; the dispatcher turns failures into data.
    async fn execute(&self, args: Value) -> VigilResult<Value>;

    /// Per-tool execution bound. `None` uses the dispatcher default.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

pub trait AgentRegistry: Send + Sync {
    /// Returns `VigilError::AgentNotFound` for an unknown id.
    fn get_agent_profile(&self, id: &str) -> VigilResult<AgentProfile>;
}

/// Durable storage for a session's ordered message list.
///
/// The loop appends after every mutation. Failures are reported to the
/// caller as warnings and never abort a conversation.
pub trait SessionStore: Send + Sync {
    fn append(&self, session_id: &str, message: &Message) -> VigilResult<()>;

    fn load(&self, session_id: &str) -> VigilResult<Vec<Message>>;
}

pub trait ArgumentValidator: Send + Sync {
    /// Reject a schema that cannot be compiled. Called at tool registration.
    fn check_schema(&self, schema: &Value) -> VigilResult<()>;

    /// Check `args` against `schema`, returning `SchemaValidation` on mismatch.
    fn validate(&self, schema: &Value, args: &Value) -> VigilResult<()>;
}

/// Decides `ask` calls on behalf of a human or an automated reviewer.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn decide(&self, pending: &PendingApproval) -> ApprovalDecision;
}
