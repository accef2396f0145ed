//! # vigil-core
//!
//! The policy-gated conversation runtime for vigil agents.
//!
//! This crate provides:
//! - The external contracts (`Model`, `Tool`, `AgentRegistry`,
//!   `SessionStore`, `ArgumentValidator`, `ApprovalHandler`, `Clock`)
//! - `ToolRegistry` and `InMemoryAgentRegistry`, explicit caller-owned stores
//! - `ToolDispatcher`, the only place tool side effects happen
//! - `ConversationLoop`, which alternates between the model and tool calls,
//!   consulting the rule set and repeat detector before every dispatch
//! - `PromptBuilder` for assembling an agent's system prompt
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vigil_core::{ConversationLoop, LoopConfig, Session, TurnContext};
//!
//! let engine = ConversationLoop::new(LoopConfig::default());
//! let mut session = Session::new("triage", "model-a");
//! let mut ctx = TurnContext::new(model, tools).with_rules(rules);
//! let outcome = engine.run(&mut session, &mut ctx, "fix the build", cancel).await;
//! ```

pub mod clock;
pub mod conversation;
pub mod dispatcher;
pub mod prompt;
pub mod registry;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use conversation::{
    ConversationLoop, ConversationOutcome, LoopConfig, PendingApproval, Session, TurnContext,
};
pub use dispatcher::ToolDispatcher;
pub use prompt::PromptBuilder;
pub use registry::{InMemoryAgentRegistry, ToolRegistry};

// ── Tests ─────────────────────────────────────────────────────────────────────
