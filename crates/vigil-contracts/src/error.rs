//! Runtime error types for the vigil agent-execution engine.
//!
//! All fallible operations return `VigilResult<T>`. The first group of
//! variants is recoverable inside a conversation: the loop renders them into
//! tool-result text and keeps going. The rest are structural and are
//! returned to the immediate caller.

use thiserror::Error;

/// The unified error type for the vigil engine.
#[derive(Debug, Error)]
pub enum VigilError {
    /// The rule set resolved a tool call to `deny`.
    #[error("permission denied: tool '{tool}' is not allowed to run")]
    PermissionDenied { tool: String },

    /// The rule set resolved a tool call to `ask` and no decision was made.
    #[error("approval required: tool '{tool}' needs confirmation before it can run")]
    ApprovalRequired { tool: String },

    /// The same call was repeated too often inside the detection window.
    #[error("repeated call detected: tool '{tool}' was called with identical arguments too many times in a short period")]
    DoomLoopDetected { tool: String },

    /// A tool's `execute` failed, panicked, or timed out.
    #[error("tool '{tool}' failed: {reason}")]
    ToolExecution { tool: String, reason: String },

    /// The model asked for a tool that is not available to this conversation.
    #[error("tool '{tool}' does not exist")]
    ToolNotFound { tool: String },

    /// The model contract reported an error. Terminal for the current turn.
    #[error("model error: {reason}")]
    Model { reason: String },

    /// The cancellation token fired while the turn was in flight.
    #[error("conversation cancelled")]
    Cancelled,

    #[error("agent '{id}' not found")]
    AgentNotFound { id: String },

    #[error("plan '{id}' not found")]
    PlanNotFound { id: String },

    #[error("step '{step_id}' not found in plan '{plan_id}'")]
    StepNotFound { plan_id: String, step_id: String },

    /// A pending approval was handed back to a session it does not belong to.
    #[error("pending approval belongs to session '{expected}', not '{actual}'")]
    SessionMismatch { expected: String, actual: String },

    /// A rule, profile, plan, or tool argument failed validation.
    #[error("schema validation error: {reason}")]
    SchemaValidation { reason: String },

    /// An illegal step status transition was requested.
    #[error("state machine error: {reason}")]
    StateMachineError { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// The session store could not persist a message.
    ///
    /// Never fatal: the conversation loop reports it as a warning.
    #[error("persistence failed: {reason}")]
    PersistenceFailed { reason: String },
}

impl VigilError {
    /// True for the variants a conversation absorbs into its transcript.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VigilError::PermissionDenied { .. }
                | VigilError::ApprovalRequired { .. }
                | VigilError::DoomLoopDetected { .. }
                | VigilError::ToolExecution { .. }
                | VigilError::ToolNotFound { .. }
                | VigilError::SchemaValidation { .. }
        )
    }
}

/// Convenience alias used throughout the vigil crates.
pub type VigilResult<T> = Result<T, VigilError>;
