//! Conversation outcome vocabulary shared by the loop and the scheduler.

use serde::{Deserialize, Serialize};

/// Why a conversation turn stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// The model answered without requesting tools.
    Stop,
    /// The model contract reported an error.
    Error,
    /// The cancellation token fired.
    Cancelled,
    /// A tool call needs an external decision; see `PendingApproval`.
    Suspended,
    /// The configured iteration bound was reached with tools still requested.
    IterationLimit,
}

impl FinishReason {
    /// True when a plan step ending this way counts as failed.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            FinishReason::Error | FinishReason::Cancelled | FinishReason::IterationLimit
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Error => "error",
            FinishReason::Cancelled => "cancelled",
            FinishReason::Suspended => "suspended",
            FinishReason::IterationLimit => "iteration-limit",
        }
    }
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The answer to a suspended `ask` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approve,
    Deny,
}
