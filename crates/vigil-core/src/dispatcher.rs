//! The single boundary where tool side effects happen.
//!
//! `dispatch` never returns an error: validation failures, tool errors,
//! panics, and timeouts all come back as `ToolOutput::Error` so the model
//! sees them as ordinary tool results.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use vigil_contracts::{
    error::VigilError,
    message::{ToolInvocation, ToolOutcome},
};

use crate::traits::{ArgumentValidator, Tool};

/// Default execution bound for tools that do not declare their own.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct ToolDispatcher {
    validator: Option<Arc<dyn ArgumentValidator>>,
    default_timeout: Duration,
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT)
    }
}

impl ToolDispatcher {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            validator: None,
            default_timeout,
        }
    }

    /// Validate arguments against each tool's input schema before running it.
    pub fn with_validator(mut self, validator: Arc<dyn ArgumentValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Run `invocation` against `tool` and report the result.
    pub async fn dispatch(&self, tool: Arc<dyn Tool>, invocation: &ToolInvocation) -> ToolOutcome {
        let call_id = invocation.id.clone();
        let tool_name = invocation.name.clone();

        if let Some(validator) = &self.validator {
            let schema = tool.describe().input_schema;
            if let Err(e) = validator.validate(&schema, &invocation.arguments) {
                warn!(tool = %tool_name, call_id = %call_id, error = %e, "tool arguments rejected");
                return ToolOutcome::error(call_id, e.to_string());
            }
        }

        let timeout = tool.timeout().unwrap_or(self.default_timeout);
        let args = invocation.arguments.clone();
        debug!(tool = %tool_name, call_id = %call_id, "dispatching tool call");

        let handle =
            tokio::spawn(async move { tokio::time::timeout(timeout, tool.execute(args)).await });

        let failure = match handle.await {
            Ok(Ok(Ok(result))) => {
                debug!(tool = %tool_name, call_id = %call_id, "tool call succeeded");
                return ToolOutcome::success(call_id, result);
            }
            Ok(Ok(Err(e))) => e,
            Ok(Err(_)) => {
                warn!(tool = %tool_name, timeout_secs = timeout.as_secs(), "tool call timed out");
                VigilError::ToolExecution {
                    tool: tool_name.clone(),
                    reason: format!("timed out after {}s", timeout.as_secs()),
                }
            }
            Err(join_err) if join_err.is_panic() => {
                let payload = join_err.into_panic();
                let cause = payload
                    .downcast_ref::<String>()
                    .map(String::as_str)
                    .or_else(|| payload.downcast_ref::<&str>().copied())
                    .unwrap_or("unknown cause");
                error!(tool = %tool_name, cause = %cause, "tool panicked");
                VigilError::ToolExecution {
                    tool: tool_name.clone(),
                    reason: format!("crashed: {cause}"),
                }
            }
            Err(_) => VigilError::ToolExecution {
                tool: tool_name.clone(),
                reason: "task was cancelled".to_string(),
            },
        };

        debug!(tool = %tool_name, call_id = %call_id, error = %failure, "tool call failed");
        ToolOutcome::error(call_id, failure.to_string())
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field("validating", &self.validator.is_some())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
