//! Conversation message types.
//!
//! A conversation exclusively owns its ordered message list. Messages are
//! appended, never edited or removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Provider-assigned call id, echoed back in the matching `ToolOutcome`.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// The result half of a tool outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutput {
    Success(Value),
    Error(String),
}

/// The answer to one `ToolInvocation`.
///
/// Policy refusals, repetition blocks, and tool failures all take the
/// `Error` shape; only the message text tells them apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub call_id: String,
    pub output: ToolOutput,
}

impl ToolOutcome {
    pub fn success(call_id: impl Into<String>, result: Value) -> Self {
        Self {
            call_id: call_id.into(),
            output: ToolOutput::Success(result),
        }
    }

    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: ToolOutput::Error(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.output, ToolOutput::Error(_))
    }

    /// Text placed in the `content` of the tool message carrying this outcome.
    pub fn render(&self) -> String {
        match &self.output {
            ToolOutput::Success(Value::String(s)) => s.clone(),
            ToolOutput::Success(v) => v.to_string(),
            ToolOutput::Error(msg) => format!("error: {msg}"),
        }
    }
}

/// One entry in a conversation transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolOutcome>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn build(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: None,
            tool_results: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::build(Role::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::build(Role::System, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::build(Role::Assistant, content)
    }

    /// An assistant turn that requested tools.
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolInvocation>,
    ) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::build(Role::Assistant, content)
        }
    }

    /// A tool message answering exactly one call.
    pub fn tool_result(outcome: ToolOutcome) -> Self {
        Self {
            tool_results: Some(vec![outcome.clone()]),
            ..Self::build(Role::Tool, outcome.render())
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }
}
