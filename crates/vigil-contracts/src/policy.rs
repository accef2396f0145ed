//! Permission rule and call-history types.
//!
//! A rule set is an ordered list of `PermissionRule`s. The evaluator in
//! vigil-policy resolves a tool call to a `PermissionAction`; anything other
//! than `Allow` keeps the tool from running.

use serde::{Deserialize, Serialize};

use crate::error::{VigilError, VigilResult};

/// The decision a rule set produces for a single tool call.
///
/// Expressed in lowercase in TOML and JSON:
/// ```toml
/// action = "allow"
/// action = "deny"
/// action = "ask"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionAction {
    /// The call is dispatched.
    Allow,
    /// The call is answered with a permission-denied tool result.
    Deny,
    /// The conversation suspends until an external decision arrives.
    Ask,
}

impl std::fmt::Display for PermissionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PermissionAction::Allow => "allow",
            PermissionAction::Deny => "deny",
            PermissionAction::Ask => "ask",
        };
        f.write_str(s)
    }
}

/// A single `(tool, pattern?, action)` triple.
///
/// `tool` is either `"*"` (any tool) or an exact tool name. `pattern` is a
/// glob matched against the path-like arguments of the call (file path or
/// command string). Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub action: PermissionAction,
}

impl PermissionRule {
    /// The tool pattern that matches every tool name.
    pub const ANY_TOOL: &'static str = "*";

    /// Build a validated rule.
    ///
    /// Returns `VigilError::SchemaValidation` when `tool` is empty or the
    /// pattern is present but blank.
    pub fn new(
        tool: impl Into<String>,
        pattern: Option<String>,
        action: PermissionAction,
    ) -> VigilResult<Self> {
        let rule = Self {
            tool: tool.into(),
            pattern,
            action,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Shorthand for a rule without an argument pattern.
    pub fn for_tool(tool: impl Into<String>, action: PermissionAction) -> VigilResult<Self> {
        Self::new(tool, None, action)
    }

    /// Check the invariants `new` enforces. Deserialized rules go through
    /// this before they are stored in a rule set.
    pub fn validate(&self) -> VigilResult<()> {
        if self.tool.trim().is_empty() {
            return Err(VigilError::SchemaValidation {
                reason: "permission rule has an empty tool name".to_string(),
            });
        }
        if let Some(pattern) = &self.pattern {
            if pattern.is_empty() {
                return Err(VigilError::SchemaValidation {
                    reason: format!("permission rule for tool '{}' has an empty pattern", self.tool),
                });
            }
        }
        Ok(())
    }

    /// True when `tool` is the wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.tool == Self::ANY_TOOL
    }
}

/// One past tool invocation, used for repetition detection.
///
/// Appended by the conversation that dispatched the call; never shared
/// between conversations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    /// The call arguments as sent by the model. Absent arguments are `{}`.
    pub args: serde_json::Value,
    /// Milliseconds since the Unix epoch, from the engine's clock.
    pub timestamp_ms: i64,
}
