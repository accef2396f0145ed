//! Agent profile types.
//!
//! Profiles are created when a registry is loaded and are immutable for the
//! duration of a run. The engine never inspects `system_prompt` beyond
//! passing it to the model.

use serde::{Deserialize, Serialize};

use crate::{
    error::{VigilError, VigilResult},
    policy::PermissionRule,
};

/// Everything the engine needs to run one agent's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Stable identifier, used by plan steps to refer to this agent.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: String,
    /// Model reference (e.g. a provider model id). Opaque to the engine.
    pub model: String,
    /// Names of the tools this agent may see, resolved against a tool registry.
    #[serde(default)]
    pub tool_names: Vec<String>,
    /// Agent-specific rules, appended after the host's base rules.
    #[serde(default)]
    pub rules: Vec<PermissionRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl AgentProfile {
    /// Inclusive temperature range accepted by the model contract.
    pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f32> = 0.0..=2.0;

    /// Reject profiles that must never be stored.
    pub fn validate(&self) -> VigilResult<()> {
        for (field, value) in [("id", &self.id), ("name", &self.name), ("model", &self.model)] {
            if value.trim().is_empty() {
                return Err(VigilError::SchemaValidation {
                    reason: format!("agent profile field '{field}' must not be empty"),
                });
            }
        }

        if let Some(t) = self.temperature {
            if !Self::TEMPERATURE_RANGE.contains(&t) {
                return Err(VigilError::SchemaValidation {
                    reason: format!(
                        "agent '{}' temperature {t} is outside {:?}",
                        self.id,
                        Self::TEMPERATURE_RANGE
                    ),
                });
            }
        }

        if self.max_output_tokens == Some(0) {
            return Err(VigilError::SchemaValidation {
                reason: format!("agent '{}' max_output_tokens must be positive", self.id),
            });
        }

        for rule in &self.rules {
            rule.validate()?;
        }

        Ok(())
    }
}
