//! Explicit, caller-owned stores for tools and agent profiles.
//!
//! Nothing here is process-global: callers build a registry, hand it to the
//! loop or scheduler, and tests construct isolated instances.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use vigil_contracts::{
    agent::AgentProfile,
    error::{VigilError, VigilResult},
    policy::{PermissionAction, PermissionRule},
};

use crate::traits::{AgentRegistry, ArgumentValidator, Tool, ToolDescriptor};

/// Tools keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    validator: Option<Arc<dyn ArgumentValidator>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that checks each tool's input schema at registration.
    pub fn with_validator(validator: Arc<dyn ArgumentValidator>) -> Self {
        Self {
            tools: BTreeMap::new(),
            validator: Some(validator),
        }
    }

    /// Add `tool`, replacing any tool already registered under its name.
    ///
    /// Returns `SchemaValidation` for a blank name or, when a validator is
    /// configured, an input schema it cannot compile.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> VigilResult<()> {
        let descriptor = tool.describe();
        if descriptor.name.trim().is_empty() {
            return Err(VigilError::SchemaValidation {
                reason: "tool name must not be empty".to_string(),
            });
        }
        if let Some(validator) = &self.validator {
            validator.check_schema(&descriptor.input_schema)?;
        }
        if self.tools.insert(descriptor.name.clone(), tool).is_some() {
            debug!(tool = %descriptor.name, "tool re-registered");
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Look up `names` in order, skipping unknown names.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Vec<Arc<dyn Tool>> {
        names
            .iter()
            .filter_map(|name| {
                let name = name.as_ref();
                let found = self.get(name);
                if found.is_none() {
                    warn!(tool = %name, "requested tool is not registered; skipping");
                }
                found
            })
            .collect()
    }

    /// A registry holding only the tools named in `names`.
    pub fn subset<S: AsRef<str>>(&self, names: &[S]) -> ToolRegistry {
        let tools = self
            .resolve(names)
            .into_iter()
            .map(|tool| (tool.describe().name, tool))
            .collect();
        ToolRegistry {
            tools,
            validator: self.validator.clone(),
        }
    }

    /// Descriptors for every registered tool, ordered by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.describe()).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("validating", &self.validator.is_some())
            .finish()
    }
}

/// Model reference used by the built-in profiles.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet";

/// Agent profiles keyed by id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAgentRegistry {
    agents: HashMap<String, AgentProfile>,
}

impl InMemoryAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry seeded with the built-in profiles from [`preset_profiles`].
    pub fn with_presets() -> Self {
        let agents = preset_profiles()
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        Self { agents }
    }

    /// Validate and insert `profile`, replacing any profile with the same id.
    pub fn register(&mut self, profile: AgentProfile) -> VigilResult<()> {
        profile.validate()?;
        debug!(agent_id = %profile.id, "agent profile registered");
        self.agents.insert(profile.id.clone(), profile);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<AgentProfile> {
        self.agents.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// All profiles, ordered by id.
    pub fn list(&self) -> Vec<&AgentProfile> {
        let mut profiles: Vec<_> = self.agents.values().collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }
}

impl AgentRegistry for InMemoryAgentRegistry {
    fn get_agent_profile(&self, id: &str) -> VigilResult<AgentProfile> {
        self.agents
            .get(id)
            .cloned()
            .ok_or_else(|| VigilError::AgentNotFound { id: id.to_string() })
    }
}

fn preset(
    id: &str,
    name: &str,
    description: &str,
    system_prompt: &str,
    tools: &[&str],
    rules: Vec<PermissionRule>,
) -> AgentProfile {
    AgentProfile {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        system_prompt: system_prompt.to_string(),
        model: DEFAULT_MODEL.to_string(),
        tool_names: tools.iter().map(|t| t.to_string()).collect(),
        rules,
        temperature: None,
        max_output_tokens: None,
    }
}

fn rule(tool: &str, pattern: Option<&str>, action: PermissionAction) -> PermissionRule {
    PermissionRule {
        tool: tool.to_string(),
        pattern: pattern.map(str::to_string),
        action,
    }
}

/// The six built-in agent profiles.
///
/// Read-only roles deny `write`; the planner may only write Markdown.
pub fn preset_profiles() -> Vec<AgentProfile> {
    use PermissionAction::{Allow, Deny};

    let read_only = || vec![rule("write", None, Deny)];
    vec![
        preset(
            "coder",
            "Coder",
            "Primary coding agent for general programming tasks",
            "You are a professional programming assistant fluent in many languages and frameworks.",
            &["read", "write", "bash"],
            vec![rule("bash", Some("rm -rf *"), Deny)],
        ),
        preset(
            "architect",
            "Architect",
            "System design and code review",
            "You are a senior systems architect focused on code design and review.",
            &["read", "bash"],
            read_only(),
        ),
        preset(
            "explorer",
            "Explorer",
            "Code search and analysis",
            "You are a code analysis expert who searches and explains codebases.",
            &["read", "bash"],
            read_only(),
        ),
        preset(
            "writer",
            "Writer",
            "Documentation and comments",
            "You are a technical writer who produces clear documentation and comments.",
            &["read", "write"],
            vec![],
        ),
        preset(
            "reviewer",
            "Reviewer",
            "Code review and quality checks",
            "You are a code quality reviewer focused on readability and good practice.",
            &["read", "bash"],
            read_only(),
        ),
        preset(
            "planner",
            "Planner",
            "Task planning and requirements analysis",
            "You are a project planner who analyses requirements and drafts plans.",
            &["read", "write"],
            vec![rule("write", Some("*.md"), Allow), rule("write", None, Deny)],
        ),
    ]
}
