//! System prompt assembly.
//!
//! A prompt is a list of sections joined by blank lines: identity, agent
//! persona, available tools, working rules, project context, and an
//! optional caller-supplied section.

use std::path::{Path, PathBuf};

use chrono::Utc;

use vigil_contracts::agent::AgentProfile;

use crate::traits::ToolDescriptor;

const HEADER: &str = "# Vigil agent runtime\n\n\
You are an autonomous software engineering agent. You work in small, verifiable \
steps and use the provided tools for every file operation and command.";

const RULES: &str = "## Working rules\n\n\
1. Read a file before changing it.\n\
2. Prefer tools over pasting code into the reply.\n\
3. Make incremental changes and verify each one.\n\
4. Follow the project's existing conventions.\n\
5. Avoid destructive commands; some calls need approval and may be refused.\n\
6. If a tool result says a call was denied or repeated too often, change approach.";

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    agent_name: Option<String>,
    persona: Option<String>,
    model: Option<String>,
    tools: Vec<ToolDescriptor>,
    project_root: Option<PathBuf>,
    custom: Option<String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take name, persona, and model from `profile`.
    pub fn agent(mut self, profile: &AgentProfile) -> Self {
        self.agent_name = Some(profile.name.clone());
        self.model = Some(profile.model.clone());
        if !profile.system_prompt.trim().is_empty() {
            self.persona = Some(profile.system_prompt.clone());
        }
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }

    pub fn project_root(mut self, root: impl AsRef<Path>) -> Self {
        self.project_root = Some(root.as_ref().to_path_buf());
        self
    }

    pub fn custom(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.trim().is_empty() {
            self.custom = Some(text);
        }
        self
    }

    pub fn sections(&self) -> Vec<String> {
        let mut sections = vec![HEADER.to_string()];

        if let Some(persona) = &self.persona {
            sections.push(persona.clone());
        }

        if !self.tools.is_empty() {
            let listing = self
                .tools
                .iter()
                .map(|t| format!("- **{}**: {}", t.name, t.description))
                .collect::<Vec<_>>()
                .join("\n");
            sections.push(format!("## Available tools\n\n{listing}"));
        }

        sections.push(RULES.to_string());

        if let Some(root) = &self.project_root {
            sections.push(format!(
                "## Project context\n\n\
                 - **Working directory**: {}\n\
                 - **Platform**: {}\n\
                 - **Date**: {}\n\n\
                 All file paths are relative to the working directory.",
                root.display(),
                std::env::consts::OS,
                Utc::now().format("%Y-%m-%d"),
            ));
        }

        if let Some(name) = &self.agent_name {
            sections.push(format!("Current agent: {name}"));
        }
        if let Some(model) = &self.model {
            sections.push(format!("Current model: {model}"));
        }
        if let Some(custom) = &self.custom {
            sections.push(custom.clone());
        }
        sections
    }

    pub fn build(&self) -> String {
        self.sections().join("\n\n")
    }
}
