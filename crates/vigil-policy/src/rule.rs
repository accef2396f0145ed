//! Rule set types and configuration schema.
//!
//! A `RuleConfig` is deserialized from TOML and holds an ordered list of
//! `PermissionRule`s. `RuleSet` is the validated, compiled form the
//! evaluator runs against. The whole list is always scanned; later rules
//! override earlier ones.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use vigil_contracts::{
    error::{VigilError, VigilResult},
    policy::{PermissionAction, PermissionRule},
};

use crate::glob::GlobPattern;

/// The top-level structure deserialized from a TOML rules file.
///
/// Example:
/// ```toml
/// [[rules]]
/// tool = "write"
/// pattern = "*.md"
/// action = "allow"
///
/// [[rules]]
/// tool = "write"
/// action = "deny"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub rules: Vec<PermissionRule>,
}

/// A rule with its pattern compiled.
#[derive(Debug, Clone)]
pub(crate) struct CompiledRule {
    pub(crate) rule: PermissionRule,
    pub(crate) glob: Option<GlobPattern>,
}

impl CompiledRule {
    fn compile(rule: PermissionRule) -> VigilResult<Self> {
        rule.validate()?;
        let glob = rule.pattern.as_deref().map(GlobPattern::new).transpose()?;
        Ok(Self { rule, glob })
    }
}

/// An ordered, validated sequence of permission rules.
///
/// Immutable once built: combinators return a new set.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub(crate) rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Validate and compile `rules`, preserving their order.
    ///
    /// Returns `VigilError::SchemaValidation` for the first invalid rule;
    /// nothing is stored in that case.
    pub fn new(rules: Vec<PermissionRule>) -> VigilResult<Self> {
        let rules = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<VigilResult<Vec<_>>>()?;
        debug!(rule_count = rules.len(), "rule set compiled");
        Ok(Self { rules })
    }

    /// A set holding the single rule `* → allow`.
    pub fn allow_all() -> Self {
        Self {
            rules: vec![CompiledRule {
                rule: PermissionRule {
                    tool: PermissionRule::ANY_TOOL.to_string(),
                    pattern: None,
                    action: PermissionAction::Allow,
                },
                glob: None,
            }],
        }
    }

    /// Parse `s` as TOML and build a `RuleSet`.
    ///
    /// Returns `VigilError::ConfigError` if the TOML is malformed or does not
    /// match `RuleConfig`, and `SchemaValidation` if a rule is invalid.
    pub fn from_toml_str(s: &str) -> VigilResult<Self> {
        let config: RuleConfig = toml::from_str(s).map_err(|e| VigilError::ConfigError {
            reason: format!("failed to parse rules TOML: {e}"),
        })?;
        Self::new(config.rules)
    }

    /// Read the file at `path` and parse it as a TOML rules document.
    pub fn from_file(path: &Path) -> VigilResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| VigilError::ConfigError {
            reason: format!("failed to read rules file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Concatenate `base` and `overrides`. Because evaluation is
    /// last-match-wins, rules in `overrides` take precedence.
    pub fn merge(base: &RuleSet, overrides: &RuleSet) -> RuleSet {
        let mut rules = base.rules.clone();
        rules.extend(overrides.rules.iter().cloned());
        RuleSet { rules }
    }

    /// A new set with `rule` appended at the end.
    pub fn with_rule(&self, rule: PermissionRule) -> VigilResult<RuleSet> {
        let mut rules = self.rules.clone();
        rules.push(CompiledRule::compile(rule)?);
        Ok(RuleSet { rules })
    }

    pub fn rules(&self) -> impl Iterator<Item = &PermissionRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
