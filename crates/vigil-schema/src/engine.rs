//! Schema-based argument validator.
//!
//! `JsonSchemaValidator` implements `ArgumentValidator` from `vigil-core`.
//! Validation runs in two phases:
//!
//! 1. **Structural**: the arguments are validated against the tool's input
//!    schema with the `jsonschema` crate.
//! 2. **Custom**: every registered check runs against the arguments.
//!
//! All failures are collected before returning, so the model sees every
//! problem with its call at once.

use tracing::{debug, warn};

use serde_json::Value;

use vigil_contracts::error::{VigilError, VigilResult};
use vigil_core::traits::ArgumentValidator;

/// A host-supplied argument check.
///
/// Returns `Some(message)` when the arguments are unacceptable.
pub type ArgumentCheckFn = Box<dyn Fn(&Value) -> Option<String> + Send + Sync>;

pub struct JsonSchemaValidator {
    checks: Vec<(String, ArgumentCheckFn)>,
}

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// Add a named check that runs after structural validation on every call.
    /// Checks run in registration order.
    pub fn register_check(&mut self, name: impl Into<String>, check: ArgumentCheckFn) {
        self.checks.push((name.into(), check));
    }

    /// Builder form of [`register_check`](Self::register_check).
    pub fn with_check(mut self, name: impl Into<String>, check: ArgumentCheckFn) -> Self {
        self.register_check(name, check);
        self
    }
}

impl Default for JsonSchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSchemaValidator")
            .field("checks", &self.checks.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

impl ArgumentValidator for JsonSchemaValidator {
    fn check_schema(&self, schema: &Value) -> VigilResult<()> {
        jsonschema::validator_for(schema)
            .map(|_| ())
            .map_err(|e| VigilError::SchemaValidation {
                reason: format!("invalid JSON Schema document: {e}"),
            })
    }

    /// A `null` schema means "no structural constraint".
    fn validate(&self, schema: &Value, args: &Value) -> VigilResult<()> {
        let mut failures: Vec<String> = Vec::new();

        if !schema.is_null() {
            let validator = jsonschema::validator_for(schema).map_err(|e| {
                VigilError::SchemaValidation {
                    reason: format!("invalid JSON Schema document: {e}"),
                }
            })?;
            for error in validator.iter_errors(args) {
                let path = error.instance_path.to_string();
                let path = if path.is_empty() { "/".to_string() } else { path };
                failures.push(format!("{path}: {error}"));
            }
        }

        for (name, check) in &self.checks {
            debug!(check = %name, "running argument check");
            if let Some(message) = check(args) {
                failures.push(format!("{name}: {message}"));
            }
        }

        if failures.is_empty() {
            return Ok(());
        }
        let reason = failures.join("; ");
        warn!(failures = %reason, "tool arguments failed validation");
        Err(VigilError::SchemaValidation { reason })
    }
}
