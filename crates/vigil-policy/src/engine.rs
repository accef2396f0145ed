//! Permission evaluation.
//!
//! Evaluation algorithm (last match wins, deny by default):
//!
//! 1. Scan every rule front to back; skip rules whose tool is neither `"*"`
//!    nor the requested tool name.
//! 2. A rule with a pattern only matches when one of the call's path-like
//!    arguments (`filePath`, `file_path`, `path`, `file`, `command`) matches
//!    the glob. A matching patterned rule for the exact tool name returns its
//!    action immediately.
//! 3. Otherwise remember the matching action. An exact-tool match always
//!    overwrites what was remembered; a wildcard match only does so while no
//!    exact-tool rule has matched yet.
//! 4. If nothing matched, the answer is `Deny`.

use serde_json::Value;
use tracing::{debug, warn};

use vigil_contracts::policy::PermissionAction;

use crate::{glob::GlobPattern, rule::RuleSet};

/// Argument keys inspected by patterned rules, in lookup order.
pub const PATH_ARGUMENT_KEYS: [&str; 5] = ["filePath", "file_path", "path", "file", "command"];

/// Resolve `tool_name` with `args` against `rules`.
///
/// Pure and deterministic: the same rule set, tool name, and arguments
/// always give the same action.
pub fn evaluate(rules: &RuleSet, tool_name: &str, args: Option<&Value>) -> PermissionAction {
    let mut result = PermissionAction::Deny;
    let mut exact_seen = false;
    let mut any_seen = false;

    for compiled in &rules.rules {
        let rule = &compiled.rule;
        let exact = rule.tool == tool_name;
        if !exact && !rule.is_wildcard() {
            continue;
        }

        if let Some(glob) = &compiled.glob {
            let Some(args) = args else {
                continue;
            };
            if !arguments_match(glob, args) {
                continue;
            }
            if exact {
                debug!(
                    tool = %tool_name,
                    pattern = %glob.as_str(),
                    action = %rule.action,
                    "patterned rule matched; short-circuiting"
                );
                return rule.action;
            }
        }

        if exact {
            exact_seen = true;
            result = rule.action;
        } else if !exact_seen {
            result = rule.action;
        }
        any_seen = true;
    }

    if any_seen {
        debug!(tool = %tool_name, action = %result, "permission resolved");
    } else {
        warn!(tool = %tool_name, "no permission rule matched; denying by default");
    }
    result
}

impl RuleSet {
    /// Method form of [`evaluate`].
    pub fn evaluate(&self, tool_name: &str, args: Option<&Value>) -> PermissionAction {
        evaluate(self, tool_name, args)
    }
}

fn arguments_match(glob: &GlobPattern, args: &Value) -> bool {
    let Some(map) = args.as_object() else {
        return false;
    };
    PATH_ARGUMENT_KEYS
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_str))
        .any(|candidate| glob.matches(candidate))
}
