//! Developer-tools reference scenarios.
//!
//! Each scenario wires real vigil components (rule set, conversation loop,
//! dispatcher with schema validation, transcript store, scheduler) to the
//! scripted model and the in-memory workspace, and prints what happened.

use std::collections::HashMap;
use std::sync::Arc;

use vigil_contracts::{
    error::VigilResult,
    message::{Role, ToolInvocation},
};
use vigil_core::{ConversationLoop, LoopConfig, Session, ToolDispatcher};
use vigil_policy::RuleSet;
use vigil_schema::JsonSchemaValidator;

pub mod doom_loop;
pub mod policy_gate;
pub mod release_plan;

/// Embedded rule set shared by all scenarios.
pub const DEVTOOLS_POLICY: &str = include_str!("../../policies/devtools.toml");

pub fn devtools_rules() -> VigilResult<RuleSet> {
    RuleSet::from_toml_str(DEVTOOLS_POLICY)
}

/// A loop whose dispatcher validates tool arguments against their schemas.
pub(crate) fn engine(config: &LoopConfig) -> ConversationLoop {
    let dispatcher = ToolDispatcher::new(config.tool_timeout())
        .with_validator(Arc::new(JsonSchemaValidator::new()));
    ConversationLoop::new(config.clone()).with_dispatcher(dispatcher)
}

/// `(tool, arguments, rendered result)` for every answered call, in order.
pub fn tool_exchanges(session: &Session) -> Vec<(String, String, String)> {
    let mut calls: HashMap<&str, &ToolInvocation> = HashMap::new();
    let mut exchanges = Vec::new();
    for message in session.messages() {
        for call in message.tool_calls.iter().flatten() {
            calls.insert(call.id.as_str(), call);
        }
        if message.role != Role::Tool {
            continue;
        }
        for outcome in message.tool_results.iter().flatten() {
            let (name, args) = calls
                .get(outcome.call_id.as_str())
                .map_or(("?".to_string(), String::new()), |c| {
                    (c.name.clone(), c.arguments.to_string())
                });
            exchanges.push((name, args, outcome.render()));
        }
    }
    exchanges
}

pub(crate) fn print_exchanges(session: &Session) {
    for (tool, args, result) in tool_exchanges(session) {
        let first_line = result.lines().next().unwrap_or_default();
        println!("    {tool:<6} {args}");
        println!("           → {first_line}");
    }
}
