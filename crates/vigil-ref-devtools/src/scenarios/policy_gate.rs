//! Scenario 1: Policy Gate
//!
//! One coder conversation against the devtools rule set. The scripted model
//! asks for six tool calls, and each lands on a different rule:
//!
//!   read  README.md          → allow (blanket `*` rule)
//!   write docs/counting.md   → allow (`write **/*.md`)
//!   write Cargo.toml         → deny  (`write` fallback)
//!   bash  rm -rf /           → deny  (`bash rm -rf *`)
//!   write src/lib.rs         → ask   → approved, then dispatched
//!   bash  git push …         → ask   → refused
//!
//! Every appended message goes to a hash-chained transcript store, which
//! is verified at the end.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use vigil_contracts::{
    conversation::ApprovalDecision,
    error::VigilResult,
    message::ToolInvocation,
    usage::Usage,
};
use vigil_core::{
    traits::{AgentRegistry, Model},
    ConversationOutcome, InMemoryAgentRegistry, LoopConfig, PromptBuilder, Session, TurnContext,
};
use vigil_policy::RuleSet;
use vigil_session::InMemoryTranscriptStore;

use crate::{
    model::{calls, invocation, text, ScriptedModel},
    scenarios::{devtools_rules, engine, print_exchanges},
    workspace::{devtools_registry, Workspace},
};

const TASK: &str = "Document the widget counter and publish the change";

/// What a run of the scenario left behind.
pub struct PolicyGateReport {
    pub outcome: ConversationOutcome,
    pub session: Session,
    pub workspace: Workspace,
    /// Each suspension, with the decision it received.
    pub approvals: Vec<(String, ApprovalDecision)>,
    pub transcript_verified: bool,
    pub transcript_len: usize,
}

fn script() -> ScriptedModel {
    ScriptedModel::new(vec![
        calls(
            None,
            vec![
                invocation("c1", "read", json!({ "file_path": "README.md" })),
                invocation(
                    "c2",
                    "write",
                    json!({
                        "file_path": "docs/counting.md",
                        "content": "# Counting\n\n`count` returns the number of items.\n"
                    }),
                ),
                invocation(
                    "c3",
                    "write",
                    json!({
                        "file_path": "Cargo.toml",
                        "content": "[package]\nname = \"widget\"\nversion = \"1.0.0\"\n"
                    }),
                ),
                invocation("c4", "bash", json!({ "command": "rm -rf /" })),
            ],
            Usage::new(420, 96, 516),
        ),
        calls(
            None,
            vec![invocation(
                "c5",
                "write",
                json!({
                    "file_path": "src/lib.rs",
                    "content": "/// Number of items.\npub fn count(items: &[u8]) -> usize {\n    items.len()\n}\n"
                }),
            )],
            Usage::new(610, 74, 684),
        ),
        calls(
            None,
            vec![invocation("c6", "bash", json!({ "command": "git push origin main" }))],
            Usage::new(700, 20, 720),
        ),
        text(
            "Documented `count` in docs/counting.md and src/lib.rs. The version bump and \
             the push were refused; a maintainer should handle those.",
            Usage::new(760, 38, 798),
        ),
    ])
}

/// Source edits are approved; anything else that asks is refused.
fn maintainer_decision(call: &ToolInvocation) -> ApprovalDecision {
    if call.name == "write" {
        ApprovalDecision::Approve
    } else {
        ApprovalDecision::Deny
    }
}

/// Run the conversation, resuming each suspension by hand.
pub async fn play(config: &LoopConfig) -> VigilResult<PolicyGateReport> {
    let agents = InMemoryAgentRegistry::with_presets();
    let profile = agents.get_agent_profile("coder")?;
    let rules = RuleSet::merge(&devtools_rules()?, &RuleSet::new(profile.rules.clone())?);

    let workspace = Workspace::seeded();
    let tools = devtools_registry(&workspace)?.subset(profile.tool_names.as_slice());
    let store = InMemoryTranscriptStore::new();
    let engine = engine(config).with_store(Arc::new(store.clone()));

    let model: Arc<dyn Model> = Arc::new(script());
    let prompt = PromptBuilder::new().agent(&profile).tools(tools.descriptors()).build();
    let mut session = Session::new("policy gate", &profile.model);
    let mut ctx = TurnContext::new(model, tools).with_rules(rules).with_system_prompt(prompt);

    let cancel = CancellationToken::new();
    let mut outcome = engine.run(&mut session, &mut ctx, TASK, cancel.clone()).await;
    let mut approvals = Vec::new();
    while let Some(pending) = outcome.pending.take() {
        let decision = maintainer_decision(&pending.invocation);
        approvals.push((pending.invocation.name.clone(), decision));
        outcome = engine
            .resume(&mut session, &mut ctx, pending, decision, cancel.clone())
            .await?;
    }

    let transcript_verified = store.verify_integrity(&session.id);
    let transcript_len = store.export_transcript(&session.id)?.entries.len();
    Ok(PolicyGateReport {
        outcome,
        session,
        workspace,
        approvals,
        transcript_verified,
        transcript_len,
    })
}

/// Run Scenario 1 and print each gate decision.
pub async fn run_scenario(config: &LoopConfig) -> VigilResult<()> {
    println!("=== Scenario 1: Policy Gate ===");
    println!();

    let rules = devtools_rules()?;
    println!("  Rule verdicts (devtools.toml):");
    let probes: [(&str, Value); 5] = [
        ("read", json!({ "file_path": "README.md" })),
        ("write", json!({ "file_path": "docs/counting.md" })),
        ("write", json!({ "file_path": "Cargo.toml" })),
        ("write", json!({ "file_path": "src/lib.rs" })),
        ("bash", json!({ "command": "git push origin main" })),
    ];
    for (tool, args) in &probes {
        let verdict = rules.evaluate(tool, Some(args));
        println!("    {:<6} {:<40} → {}", tool, args.to_string(), verdict);
    }
    println!();

    let report = play(config).await?;

    println!("  Agent: Coder    Task: {TASK}");
    println!("  Tool calls:");
    print_exchanges(&report.session);
    println!();
    for (tool, decision) in &report.approvals {
        println!("  Suspended on '{tool}', maintainer decision: {decision:?}");
    }
    println!("  Finish reason:          {}", report.outcome.finish_reason);
    println!("  Final answer:           {}", report.outcome.output());
    println!("  Total tokens:           {}", report.outcome.usage.total_tokens);
    println!(
        "  Transcript integrity:   {} ({} message(s) in chain)",
        if report.transcript_verified { "VERIFIED" } else { "FAILED" },
        report.transcript_len
    );
    println!();
    println!("  Scenario 1 complete.");
    println!();

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
