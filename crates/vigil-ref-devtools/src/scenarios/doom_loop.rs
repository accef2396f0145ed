//! Scenario 2: Doom Loop
//!
//! A coder agent keeps re-running the same failing build. The first three
//! identical calls reach the (simulated) shell; the fourth is answered with
//! a repeated-call error instead, and the model changes approach.
//!
//! The loop runs on a manual clock, so every call lands inside the
//! detection window regardless of how fast the host is.

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use vigil_contracts::{error::VigilResult, usage::Usage};
use vigil_core::{
    traits::{AgentRegistry, Model},
    ConversationOutcome, InMemoryAgentRegistry, LoopConfig, ManualClock, Session, TurnContext,
};
use vigil_policy::RuleSet;

use crate::{
    model::{calls, invocation, text, ScriptedModel},
    scenarios::{devtools_rules, engine, print_exchanges, tool_exchanges},
    workspace::{devtools_registry, Workspace},
};

const TASK: &str = "The release build is broken, please fix it";
const BUILD: &str = "cargo build --release";
const START_MS: i64 = 1_700_000_000_000;

pub struct DoomLoopReport {
    pub outcome: ConversationOutcome,
    pub session: Session,
    pub workspace: Workspace,
    /// Indexes (into the tool exchanges) of calls the detector refused.
    pub blocked: Vec<usize>,
}

fn script() -> ScriptedModel {
    let build_turn = |id: &str| {
        calls(
            Some("Retrying the build."),
            vec![invocation(id, "bash", json!({ "command": BUILD }))],
            Usage::new(300, 24, 324),
        )
    };
    ScriptedModel::new(vec![
        build_turn("b1"),
        build_turn("b2"),
        build_turn("b3"),
        build_turn("b4"),
        calls(
            Some("Retrying is not helping; running the tests to narrow it down."),
            vec![invocation("t1", "bash", json!({ "command": "cargo test" }))],
            Usage::new(340, 30, 370),
        ),
        text(
            "The tests pass, so the failure is in the release profile only. The typo \
             `itemz` in src/lib.rs needs fixing.",
            Usage::new(360, 40, 400),
        ),
    ])
}

pub async fn play(config: &LoopConfig) -> VigilResult<DoomLoopReport> {
    let agents = InMemoryAgentRegistry::with_presets();
    let profile = agents.get_agent_profile("coder")?;
    let rules = RuleSet::merge(&devtools_rules()?, &RuleSet::new(profile.rules.clone())?);

    let workspace = Workspace::seeded();
    let tools = devtools_registry(&workspace)?.subset(profile.tool_names.as_slice());
    let engine = engine(config).with_clock(Arc::new(ManualClock::new(START_MS)));

    let model: Arc<dyn Model> = Arc::new(script());
    let mut session = Session::new("doom loop", &profile.model);
    let mut ctx = TurnContext::new(model, tools).with_rules(rules);

    let outcome = engine.run(&mut session, &mut ctx, TASK, CancellationToken::new()).await;
    let blocked = tool_exchanges(&session)
        .iter()
        .enumerate()
        .filter(|(_, (_, _, result))| result.contains("repeated call detected"))
        .map(|(i, _)| i)
        .collect();

    Ok(DoomLoopReport {
        outcome,
        session,
        workspace,
        blocked,
    })
}

/// Run Scenario 2 and show where the repeat detector stepped in.
pub async fn run_scenario(config: &LoopConfig) -> VigilResult<()> {
    println!("=== Scenario 2: Doom Loop ===");
    println!();
    println!(
        "  Detector: {} identical call(s) within {} ms block the next one",
        config.doom_loop.threshold, config.doom_loop.window_ms
    );
    println!();

    let report = play(config).await?;

    println!("  Tool calls:");
    print_exchanges(&report.session);
    println!();
    println!("  Commands that reached the shell: {}", report.workspace.command_log().len());
    println!("  Calls refused by the detector:   {}", report.blocked.len());
    println!("  Finish reason:                   {}", report.outcome.finish_reason);
    println!("  Model turns:                     {}", report.outcome.iterations);
    println!();
    println!("  Scenario 2 complete.");
    println!();

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use vigil_contracts::conversation::FinishReason;
    use vigil_policy::DoomLoopDetector;

    use super::*;

    #[tokio::test]
    async fn test_fourth_identical_build_is_blocked() {
        let report = play(&LoopConfig::default()).await.unwrap();

        assert_eq!(report.outcome.finish_reason, FinishReason::Stop);
        assert_eq!(report.outcome.iterations, 6);
        assert_eq!(report.blocked, vec![3]);
        assert_eq!(
            report.workspace.command_log(),
            vec![BUILD, BUILD, BUILD, "cargo test"]
        );
    }

    #[tokio::test]
    async fn test_higher_threshold_lets_every_build_through() {
        let config = LoopConfig {
            doom_loop: DoomLoopDetector { threshold: 5, ..DoomLoopDetector::default() },
            ..LoopConfig::default()
        };
        let report = play(&config).await.unwrap();

        assert!(report.blocked.is_empty());
        assert_eq!(report.workspace.command_log().len(), 5);
    }

    #[tokio::test]
    async fn test_usage_covers_every_turn() {
        let report = play(&LoopConfig::default()).await.unwrap();
        assert_eq!(report.outcome.usage.total_tokens, 4 * 324 + 370 + 400);
    }
}
