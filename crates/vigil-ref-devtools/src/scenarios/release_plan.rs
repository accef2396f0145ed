//! Scenario 3: Release Plan
//!
//! Five agents cut a release through the plan scheduler:
//!
//!   tests ─────┐
//!              ├─► bump ──┐
//!   changelog ─┘          ├─► publish
//!   audit ────────────────┘
//!
//! `tests`, `changelog` and `audit` fan out in parallel. `audit` hits a
//! provider error and fails, so `publish` never becomes ready, while `bump`
//! still runs once its own dependencies are done. Its attempt to edit
//! `Cargo.toml` is refused by policy; the step still completes because a
//! refused call is just data to the model.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use vigil_contracts::{
    error::VigilResult,
    plan::{Plan, PlanResult, StepSpec},
    usage::Usage,
};
use vigil_core::{traits::Model, InMemoryAgentRegistry};
use vigil_scheduler::{ExecuteOptions, PlanScheduler, SchedulerConfig};

use crate::{
    model::{calls, failure, invocation, text, ScriptedModel},
    scenarios::{devtools_rules, engine},
    workspace::{devtools_registry, Workspace},
};

pub struct ReleasePlanReport {
    pub result: PlanResult,
    pub plan: Plan,
    pub workspace: Workspace,
}

fn steps() -> Vec<StepSpec> {
    vec![
        StepSpec::new("tests", "coder", "Run the test suite").parallel(),
        StepSpec::new("changelog", "writer", "Update CHANGELOG.md for 0.4.0").parallel(),
        StepSpec::new("audit", "reviewer", "Audit dependencies for advisories").parallel(),
        StepSpec::new("bump", "coder", "Bump the version in Cargo.toml to 0.4.0")
            .depends_on(["tests", "changelog"]),
        StepSpec::new("publish", "coder", "Publish the release")
            .depends_on(["audit", "bump"]),
    ]
}

fn script() -> ScriptedModel {
    ScriptedModel::new(vec![])
        .with_script(
            "Run the test suite",
            vec![
                calls(
                    None,
                    vec![invocation("t1", "bash", json!({ "command": "cargo test" }))],
                    Usage::new(200, 20, 220),
                ),
                text("All tests pass.", Usage::new(240, 10, 250)),
            ],
        )
        .with_script(
            "Update CHANGELOG.md",
            vec![
                calls(
                    None,
                    vec![invocation(
                        "w1",
                        "write",
                        json!({
                            "file_path": "CHANGELOG.md",
                            "content": "# Changelog\n\n## 0.4.0\n\n- Document `count`.\n"
                        }),
                    )],
                    Usage::new(180, 40, 220),
                ),
                text("CHANGELOG.md now has a 0.4.0 section.", Usage::new(230, 12, 242)),
            ],
        )
        .with_script(
            "Audit dependencies",
            vec![failure("rate limited by provider")],
        )
        .with_script(
            "Bump the version",
            vec![
                calls(
                    None,
                    vec![invocation(
                        "v1",
                        "write",
                        json!({
                            "file_path": "Cargo.toml",
                            "content": "[package]\nname = \"widget\"\nversion = \"0.4.0\"\n"
                        }),
                    )],
                    Usage::new(210, 30, 240),
                ),
                text(
                    "Editing Cargo.toml is not permitted for me; the version needs a \
                     maintainer.",
                    Usage::new(260, 18, 278),
                ),
            ],
        )
}

pub async fn play(config: &SchedulerConfig) -> VigilResult<ReleasePlanReport> {
    let workspace = Workspace::seeded();
    let tools = devtools_registry(&workspace)?;

    let mut scheduler_config = config.clone();
    scheduler_config.base_rules.extend(devtools_rules()?.rules().cloned());
    let scheduler = PlanScheduler::new(
        scheduler_config,
        Arc::new(InMemoryAgentRegistry::with_presets()),
        tools,
    )?
    .with_engine(engine(&config.conversation));

    let plan = scheduler.create_plan("widget 0.4.0", steps())?;
    let model: Arc<dyn Model> = Arc::new(script());
    let options = ExecuteOptions {
        project_root: Some(PathBuf::from("/work/widget")),
        ..ExecuteOptions::default()
    };
    let result = scheduler.execute_plan(&plan.id, model, options).await?;
    let plan = scheduler.get_plan(&plan.id)?;

    Ok(ReleasePlanReport {
        result,
        plan,
        workspace,
    })
}

/// Run Scenario 3 and print per-step results and final statuses.
pub async fn run_scenario(config: &SchedulerConfig) -> VigilResult<()> {
    println!("=== Scenario 3: Release Plan ===");
    println!();

    let report = play(config).await?;

    println!("  Plan: {} ({} steps)", report.plan.title, report.plan.steps.len());
    println!("  Results, in dispatch order:");
    for r in &report.result.results {
        println!(
            "    {:<10} {:<9} {:<5} {}",
            r.step_id,
            r.agent_id,
            if r.success { "ok" } else { "FAIL" },
            r.output
        );
    }
    println!();
    println!("  Final step status:");
    for step in &report.plan.steps {
        println!("    {:<10} {}", step.id, step.status);
    }
    println!();
    println!("  All completed:          {}", report.result.all_completed);
    println!("  Total tokens:           {}", report.result.total_usage.total_tokens);
    println!();
    println!("  Scenario 3 complete.");
    println!();

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use vigil_contracts::plan::StepStatus;

    use super::*;

    #[tokio::test]
    async fn test_release_plan_results() {
        let report = play(&SchedulerConfig::default()).await.unwrap();
        let result = &report.result;

        let order: Vec<&str> = result.results.iter().map(|r| r.step_id.as_str()).collect();
        assert_eq!(order, vec!["tests", "changelog", "audit", "bump"]);

        let success: Vec<bool> = result.results.iter().map(|r| r.success).collect();
        assert_eq!(success, vec![true, true, false, true]);
        assert!(result.results[2].output.contains("rate limited"));
        assert!(!result.all_completed);
        assert_eq!(result.total_usage.total_tokens, 220 + 250 + 220 + 242 + 240 + 278);
    }

    #[tokio::test]
    async fn test_release_plan_statuses_and_side_effects() {
        let report = play(&SchedulerConfig::default()).await.unwrap();
        let status = |id: &str| report.plan.step(id).map(|s| s.status);

        assert_eq!(status("audit"), Some(StepStatus::Failed));
        assert_eq!(status("bump"), Some(StepStatus::Completed));
        assert_eq!(status("publish"), Some(StepStatus::Pending));

        assert!(report.workspace.read("CHANGELOG.md").unwrap().contains("0.4.0"));
        assert!(report.workspace.read("Cargo.toml").unwrap().contains("0.3.0"));
        assert_eq!(report.workspace.command_log(), vec!["cargo test"]);
    }
}
