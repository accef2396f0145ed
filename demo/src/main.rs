//! vigil Developer-Tools Reference Runtime - Demo CLI
//!
//! Runs one or all of the three reference scenarios, or evaluates a single
//! tool call against a rule set. Every scenario uses real vigil components
//! (rule evaluator, repeat detector, conversation loop, plan scheduler)
//! with a scripted model and a simulated workspace.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- policy-gate
//!   cargo run -p demo -- doom-loop
//!   cargo run -p demo -- release-plan
//!   cargo run -p demo -- evaluate --tool bash --args '{"command":"rm -rf /"}'
//!   cargo run -p demo -- --config vigil.toml run-all

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vigil_contracts::error::{VigilError, VigilResult};
use vigil_policy::RuleSet;
use vigil_ref_devtools::scenarios::{devtools_rules, doom_loop, policy_gate, release_plan};
use vigil_scheduler::SchedulerConfig;

// ── CLI definition ────────────────────────────────────────────────────────────

/// vigil: policy-gated agent runtime developer-tools demo.
///
/// Each subcommand runs one or all of the reference scenarios, showing
/// permission rules, repeat detection, and multi-agent plan execution.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "vigil developer-tools reference runtime demo",
    long_about = "Runs vigil reference scenarios showing permission rules,\n\
                  repeated-call detection, approvals, and plan scheduling."
)]
struct Cli {
    /// Scheduler config (TOML): `base_rules` and a `[conversation]` table.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all three scenarios in sequence.
    RunAll,
    /// Scenario 1: Policy Gate (allow / deny / ask + resume).
    PolicyGate,
    /// Scenario 2: Doom Loop (fourth identical call refused).
    DoomLoop,
    /// Scenario 3: Release Plan (parallel fan-out, failed step, blocked dependent).
    ReleasePlan,
    /// Evaluate one tool call against a rule set and print the verdict.
    Evaluate {
        /// Tool name, e.g. `write`.
        #[arg(long)]
        tool: String,
        /// Tool arguments as a JSON object.
        #[arg(long)]
        args: Option<String>,
        /// Rule file (TOML, `[[rules]]` tables). Defaults to the devtools rules.
        #[arg(long)]
        policy: Option<PathBuf>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug for every gate decision.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match load_config(cli.config.as_deref()) {
        Ok(config) => run(cli.command, &config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> VigilResult<SchedulerConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading scheduler config");
            SchedulerConfig::from_file(path)
        }
        None => Ok(SchedulerConfig::default()),
    }
}

// ── Command dispatch ──────────────────────────────────────────────────────────

async fn run(command: Command, config: &SchedulerConfig) -> VigilResult<()> {
    match command {
        Command::Evaluate { tool, args, policy } => {
            return evaluate(&tool, args.as_deref(), policy.as_deref());
        }
        Command::RunAll => {
            print_banner();
            policy_gate::run_scenario(&config.conversation).await?;
            doom_loop::run_scenario(&config.conversation).await?;
            release_plan::run_scenario(config).await?;
        }
        Command::PolicyGate => {
            print_banner();
            policy_gate::run_scenario(&config.conversation).await?;
        }
        Command::DoomLoop => {
            print_banner();
            doom_loop::run_scenario(&config.conversation).await?;
        }
        Command::ReleasePlan => {
            print_banner();
            release_plan::run_scenario(config).await?;
        }
    }
    println!("All selected scenarios completed successfully.");
    Ok(())
}

fn evaluate(tool: &str, args: Option<&str>, policy: Option<&std::path::Path>) -> VigilResult<()> {
    let rules = match policy {
        Some(path) => RuleSet::from_file(path)?,
        None => devtools_rules()?,
    };
    let args = args
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .map_err(|e| VigilError::ConfigError {
            reason: format!("--args is not valid JSON: {e}"),
        })?;

    let verdict = rules.evaluate(tool, args.as_ref());
    println!("{tool} {} → {verdict}", args.map(|a| a.to_string()).unwrap_or_default());
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("vigil — Policy-gated Agent Runtime");
    println!("Developer-Tools Reference Demo");
    println!("==================================");
    println!();
    println!("Gates applied to every tool call the model requests:");
    println!("  [1] Tool lookup: unknown tools are answered with an error");
    println!("  [2] Rule set evaluates (tool, arguments) → allow / deny / ask");
    println!("  [3] Ask suspends the conversation until a decision arrives");
    println!("  [4] Repeat detector refuses a call already made 3× in 60 s");
    println!("  [5] Dispatcher validates arguments, runs the tool with a timeout");
    println!();
}
