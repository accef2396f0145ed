//! # vigil-scheduler
//!
//! Multi-agent plan execution. A plan is a dependency graph of steps; each
//! step is one agent running one conversation.
//!
//! - `PlanStore` holds plans and is the single path for status writes
//! - `get_ready_steps` computes the runnable set without side effects
//! - `PlanScheduler` validates new plans and executes them, fanning
//!   parallel-flagged steps out onto the tokio runtime and running serial
//!   steps one per round
//!
//! ```rust,ignore
//! let scheduler = PlanScheduler::new(SchedulerConfig::default(), agents, tools)?;
//! let plan = scheduler.create_plan("release", vec![
//!     StepSpec::new("lint", "reviewer", "lint the tree").parallel(),
//!     StepSpec::new("docs", "writer", "update CHANGELOG.md").parallel(),
//!     StepSpec::new("tag", "coder", "tag the release").depends_on(["lint", "docs"]),
//! ])?;
//! let result = scheduler.execute_plan(&plan.id, model, ExecuteOptions::default()).await?;
//! ```

pub mod scheduler;
pub mod store;

pub use scheduler::{get_ready_steps, ExecuteOptions, PlanScheduler, SchedulerConfig};
pub use store::PlanStore;

// ── Tests ─────────────────────────────────────────────────────────────────────
