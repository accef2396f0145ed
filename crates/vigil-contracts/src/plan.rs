//! Plan and step types.
//!
//! A `Plan` is a dependency graph of `TaskStep`s. The scheduler is the only
//! writer of step status; every step moves `Pending → Running →
//! {Completed | Failed}` exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::usage::Usage;

/// Lifecycle of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    /// True when `self → next` is one of the three legal transitions.
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Running, StepStatus::Completed)
                | (StepStatus::Running, StepStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Caller input for one step of a new plan.
///
/// `id` may be left empty, in which case the scheduler assigns a UUID; it
/// must be set for any step another step depends on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(default)]
    pub id: Option<String>,
    pub agent_id: String,
    pub prompt: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub parallel: bool,
}

impl StepSpec {
    pub fn new(id: impl Into<String>, agent_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            agent_id: agent_id.into(),
            prompt: prompt.into(),
            depends_on: Vec::new(),
            parallel: false,
        }
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }
}

/// One agent running one conversation, inside a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    pub id: String,
    pub agent_id: String,
    pub prompt: String,
    pub depends_on: Vec<String>,
    pub parallel: bool,
    pub status: StepStatus,
}

/// A dependency-ordered set of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub title: String,
    pub steps: Vec<TaskStep>,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn step(&self, step_id: &str) -> Option<&TaskStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn all_completed(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }
}

/// What one executed step produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub agent_id: String,
    pub success: bool,
    /// Final assistant text, or the error message when the step could not run.
    pub output: String,
    pub usage: Usage,
}

/// Aggregate result of executing a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    pub plan_id: String,
    /// Step results in the order the steps were dispatched.
    pub results: Vec<StepResult>,
    pub all_completed: bool,
    pub total_usage: Usage,
}
