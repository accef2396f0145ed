//! Plan creation and execution.
//!
//! `execute_plan` walks the dependency graph in rounds. Each round takes the
//! ready set, fans its parallel steps out onto the runtime, joins them, and
//! then runs the first serial step. Rounds are bounded by `steps + 1`, so a
//! cyclic or stuck plan ends instead of spinning.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vigil_contracts::{
    error::{VigilError, VigilResult},
    plan::{Plan, PlanResult, StepResult, StepSpec, StepStatus, TaskStep},
    policy::{PermissionAction, PermissionRule},
    usage::Usage,
};
use vigil_core::{
    traits::{AgentRegistry, ApprovalHandler, Model},
    ConversationLoop, ConversationOutcome, LoopConfig, PromptBuilder, Session, ToolRegistry,
    TurnContext,
};
use vigil_policy::RuleSet;

use crate::store::PlanStore;

const TITLE_PROMPT_CHARS: usize = 50;

/// Scheduler settings, loadable from a TOML file:
///
/// ```toml
/// [[base_rules]]
/// tool = "*"
/// action = "allow"
///
/// [conversation]
/// max_iterations = 16
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Placed in front of every agent's own rules.
    pub base_rules: Vec<PermissionRule>,
    pub conversation: LoopConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            base_rules: vec![PermissionRule {
                tool: PermissionRule::ANY_TOOL.to_string(),
                pattern: None,
                action: PermissionAction::Allow,
            }],
            conversation: LoopConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(s: &str) -> VigilResult<Self> {
        toml::from_str(s).map_err(|e| VigilError::ConfigError {
            reason: format!("failed to parse scheduler config: {e}"),
        })
    }

    pub fn from_file(path: &Path) -> VigilResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| VigilError::ConfigError {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }
}

/// Per-execution inputs.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Shown to every step's agent in its system prompt.
    pub project_root: Option<PathBuf>,
    /// Cancels every in-flight step and stops further rounds.
    pub cancel: CancellationToken,
}

/// Steps whose status is pending and whose dependencies have all completed.
///
/// A failed dependency keeps its dependents out of this set for good.
pub fn get_ready_steps(plan: &Plan) -> Vec<&TaskStep> {
    let completed: HashSet<&str> = plan
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Completed)
        .map(|s| s.id.as_str())
        .collect();

    plan.steps
        .iter()
        .filter(|s| s.status == StepStatus::Pending)
        .filter(|s| s.depends_on.iter().all(|d| completed.contains(d.as_str())))
        .collect()
}

/// Builds plans and drives them to completion.
pub struct PlanScheduler {
    store: PlanStore,
    agents: Arc<dyn AgentRegistry>,
    tools: ToolRegistry,
    engine: ConversationLoop,
    base_rules: RuleSet,
    approvals: Option<Arc<dyn ApprovalHandler>>,
}

impl PlanScheduler {
    /// Fails with `SchemaValidation` when a base rule is invalid.
    pub fn new(
        config: SchedulerConfig,
        agents: Arc<dyn AgentRegistry>,
        tools: ToolRegistry,
    ) -> VigilResult<Self> {
        let base_rules = RuleSet::new(config.base_rules)?;
        Ok(Self {
            store: PlanStore::new(),
            agents,
            tools,
            engine: ConversationLoop::new(config.conversation),
            base_rules,
            approvals: None,
        })
    }

    /// Share an existing store, e.g. one a UI also reads.
    pub fn with_store(mut self, store: PlanStore) -> Self {
        self.store = store;
        self
    }

    /// Replace the conversation loop, keeping its clock, session store and
    /// dispatcher for every step.
    pub fn with_engine(mut self, engine: ConversationLoop) -> Self {
        self.engine = engine;
        self
    }

    /// Answer `ask` suspensions. Without a handler a suspended step fails.
    pub fn with_approvals(mut self, approvals: Arc<dyn ApprovalHandler>) -> Self {
        self.approvals = Some(approvals);
        self
    }

    pub fn store(&self) -> &PlanStore {
        &self.store
    }

    pub fn get_plan(&self, plan_id: &str) -> VigilResult<Plan> {
        self.store.get(plan_id)
    }

    pub fn update_step_status(
        &self,
        plan_id: &str,
        step_id: &str,
        status: StepStatus,
    ) -> VigilResult<()> {
        self.store.update_step_status(plan_id, step_id, status)
    }

    /// Validate `steps` and store a new plan with every step pending.
    ///
    /// Nothing is stored if any check fails. Cycles are accepted; the
    /// execution bound takes care of them.
    pub fn create_plan(&self, title: impl Into<String>, steps: Vec<StepSpec>) -> VigilResult<Plan> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(VigilError::SchemaValidation {
                reason: "plan title must not be empty".to_string(),
            });
        }

        let mut built = Vec::with_capacity(steps.len());
        let mut seen = HashSet::new();
        for spec in steps {
            let id = match spec.id {
                Some(id) if id.trim().is_empty() => {
                    return Err(VigilError::SchemaValidation {
                        reason: "step id must not be blank".to_string(),
                    })
                }
                Some(id) => id,
                None => uuid::Uuid::new_v4().to_string(),
            };
            if !seen.insert(id.clone()) {
                return Err(VigilError::SchemaValidation {
                    reason: format!("duplicate step id '{id}'"),
                });
            }
            if spec.prompt.trim().is_empty() {
                return Err(VigilError::SchemaValidation {
                    reason: format!("step '{id}' has an empty prompt"),
                });
            }
            self.agents.get_agent_profile(&spec.agent_id)?;

            built.push(TaskStep {
                id,
                agent_id: spec.agent_id,
                prompt: spec.prompt,
                depends_on: spec.depends_on,
                parallel: spec.parallel,
                status: StepStatus::Pending,
            });
        }

        for step in &built {
            for dep in &step.depends_on {
                if dep == &step.id {
                    return Err(VigilError::SchemaValidation {
                        reason: format!("step '{}' depends on itself", step.id),
                    });
                }
                if !seen.contains(dep) {
                    return Err(VigilError::SchemaValidation {
                        reason: format!("step '{}' depends on unknown step '{dep}'", step.id),
                    });
                }
            }
        }

        let plan = Plan {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            steps: built,
            created_at: Utc::now(),
        };
        info!(plan_id = %plan.id, title = %plan.title, steps = plan.steps.len(), "plan created");
        self.store.insert(plan.clone());
        Ok(plan)
    }

    /// Run every reachable step of `plan_id` with `model`.
    ///
    /// Returns `PlanNotFound` before doing anything if the plan is unknown.
    /// Step failures never abort the run; they only block dependents.
    pub async fn execute_plan(
        &self,
        plan_id: &str,
        model: Arc<dyn Model>,
        options: ExecuteOptions,
    ) -> VigilResult<PlanResult> {
        let plan = self.store.get(plan_id)?;
        let max_rounds = plan.steps.len() + 1;
        let runner = StepRunner {
            agents: Arc::clone(&self.agents),
            tools: self.tools.clone(),
            engine: self.engine.clone(),
            base_rules: self.base_rules.clone(),
            approvals: self.approvals.clone(),
            model,
            project_root: options.project_root,
            cancel: options.cancel.clone(),
        };

        info!(plan_id, title = %plan.title, "plan execution starting");
        let mut results = Vec::new();
        let mut total_usage = Usage::default();

        for round in 0..max_rounds {
            if options.cancel.is_cancelled() {
                warn!(plan_id, round, "plan execution cancelled");
                break;
            }

            let snapshot = self.store.get(plan_id)?;
            let (parallel, serial): (Vec<TaskStep>, Vec<TaskStep>) =
                get_ready_steps(&snapshot).into_iter().cloned().partition(|s| s.parallel);
            if parallel.is_empty() && serial.is_empty() {
                break;
            }
            info!(
                plan_id,
                round,
                parallel = parallel.len(),
                serial = serial.len(),
                "ready steps"
            );

            if !parallel.is_empty() {
                for step in &parallel {
                    self.store.update_step_status(plan_id, &step.id, StepStatus::Running)?;
                }
                let fanned: Vec<(String, String)> = parallel
                    .iter()
                    .map(|s| (s.id.clone(), s.agent_id.clone()))
                    .collect();
                let handles = parallel.into_iter().map(|step| {
                    let runner = runner.clone();
                    tokio::spawn(async move { runner.run(step).await })
                });

                // Every joined result is recorded before a failed write is reported.
                let joined_all = join_all(handles).await;
                let mut first_err = None;
                for ((step_id, agent_id), joined) in fanned.into_iter().zip(joined_all) {
                    let result = joined.unwrap_or_else(|e| {
                        warn!(plan_id, step_id = %step_id, error = %e, "step task aborted");
                        StepResult {
                            step_id,
                            agent_id,
                            success: false,
                            output: format!("step task aborted: {e}"),
                            usage: Usage::default(),
                        }
                    });
                    if let Err(e) = self.record(plan_id, result, &mut results, &mut total_usage) {
                        warn!(plan_id, error = %e, "step result could not be recorded");
                        first_err.get_or_insert(e);
                    }
                }
                if let Some(e) = first_err {
                    return Err(e);
                }
            }

            if let Some(step) = serial.into_iter().next() {
                self.store.update_step_status(plan_id, &step.id, StepStatus::Running)?;
                let result = runner.clone().run(step).await;
                self.record(plan_id, result, &mut results, &mut total_usage)?;
            }
        }

        let all_completed = self.store.get(plan_id)?.all_completed();
        info!(
            plan_id,
            steps_run = results.len(),
            all_completed,
            total_tokens = total_usage.total_tokens,
            "plan execution finished"
        );
        Ok(PlanResult {
            plan_id: plan_id.to_string(),
            results,
            all_completed,
            total_usage,
        })
    }

    fn record(
        &self,
        plan_id: &str,
        result: StepResult,
        results: &mut Vec<StepResult>,
        total_usage: &mut Usage,
    ) -> VigilResult<()> {
        let status = if result.success {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        self.store.update_step_status(plan_id, &result.step_id, status)?;
        *total_usage += result.usage;
        results.push(result);
        Ok(())
    }
}

/// Everything one step needs, owned so it can move onto a spawned task.
#[derive(Clone)]
struct StepRunner {
    agents: Arc<dyn AgentRegistry>,
    tools: ToolRegistry,
    engine: ConversationLoop,
    base_rules: RuleSet,
    approvals: Option<Arc<dyn ApprovalHandler>>,
    model: Arc<dyn Model>,
    project_root: Option<PathBuf>,
    cancel: CancellationToken,
}

impl StepRunner {
    async fn run(self, step: TaskStep) -> StepResult {
        info!(step_id = %step.id, agent = %step.agent_id, "step starting");
        let result = match self.converse(&step).await {
            Ok(outcome) => step_result(&step, &outcome),
            Err(e) => {
                warn!(step_id = %step.id, error = %e, "step could not run");
                StepResult {
                    step_id: step.id.clone(),
                    agent_id: step.agent_id.clone(),
                    success: false,
                    output: e.to_string(),
                    usage: Usage::default(),
                }
            }
        };
        info!(step_id = %step.id, success = result.success, "step finished");
        result
    }

    async fn converse(&self, step: &TaskStep) -> VigilResult<ConversationOutcome> {
        let profile = self.agents.get_agent_profile(&step.agent_id)?;
        let tools = self.tools.subset(profile.tool_names.as_slice());
        let rules = RuleSet::merge(&self.base_rules, &RuleSet::new(profile.rules.clone())?);

        let mut prompt = PromptBuilder::new().agent(&profile).tools(tools.descriptors());
        if let Some(root) = &self.project_root {
            prompt = prompt.project_root(root);
        }
        if let Some(custom) = &self.engine.config().system_prompt {
            prompt = prompt.custom(custom.clone());
        }

        let mut session = Session::new(session_title(&profile.name, &step.prompt), &profile.model);
        let mut ctx = TurnContext::new(Arc::clone(&self.model), tools)
            .with_rules(rules)
            .with_system_prompt(prompt.build())
            .with_sampling(profile.max_output_tokens, profile.temperature);

        let cancel = self.cancel.child_token();
        match &self.approvals {
            Some(handler) => {
                self.engine
                    .run_with_approvals(
                        &mut session,
                        &mut ctx,
                        step.prompt.clone(),
                        handler.as_ref(),
                        cancel,
                    )
                    .await
            }
            None => Ok(self.engine.run(&mut session, &mut ctx, step.prompt.clone(), cancel).await),
        }
    }
}

fn step_result(step: &TaskStep, outcome: &ConversationOutcome) -> StepResult {
    let (success, output) = match &outcome.pending {
        Some(pending) => (
            false,
            VigilError::ApprovalRequired { tool: pending.invocation.name.clone() }.to_string(),
        ),
        None => (!outcome.finish_reason.is_failure(), outcome.output().to_string()),
    };
    StepResult {
        step_id: step.id.clone(),
        agent_id: step.agent_id.clone(),
        success,
        output,
        usage: outcome.usage,
    }
}

fn session_title(agent_name: &str, prompt: &str) -> String {
    let head: String = prompt.chars().take(TITLE_PROMPT_CHARS).collect();
    format!("{agent_name}: {head}")
}
