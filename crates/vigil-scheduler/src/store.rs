//! Explicit, caller-owned plan storage.
//!
//! The scheduler is the only writer of step status, and every write goes
//! through [`PlanStore::update_step_status`]. The lock is never held across
//! an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use vigil_contracts::{
    error::{VigilError, VigilResult},
    plan::{Plan, StepStatus},
};

#[derive(Debug, Clone, Default)]
pub struct PlanStore {
    plans: Arc<Mutex<HashMap<String, Plan>>>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Plan>> {
        self.plans.lock().expect("plan store lock poisoned")
    }

    /// Store `plan`, replacing any plan with the same id.
    pub fn insert(&self, plan: Plan) {
        debug!(plan_id = %plan.id, steps = plan.steps.len(), "plan stored");
        self.lock().insert(plan.id.clone(), plan);
    }

    /// A snapshot of the plan as it is now.
    pub fn get(&self, plan_id: &str) -> VigilResult<Plan> {
        self.lock()
            .get(plan_id)
            .cloned()
            .ok_or_else(|| VigilError::PlanNotFound { id: plan_id.to_string() })
    }

    pub fn contains(&self, plan_id: &str) -> bool {
        self.lock().contains_key(plan_id)
    }

    /// Ids of every stored plan, sorted.
    pub fn plan_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Move one step to `status`.
    ///
    /// Only `pending → running → {completed | failed}` is accepted; anything
    /// else is a `StateMachineError` and leaves the plan untouched.
    pub fn update_step_status(
        &self,
        plan_id: &str,
        step_id: &str,
        status: StepStatus,
    ) -> VigilResult<()> {
        let mut plans = self.lock();
        let plan = plans
            .get_mut(plan_id)
            .ok_or_else(|| VigilError::PlanNotFound { id: plan_id.to_string() })?;
        let step = plan.steps.iter_mut().find(|s| s.id == step_id).ok_or_else(|| {
            VigilError::StepNotFound {
                plan_id: plan_id.to_string(),
                step_id: step_id.to_string(),
            }
        })?;

        if !step.status.can_transition_to(status) {
            return Err(VigilError::StateMachineError {
                reason: format!(
                    "step '{step_id}' cannot move from {} to {status}",
                    step.status
                ),
            });
        }

        debug!(plan_id, step_id, from = %step.status, to = %status, "step transition");
        step.status = status;
        Ok(())
    }
}
