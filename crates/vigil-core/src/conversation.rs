//! The per-session conversation loop.
//!
//! One turn runs the state machine
//!
//!   AwaitingModel → ProcessingToolCalls → AwaitingModel … → Done | Errored
//!
//! Every requested tool call passes the same gates, in this order, before a
//! tool is touched:
//!
//!   known tool? → RuleSet::evaluate → DoomLoopDetector::check → dispatch
//!
//! A refused call becomes an error-shaped tool result and the loop keeps
//! going. A call resolved to `ask` suspends the turn: the caller gets a
//! `PendingApproval` back and continues with [`ConversationLoop::resume`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vigil_contracts::{
    conversation::{ApprovalDecision, FinishReason},
    error::{VigilError, VigilResult},
    message::{Message, ToolInvocation, ToolOutcome},
    policy::PermissionAction,
    usage::Usage,
};
use vigil_policy::{CallHistory, DoomLoopDetector, RuleSet};

use crate::{
    clock::{Clock, SystemClock},
    dispatcher::{ToolDispatcher, DEFAULT_TOOL_TIMEOUT},
    registry::ToolRegistry,
    traits::{ApprovalHandler, Model, ModelEvent, ModelRequest, SessionStore},
};

pub const DEFAULT_MAX_ITERATIONS: u32 = 32;

/// Loop tuning, loadable from the `[conversation]` config table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Model invocations allowed per turn, across suspensions.
    pub max_iterations: u32,
    pub tool_timeout_secs: u64,
    pub doom_loop: DoomLoopDetector,
    /// Used when the turn context carries no system prompt of its own.
    pub system_prompt: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT.as_secs(),
            doom_loop: DoomLoopDetector::default(),
            system_prompt: None,
        }
    }
}

impl LoopConfig {
    pub fn from_toml_str(s: &str) -> VigilResult<Self> {
        toml::from_str(s).map_err(|e| VigilError::ConfigError {
            reason: format!("failed to parse conversation config: {e}"),
        })
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

/// One conversation: an id, a model reference, and its ordered messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub model: String,
    messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(title: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            model: model.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild a session from messages loaded out of a `SessionStore`.
    pub fn restore(
        id: impl Into<String>,
        title: impl Into<String>,
        model: impl Into<String>,
        messages: Vec<Message>,
    ) -> Self {
        let created_at = messages.first().map(|m| m.created_at).unwrap_or_else(Utc::now);
        let updated_at = messages.last().map(|m| m.created_at).unwrap_or(created_at);
        Self {
            id: id.into(),
            title: title.into(),
            model: model.into(),
            messages,
            created_at,
            updated_at,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    fn push(&mut self, message: Message) {
        self.updated_at = message.created_at;
        self.messages.push(message);
    }
}

/// Per-conversation inputs: the model, visible tools, the rule set, and the
/// call history the repeat detector reads.
///
/// The history belongs to this context alone and survives across
/// `run`/`resume` calls on it.
pub struct TurnContext {
    pub model: Arc<dyn Model>,
    pub tools: ToolRegistry,
    pub rules: RuleSet,
    pub history: CallHistory,
    pub system_prompt: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl TurnContext {
    /// A context with an allow-all rule set and an empty history.
    pub fn new(model: Arc<dyn Model>, tools: ToolRegistry) -> Self {
        Self {
            model,
            tools,
            rules: RuleSet::allow_all(),
            history: CallHistory::new(),
            system_prompt: None,
            max_output_tokens: None,
            temperature: None,
        }
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_history(mut self, history: CallHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_sampling(
        mut self,
        max_output_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        self.max_output_tokens = max_output_tokens;
        self.temperature = temperature;
        self
    }
}

/// A tool call held back for an external decision, plus the turn state
/// needed to continue afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub session_id: String,
    pub invocation: ToolInvocation,
    /// Calls from the same model response not yet processed.
    pub remaining: Vec<ToolInvocation>,
    pub usage: Usage,
    pub accumulated_text: String,
    pub iterations: u32,
}

/// What one turn produced.
#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    /// `None` only when the turn is suspended.
    pub final_message: Option<Message>,
    pub usage: Usage,
    pub finish_reason: FinishReason,
    pub iterations: u32,
    pub pending: Option<PendingApproval>,
    /// Non-fatal persistence failures, in the order they happened.
    pub warnings: Vec<String>,
}

impl ConversationOutcome {
    pub fn is_suspended(&self) -> bool {
        self.pending.is_some()
    }

    /// Content of the final assistant message, or `""` while suspended.
    pub fn output(&self) -> &str {
        self.final_message.as_ref().map_or("", |m| m.content.as_str())
    }
}

#[derive(Debug, Default)]
struct TurnState {
    usage: Usage,
    text: String,
    iterations: u32,
    warnings: Vec<String>,
}

#[derive(Debug, Default)]
enum ModelTurnEnd {
    #[default]
    Finished,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Default)]
struct ModelTurn {
    text: String,
    tool_calls: Vec<ToolInvocation>,
    usage: Usage,
    end: ModelTurnEnd,
}

enum CallsEnd {
    Done,
    Suspended(PendingApproval),
    Cancelled,
}

/// Drives conversations. Cheap to clone; holds no per-session state.
#[derive(Clone)]
pub struct ConversationLoop {
    config: LoopConfig,
    dispatcher: ToolDispatcher,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn SessionStore>>,
}

impl ConversationLoop {
    pub fn new(config: LoopConfig) -> Self {
        Self {
            dispatcher: ToolDispatcher::new(config.tool_timeout()),
            config,
            clock: Arc::new(SystemClock),
            store: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Persist every appended message to `store`.
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: ToolDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Append `user_message` to `session` and run until the model stops
    /// requesting tools, a terminal condition is hit, or a call needs
    /// approval.
    pub async fn run(
        &self,
        session: &mut Session,
        ctx: &mut TurnContext,
        user_message: impl Into<String>,
        cancel: CancellationToken,
    ) -> ConversationOutcome {
        let mut state = TurnState::default();
        info!(session_id = %session.id, model = %session.model, "conversation turn starting");
        self.append(session, Message::user(user_message), &mut state);
        self.drive(session, ctx, state, &cancel).await
    }

    /// Continue a suspended turn with `decision` for the held call.
    ///
    /// `Approve` dispatches it (repeat detection still applies); `Deny`
    /// records a permission-denied result. The rest of the held batch is
    /// then processed and the loop carries on.
    ///
    /// Returns `SessionMismatch` if `pending` came from another session.
    pub async fn resume(
        &self,
        session: &mut Session,
        ctx: &mut TurnContext,
        pending: PendingApproval,
        decision: ApprovalDecision,
        cancel: CancellationToken,
    ) -> VigilResult<ConversationOutcome> {
        if pending.session_id != session.id {
            return Err(VigilError::SessionMismatch {
                expected: pending.session_id,
                actual: session.id.clone(),
            });
        }

        let PendingApproval {
            invocation,
            remaining,
            usage,
            accumulated_text,
            iterations,
            ..
        } = pending;
        let mut state = TurnState {
            usage,
            text: accumulated_text,
            iterations,
            warnings: Vec::new(),
        };

        info!(
            session_id = %session.id,
            tool = %invocation.name,
            decision = ?decision,
            "resuming suspended turn"
        );

        if cancel.is_cancelled() {
            return Ok(self.cancelled(session, state));
        }

        let outcome = match decision {
            ApprovalDecision::Approve => self.execute_call(ctx, &invocation).await,
            ApprovalDecision::Deny => ToolOutcome::error(
                &invocation.id,
                VigilError::PermissionDenied { tool: invocation.name.clone() }.to_string(),
            ),
        };
        self.append(session, Message::tool_result(outcome), &mut state);

        match self.process_calls(session, ctx, &mut state, remaining, &cancel).await {
            CallsEnd::Done => Ok(self.drive(session, ctx, state, &cancel).await),
            CallsEnd::Suspended(pending) => Ok(self.suspend(session, state, pending)),
            CallsEnd::Cancelled => Ok(self.cancelled(session, state)),
        }
    }

    /// [`run`](Self::run), answering every suspension through `approvals`.
    pub async fn run_with_approvals(
        &self,
        session: &mut Session,
        ctx: &mut TurnContext,
        user_message: impl Into<String>,
        approvals: &dyn ApprovalHandler,
        cancel: CancellationToken,
    ) -> VigilResult<ConversationOutcome> {
        let mut outcome = self.run(session, ctx, user_message, cancel.clone()).await;
        while let Some(pending) = outcome.pending.take() {
            let decision = approvals.decide(&pending).await;
            let earlier = std::mem::take(&mut outcome.warnings);
            outcome = self.resume(session, ctx, pending, decision, cancel.clone()).await?;
            outcome.warnings.splice(0..0, earlier);
        }
        Ok(outcome)
    }

    async fn drive(
        &self,
        session: &mut Session,
        ctx: &mut TurnContext,
        mut state: TurnState,
        cancel: &CancellationToken,
    ) -> ConversationOutcome {
        loop {
            if cancel.is_cancelled() {
                return self.cancelled(session, state);
            }
            if state.iterations >= self.config.max_iterations {
                warn!(
                    session_id = %session.id,
                    max_iterations = self.config.max_iterations,
                    "iteration limit reached with tool calls outstanding"
                );
                let note = format!("iteration limit of {} reached", self.config.max_iterations);
                return self.finish(session, state, FinishReason::IterationLimit, Some(note));
            }
            state.iterations += 1;

            let turn = self.invoke_model(session, ctx, cancel).await;
            state.usage += turn.usage;
            match turn.end {
                ModelTurnEnd::Finished => {}
                ModelTurnEnd::Cancelled => return self.cancelled(session, state),
                ModelTurnEnd::Failed(reason) => {
                    warn!(
                        session_id = %session.id,
                        iteration = state.iterations,
                        reason = %reason,
                        "model error ends turn"
                    );
                    return self.finish(session, state, FinishReason::Error, Some(reason));
                }
            }
            state.text.push_str(&turn.text);

            if turn.tool_calls.is_empty() {
                return self.finish(session, state, FinishReason::Stop, None);
            }

            debug!(
                session_id = %session.id,
                iteration = state.iterations,
                calls = turn.tool_calls.len(),
                "model requested tools"
            );
            let calls = turn.tool_calls;
            let request = Message::assistant_with_tool_calls(turn.text, calls.clone());
            self.append(session, request, &mut state);

            match self.process_calls(session, ctx, &mut state, calls, cancel).await {
                CallsEnd::Done => {}
                CallsEnd::Suspended(pending) => return self.suspend(session, state, pending),
                CallsEnd::Cancelled => return self.cancelled(session, state),
            }
        }
    }

    async fn invoke_model(
        &self,
        session: &Session,
        ctx: &TurnContext,
        cancel: &CancellationToken,
    ) -> ModelTurn {
        let request = ModelRequest {
            model: session.model.clone(),
            system_prompt: ctx
                .system_prompt
                .clone()
                .or_else(|| self.config.system_prompt.clone())
                .unwrap_or_default(),
            messages: session.messages().to_vec(),
            tools: ctx.tools.descriptors(),
            max_output_tokens: ctx.max_output_tokens,
            temperature: ctx.temperature,
        };

        let mut turn = ModelTurn::default();
        let invoked = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                turn.end = ModelTurnEnd::Cancelled;
                return turn;
            }
            result = ctx.model.invoke(request, cancel.clone()) => result,
        };
        let mut events = match invoked {
            Ok(events) => events,
            Err(VigilError::Model { reason }) => {
                turn.end = ModelTurnEnd::Failed(reason);
                return turn;
            }
            Err(e) => {
                turn.end = ModelTurnEnd::Failed(e.to_string());
                return turn;
            }
        };

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    turn.end = ModelTurnEnd::Cancelled;
                    return turn;
                }
                event = events.recv() => event,
            };
            match event {
                Some(ModelEvent::TextDelta(delta)) => turn.text.push_str(&delta),
                Some(ModelEvent::ToolCall(call)) => turn.tool_calls.push(call),
                Some(ModelEvent::ToolResult(result)) => {
                    debug!(call_id = %result.call_id, "provider-executed tool result ignored");
                }
                Some(ModelEvent::Finish(usage)) => {
                    turn.usage += usage;
                    return turn;
                }
                Some(ModelEvent::Error(reason)) => {
                    turn.end = ModelTurnEnd::Failed(reason);
                    return turn;
                }
                None => {
                    warn!(session_id = %session.id, "model stream closed without a finish event");
                    turn.end =
                        ModelTurnEnd::Failed("model stream ended without a finish event".into());
                    return turn;
                }
            }
        }
    }

    async fn process_calls(
        &self,
        session: &mut Session,
        ctx: &mut TurnContext,
        state: &mut TurnState,
        calls: Vec<ToolInvocation>,
        cancel: &CancellationToken,
    ) -> CallsEnd {
        let mut queue = calls.into_iter();
        while let Some(call) = queue.next() {
            if cancel.is_cancelled() {
                return CallsEnd::Cancelled;
            }

            let outcome = if ctx.tools.get(&call.name).is_none() {
                warn!(tool = %call.name, "model requested an unknown tool");
                let err = VigilError::ToolNotFound { tool: call.name.clone() };
                ToolOutcome::error(&call.id, err.to_string())
            } else {
                match ctx.rules.evaluate(&call.name, Some(&call.arguments)) {
                    PermissionAction::Allow => self.execute_call(ctx, &call).await,
                    PermissionAction::Deny => {
                        warn!(session_id = %session.id, tool = %call.name, "tool call denied by rule set");
                        ToolOutcome::error(
                            &call.id,
                            VigilError::PermissionDenied { tool: call.name.clone() }.to_string(),
                        )
                    }
                    PermissionAction::Ask => {
                        return CallsEnd::Suspended(PendingApproval {
                            session_id: session.id.clone(),
                            invocation: call,
                            remaining: queue.collect(),
                            usage: state.usage,
                            accumulated_text: state.text.clone(),
                            iterations: state.iterations,
                        });
                    }
                }
            };
            self.append(session, Message::tool_result(outcome), state);
        }
        CallsEnd::Done
    }

    /// Repeat check, dispatch, and history record for an allowed call.
    async fn execute_call(&self, ctx: &mut TurnContext, call: &ToolInvocation) -> ToolOutcome {
        let Some(tool) = ctx.tools.get(&call.name) else {
            let err = VigilError::ToolNotFound { tool: call.name.clone() };
            return ToolOutcome::error(&call.id, err.to_string());
        };

        let now = self.clock.now_ms();
        if self
            .config
            .doom_loop
            .check(ctx.history.records(), &call.name, Some(&call.arguments), now)
        {
            return ToolOutcome::error(
                &call.id,
                VigilError::DoomLoopDetected { tool: call.name.clone() }.to_string(),
            );
        }

        let outcome = self.dispatcher.dispatch(tool, call).await;
        ctx.history.record(call.name.clone(), call.arguments.clone(), self.clock.now_ms());
        outcome
    }

    fn finish(
        &self,
        session: &mut Session,
        mut state: TurnState,
        reason: FinishReason,
        error: Option<String>,
    ) -> ConversationOutcome {
        let mut content = std::mem::take(&mut state.text);
        if let Some(error) = error {
            if !content.is_empty() {
                content.push_str("\n\n");
            }
            content.push_str("error: ");
            content.push_str(&error);
        }
        let message = Message::assistant(content);
        self.append(session, message.clone(), &mut state);

        info!(
            session_id = %session.id,
            finish_reason = %reason,
            iterations = state.iterations,
            total_tokens = state.usage.total_tokens,
            "conversation turn finished"
        );
        ConversationOutcome {
            final_message: Some(message),
            usage: state.usage,
            finish_reason: reason,
            iterations: state.iterations,
            pending: None,
            warnings: state.warnings,
        }
    }

    fn cancelled(&self, session: &mut Session, state: TurnState) -> ConversationOutcome {
        info!(session_id = %session.id, "conversation cancelled");
        let note = VigilError::Cancelled.to_string();
        self.finish(session, state, FinishReason::Cancelled, Some(note))
    }

    fn suspend(
        &self,
        session: &Session,
        state: TurnState,
        pending: PendingApproval,
    ) -> ConversationOutcome {
        info!(
            session_id = %session.id,
            tool = %pending.invocation.name,
            "tool call needs approval; suspending turn"
        );
        ConversationOutcome {
            final_message: None,
            usage: state.usage,
            finish_reason: FinishReason::Suspended,
            iterations: state.iterations,
            pending: Some(pending),
            warnings: state.warnings,
        }
    }

    fn append(&self, session: &mut Session, message: Message, state: &mut TurnState) {
        if let Some(store) = &self.store {
            if let Err(e) = store.append(&session.id, &message) {
                warn!(session_id = %session.id, error = %e, "failed to persist message");
                state.warnings.push(e.to_string());
            }
        }
        session.push(message);
    }
}

impl std::fmt::Debug for ConversationLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationLoop")
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher)
            .field("persisting", &self.store.is_some())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
