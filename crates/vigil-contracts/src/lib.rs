//! # vigil-contracts
//!
//! Shared types, schemas, and contracts for the vigil agent-execution engine.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate beyond construction-time validation.

pub mod agent;
pub mod conversation;
pub mod error;
pub mod message;
pub mod plan;
pub mod policy;
pub mod usage;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use agent::AgentProfile;
    use conversation::FinishReason;
    use error::VigilError;
    use message::{Message, Role, ToolOutcome};
    use plan::StepStatus;
    use policy::{PermissionAction, PermissionRule};
    use usage::Usage;

    fn profile() -> AgentProfile {
        AgentProfile {
            id: "coder".to_string(),
            name: "Coder".to_string(),
            description: String::new(),
            system_prompt: String::new(),
            model: "model-a".to_string(),
            tool_names: vec!["read".to_string()],
            rules: vec![],
            temperature: None,
            max_output_tokens: None,
        }
    }

    // ── PermissionRule ───────────────────────────────────────────────────────

    #[test]
    fn rule_new_rejects_empty_tool() {
        let err = PermissionRule::for_tool("  ", PermissionAction::Allow).unwrap_err();
        assert!(matches!(err, VigilError::SchemaValidation { .. }));
    }

    #[test]
    fn rule_new_rejects_blank_pattern() {
        let err = PermissionRule::new("write", Some(String::new()), PermissionAction::Deny)
            .unwrap_err();
        assert!(err.to_string().contains("empty pattern"));
    }

    #[test]
    fn permission_action_uses_lowercase_names() {
        let rule: PermissionRule =
            serde_json::from_value(json!({ "tool": "bash", "action": "ask" })).unwrap();
        assert_eq!(rule.action, PermissionAction::Ask);
        assert_eq!(rule.pattern, None);
        assert_eq!(PermissionAction::Deny.to_string(), "deny");
    }

    // ── StepStatus ───────────────────────────────────────────────────────────

    #[test]
    fn step_status_allows_only_forward_transitions() {
        use StepStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Running.can_transition_to(Running));
    }

    // ── Usage ────────────────────────────────────────────────────────────────

    #[test]
    fn usage_sums_field_by_field() {
        let total: Usage = [Usage::new(1, 2, 3), Usage::new(10, 20, 30)].into_iter().sum();
        assert_eq!(total, Usage::new(11, 22, 33));

        let mut acc = Usage::default();
        acc += Usage::new(5, 5, 10);
        assert_eq!(acc.total_tokens, 10);
    }

    // ── Message ──────────────────────────────────────────────────────────────

    #[test]
    fn tool_result_message_carries_exactly_one_outcome() {
        let msg = Message::tool_result(ToolOutcome::error("call-1", "boom"));
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.content, "error: boom");
        assert_eq!(msg.tool_results.as_ref().map(Vec::len), Some(1));
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn string_success_renders_without_quotes() {
        let ok = ToolOutcome::success("c", json!("file contents"));
        assert_eq!(ok.render(), "file contents");
        let obj = ToolOutcome::success("c", json!({ "exit_code": 0 }));
        assert_eq!(obj.render(), r#"{"exit_code":0}"#);
    }

    // ── AgentProfile ─────────────────────────────────────────────────────────

    #[test]
    fn profile_validate_accepts_minimal_profile() {
        assert!(profile().validate().is_ok());
    }

    #[test]
    fn profile_validate_rejects_out_of_range_temperature() {
        let p = AgentProfile { temperature: Some(2.5), ..profile() };
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn profile_validate_rejects_missing_model() {
        let p = AgentProfile { model: String::new(), ..profile() };
        assert!(matches!(p.validate(), Err(VigilError::SchemaValidation { .. })));
    }

    // ── FinishReason ─────────────────────────────────────────────────────────

    #[test]
    fn finish_reason_failure_classification() {
        assert!(!FinishReason::Stop.is_failure());
        assert!(!FinishReason::Suspended.is_failure());
        assert!(FinishReason::Error.is_failure());
        assert!(FinishReason::Cancelled.is_failure());
        assert!(FinishReason::IterationLimit.is_failure());
        assert_eq!(FinishReason::IterationLimit.to_string(), "iteration-limit");
    }

    // ── VigilError ───────────────────────────────────────────────────────────

    #[test]
    fn recoverable_errors_are_classified() {
        assert!(VigilError::PermissionDenied { tool: "bash".into() }.is_recoverable());
        assert!(VigilError::DoomLoopDetected { tool: "bash".into() }.is_recoverable());
        assert!(!VigilError::PlanNotFound { id: "p".into() }.is_recoverable());
        assert!(!VigilError::Model { reason: "x".into() }.is_recoverable());
    }

    #[test]
    fn error_permission_denied_display() {
        let msg = VigilError::PermissionDenied { tool: "write".to_string() }.to_string();
        assert!(msg.contains("permission denied"));
        assert!(msg.contains("write"));
    }
}
