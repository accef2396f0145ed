//! # vigil-policy
//!
//! Tool permission rules and repeated-call detection for the vigil runtime.
//!
//! ## Overview
//!
//! [`RuleSet`] holds an ordered list of permission rules, loadable from TOML.
//! [`evaluate`] resolves a tool call to `allow`, `deny`, or `ask`: every rule
//! is scanned, later matches override earlier ones, an exact tool name beats
//! the `"*"` wildcard, and a call no rule matches is denied.
//!
//! [`DoomLoopDetector`] flags a call that repeats the same tool with the same
//! arguments too often inside a sliding time window.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use vigil_policy::RuleSet;
//!
//! let rules = RuleSet::from_toml_str(include_str!("../policies/devtools.toml"))?;
//! let action = rules.evaluate("write", Some(&serde_json::json!({ "filePath": "a.md" })));
//! ```

pub mod doom_loop;
pub mod engine;
pub mod glob;
pub mod rule;

pub use doom_loop::{args_equal, check_doom_loop, CallHistory, DoomLoopDetector};
pub use engine::evaluate;
pub use glob::GlobPattern;
pub use rule::{RuleConfig, RuleSet};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{json, Value};

    use vigil_contracts::{
        error::VigilError,
        policy::{PermissionAction, PermissionRule, ToolCallRecord},
    };

    use crate::{args_equal, check_doom_loop, CallHistory, DoomLoopDetector, RuleSet};

    use PermissionAction::{Allow, Ask, Deny};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn rule(tool: &str, action: PermissionAction) -> PermissionRule {
        PermissionRule::for_tool(tool, action).unwrap()
    }

    fn patterned(tool: &str, pattern: &str, action: PermissionAction) -> PermissionRule {
        PermissionRule::new(tool, Some(pattern.to_string()), action).unwrap()
    }

    fn set(rules: Vec<PermissionRule>) -> RuleSet {
        RuleSet::new(rules).unwrap()
    }

    fn record(tool: &str, args: Value, ts: i64) -> ToolCallRecord {
        ToolCallRecord {
            tool_name: tool.to_string(),
            args,
            timestamp_ms: ts,
        }
    }

    const NOW: i64 = 1_700_000_000_000;

    // ── 1. deny-by-default ────────────────────────────────────────────────────

    #[test]
    fn empty_rule_set_denies() {
        assert_eq!(set(vec![]).evaluate("read", None), Deny);
    }

    #[test]
    fn unmatched_tool_denies() {
        let rules = set(vec![rule("read", Allow)]);
        assert_eq!(rules.evaluate("write", None), Deny);
    }

    // ── 2. exact and wildcard matching ───────────────────────────────────────

    #[test]
    fn exact_rule_returns_its_action() {
        assert_eq!(set(vec![rule("read", Allow)]).evaluate("read", None), Allow);
        assert_eq!(set(vec![rule("write", Deny)]).evaluate("write", None), Deny);
        assert_eq!(set(vec![rule("bash", Ask)]).evaluate("bash", None), Ask);
    }

    #[test]
    fn wildcard_matches_every_tool() {
        let rules = set(vec![rule("*", Allow)]);
        for tool in ["read", "write", "bash"] {
            assert_eq!(rules.evaluate(tool, None), Allow, "tool {tool}");
        }
    }

    #[test]
    fn later_exact_rule_overrides_wildcard() {
        let rules = set(vec![rule("*", Allow), rule("write", Deny)]);
        assert_eq!(rules.evaluate("read", None), Allow);
        assert_eq!(rules.evaluate("write", None), Deny);
    }

    #[test]
    fn last_of_several_exact_rules_wins() {
        let rules = set(vec![rule("bash", Deny), rule("bash", Ask), rule("bash", Allow)]);
        assert_eq!(rules.evaluate("bash", None), Allow);
    }

    #[test]
    fn trailing_wildcard_does_not_override_exact_match() {
        let rules = set(vec![rule("write", Deny), rule("*", Allow)]);
        assert_eq!(rules.evaluate("write", None), Deny);
        assert_eq!(rules.evaluate("read", None), Allow);
    }

    // ── 3. patterned rules ────────────────────────────────────────────────────

    #[test]
    fn pattern_on_file_path_short_circuits() {
        let rules = set(vec![
            patterned("write", "*.md", Allow),
            rule("write", Deny),
            rule("*", Allow),
        ]);
        assert_eq!(rules.evaluate("write", Some(&json!({ "filePath": "a.md" }))), Allow);
        assert_eq!(rules.evaluate("write", Some(&json!({ "filePath": "a.ts" }))), Deny);
        assert_eq!(rules.evaluate("read", Some(&json!({}))), Allow);
    }

    #[test]
    fn pattern_with_globstar_on_path_key() {
        let rules = set(vec![patterned("edit", "src/**/*.ts", Allow), rule("edit", Deny)]);
        assert_eq!(rules.evaluate("edit", Some(&json!({ "path": "src/index.ts" }))), Allow);
        assert_eq!(
            rules.evaluate("edit", Some(&json!({ "path": "src/util/helper.ts" }))),
            Allow
        );
        assert_eq!(rules.evaluate("edit", Some(&json!({ "path": "test/foo.ts" }))), Deny);
    }

    #[test]
    fn dangerous_command_pattern_denies_before_fallback_ask() {
        let rules = set(vec![patterned("bash", "rm -rf *", Deny), rule("bash", Ask)]);
        assert_eq!(rules.evaluate("bash", Some(&json!({ "command": "rm -rf /" }))), Deny);
        assert_eq!(rules.evaluate("bash", Some(&json!({ "command": "ls -la" }))), Ask);
    }

    #[test]
    fn patterned_rule_without_args_is_skipped() {
        let rules = set(vec![rule("write", Deny), patterned("write", "*.md", Allow)]);
        assert_eq!(rules.evaluate("write", None), Deny);
    }

    #[test]
    fn non_string_candidates_are_ignored() {
        let rules = set(vec![patterned("write", "*", Allow), rule("write", Deny)]);
        assert_eq!(rules.evaluate("write", Some(&json!({ "path": 42 }))), Deny);
        assert_eq!(rules.evaluate("write", Some(&json!(["a.md"]))), Deny);
    }

    #[test]
    fn planning_agent_rule_set() {
        let rules = set(vec![
            patterned("write", "*.md", Allow),
            rule("write", Deny),
            patterned("edit", "*.md", Allow),
            rule("edit", Deny),
            rule("*", Allow),
        ]);
        assert_eq!(rules.evaluate("write", Some(&json!({ "filePath": "plan.md" }))), Allow);
        assert_eq!(rules.evaluate("write", Some(&json!({ "filePath": "index.ts" }))), Deny);
        assert_eq!(rules.evaluate("edit", Some(&json!({ "filePath": "README.md" }))), Allow);
        assert_eq!(
            rules.evaluate("edit", Some(&json!({ "filePath": "src/index.ts" }))),
            Deny
        );
        assert_eq!(rules.evaluate("read", Some(&json!({ "filePath": "any.ts" }))), Allow);
    }

    // ── 4. merge and loading ─────────────────────────────────────────────────

    #[test]
    fn merge_concatenates_in_order() {
        let merged = RuleSet::merge(&set(vec![rule("*", Allow)]), &set(vec![rule("bash", Ask)]));
        let tools: Vec<_> = merged.rules().map(|r| r.tool.as_str()).collect();
        assert_eq!(tools, ["*", "bash"]);
    }

    #[test]
    fn merged_override_takes_precedence() {
        let merged = RuleSet::merge(&set(vec![rule("write", Allow)]), &set(vec![rule("write", Deny)]));
        assert_eq!(merged.evaluate("write", None), Deny);
    }

    #[test]
    fn rules_load_from_toml() {
        let rules = RuleSet::from_toml_str(
            r#"
            [[rules]]
            tool = "bash"
            pattern = "rm -rf *"
            action = "deny"

            [[rules]]
            tool = "bash"
            action = "ask"
            "#,
        )
        .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.evaluate("bash", Some(&json!({ "command": "pwd" }))), Ask);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = RuleSet::from_toml_str("[[rules]]\ntool = ").unwrap_err();
        match err {
            VigilError::ConfigError { reason } => assert!(reason.contains("rules TOML")),
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn unknown_action_is_a_config_error() {
        let err = RuleSet::from_toml_str("[[rules]]\ntool = \"read\"\naction = \"maybe\"\n")
            .unwrap_err();
        assert!(matches!(err, VigilError::ConfigError { .. }));
    }

    #[test]
    fn invalid_pattern_is_rejected_at_load() {
        let err = RuleSet::from_toml_str(
            "[[rules]]\ntool = \"read\"\npattern = \"{a,b\"\naction = \"allow\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, VigilError::SchemaValidation { .. }));
    }

    // ── 5. doom loop detection ───────────────────────────────────────────────

    #[test]
    fn two_prior_calls_are_not_a_loop() {
        let history = vec![
            record("bash", json!({ "command": "ls" }), NOW),
            record("bash", json!({ "command": "ls" }), NOW),
        ];
        assert!(!check_doom_loop(&history, "bash", Some(&json!({ "command": "ls" })), NOW));
    }

    #[test]
    fn three_prior_identical_calls_are_a_loop() {
        let history = vec![
            record("bash", json!({ "command": "ls" }), NOW - 30_000),
            record("bash", json!({ "command": "ls" }), NOW - 20_000),
            record("bash", json!({ "command": "ls" }), NOW),
        ];
        assert!(check_doom_loop(&history, "bash", Some(&json!({ "command": "ls" })), NOW));
    }

    #[test]
    fn calls_outside_the_window_are_ignored() {
        let history = vec![
            record("bash", json!({ "command": "ls" }), NOW - 120_000),
            record("bash", json!({ "command": "ls" }), NOW - 5_000),
            record("bash", json!({ "command": "ls" }), NOW),
        ];
        assert!(!check_doom_loop(&history, "bash", Some(&json!({ "command": "ls" })), NOW));
    }

    #[test]
    fn record_exactly_at_window_edge_is_excluded() {
        let history = vec![
            record("bash", json!({}), NOW - 60_000),
            record("bash", json!({}), NOW - 1),
            record("bash", json!({}), NOW),
        ];
        assert!(!check_doom_loop(&history, "bash", Some(&json!({})), NOW));
    }

    #[test]
    fn different_args_or_tools_are_not_a_loop() {
        let history = vec![
            record("bash", json!({ "command": "ls" }), NOW),
            record("bash", json!({ "command": "pwd" }), NOW),
            record("bash", json!({ "command": "ls" }), NOW),
        ];
        assert!(!check_doom_loop(&history, "bash", Some(&json!({ "command": "ls" })), NOW));

        let history = vec![
            record("read", json!({ "path": "a.ts" }), NOW),
            record("write", json!({ "path": "a.ts" }), NOW),
            record("read", json!({ "path": "a.ts" }), NOW),
        ];
        assert!(!check_doom_loop(&history, "read", Some(&json!({ "path": "a.ts" })), NOW));
    }

    #[test]
    fn absent_args_compare_equal_to_empty_object() {
        let history = vec![record("ping", json!({}), NOW); 3];
        assert!(check_doom_loop(&history, "ping", None, NOW));
    }

    #[test]
    fn custom_threshold_is_respected() {
        let detector = DoomLoopDetector { threshold: 1, window_ms: 1_000 };
        let history = vec![record("read", json!({ "path": "a" }), NOW - 10)];
        assert!(detector.check(&history, "read", Some(&json!({ "path": "a" })), NOW));
    }

    #[test]
    fn structural_equality_ignores_key_order_and_number_form() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":{"x":[1,2],"y":null}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"b":{"y":null,"x":[1,2.0]},"a":1.0}"#).unwrap();
        assert!(args_equal(&a, &b));
        assert!(!args_equal(&json!([1, 2]), &json!([2, 1])));
        assert!(!args_equal(&json!({ "a": 1 }), &json!({ "a": 1, "b": 2 })));
        assert!(!args_equal(&json!("1"), &json!(1)));
    }

    #[test]
    fn call_history_keeps_everything_but_windows_reads() {
        let mut history = CallHistory::new();
        history.record("bash", json!({ "command": "ls" }), NOW - 90_000);
        history.record("bash", json!({ "command": "ls" }), NOW - 5);

        assert_eq!(history.len(), 2);
        let recent: Vec<i64> = history.recent(NOW, 60_000).map(|r| r.timestamp_ms).collect();
        assert_eq!(recent, vec![NOW - 5]);
    }

    // ── 6. properties ────────────────────────────────────────────────────────

    fn action_strategy() -> impl Strategy<Value = PermissionAction> {
        prop_oneof![Just(Allow), Just(Deny), Just(Ask)]
    }

    fn unpatterned_rule_strategy() -> impl Strategy<Value = PermissionRule> {
        (prop_oneof![Just("*"), Just("read"), Just("write"), Just("bash")], action_strategy())
            .prop_map(|(tool, action)| rule(tool, action))
    }

    proptest! {
        #[test]
        fn appended_exact_rule_decides(
            prior in prop::collection::vec(unpatterned_rule_strategy(), 0..12),
            last in action_strategy(),
        ) {
            let rules = set(prior).with_rule(rule("bash", last)).unwrap();
            prop_assert_eq!(rules.evaluate("bash", None), last);
        }

        #[test]
        fn unmentioned_tool_without_wildcard_is_denied(
            actions in prop::collection::vec(action_strategy(), 0..8),
        ) {
            let rules = set(actions.into_iter().map(|a| rule("read", a)).collect());
            prop_assert_eq!(rules.evaluate("deploy", None), Deny);
        }
    }
}
