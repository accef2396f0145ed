//! Repeated-call ("doom loop") detection.
//!
//! A call is considered stuck when the same tool has already been called
//! with structurally equal arguments at least `threshold` times inside the
//! trailing `window_ms`. History is trimmed to the window while evaluating;
//! stored records are never removed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use vigil_contracts::policy::ToolCallRecord;

/// Identical calls needed to trip the detector.
pub const DEFAULT_THRESHOLD: usize = 3;

/// Width of the trailing window, in milliseconds.
pub const DEFAULT_WINDOW_MS: i64 = 60_000;

/// Detector parameters. Loadable from the `[doom_loop]` config table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoomLoopDetector {
    pub threshold: usize,
    pub window_ms: i64,
}

impl Default for DoomLoopDetector {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            window_ms: DEFAULT_WINDOW_MS,
        }
    }
}

impl DoomLoopDetector {
    /// True when `tool_name(args)` would repeat a stuck pattern at `now_ms`.
    pub fn check(
        &self,
        history: &[ToolCallRecord],
        tool_name: &str,
        args: Option<&Value>,
        now_ms: i64,
    ) -> bool {
        let empty = Value::Object(Map::new());
        let args = args.unwrap_or(&empty);

        let repeats = history
            .iter()
            .filter(|r| {
                r.tool_name == tool_name
                    && now_ms - r.timestamp_ms < self.window_ms
                    && args_equal(&r.args, args)
            })
            .count();

        let looping = repeats >= self.threshold;
        if looping {
            warn!(
                tool = %tool_name,
                repeats,
                window_ms = self.window_ms,
                "repeated identical tool call detected"
            );
        }
        looping
    }
}

/// [`DoomLoopDetector::check`] with the default threshold and window.
pub fn check_doom_loop(
    history: &[ToolCallRecord],
    tool_name: &str,
    args: Option<&Value>,
    now_ms: i64,
) -> bool {
    DoomLoopDetector::default().check(history, tool_name, args, now_ms)
}

/// Structural equality over JSON arguments.
///
/// Objects compare by key set and per-key value regardless of insertion
/// order, arrays element-wise, and numbers by numeric value (`1` equals
/// `1.0`).
pub fn args_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| args_equal(v, w)))
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(v, w)| args_equal(v, w))
        }
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(p), Some(q)) => p == q,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// The append-only call log owned by one conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallHistory {
    records: Vec<ToolCallRecord>,
}

impl CallHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<ToolCallRecord>) -> Self {
        Self { records }
    }

    pub fn record(&mut self, tool_name: impl Into<String>, args: Value, timestamp_ms: i64) {
        self.records.push(ToolCallRecord {
            tool_name: tool_name.into(),
            args,
            timestamp_ms,
        });
    }

    pub fn records(&self) -> &[ToolCallRecord] {
        &self.records
    }

    /// Records stamped inside the trailing `window_ms` ending at `now_ms`.
    pub fn recent(&self, now_ms: i64, window_ms: i64) -> impl Iterator<Item = &ToolCallRecord> {
        self.records.iter().filter(move |r| now_ms - r.timestamp_ms < window_ms)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
