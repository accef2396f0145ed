//! # vigil-schema
//!
//! JSON Schema validation of tool arguments for vigil.
//!
//! [`JsonSchemaValidator`] is handed to a `ToolRegistry` (schemas are
//! checked once when a tool registers) and to a `ToolDispatcher` (arguments
//! are checked on every call, before the tool runs). A rejected call becomes
//! an ordinary error-shaped tool result.

pub mod engine;

pub use engine::{ArgumentCheckFn, JsonSchemaValidator};

// ── Tests ─────────────────────────────────────────────────────────────────────
