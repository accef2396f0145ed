//! # vigil-ref-devtools
//!
//! Developer-tools reference runtime for the vigil agent-execution engine.
//!
//! Demonstrates three scenarios against a simulated workspace:
//!
//! 1. **Policy Gate**: allow, deny and ask outcomes from one rule set, with
//!    suspended calls resumed by an explicit decision.
//! 2. **Doom Loop**: a repeated failing command refused on its fourth
//!    identical attempt.
//! 3. **Release Plan**: a multi-agent plan with parallel fan-out, a failed
//!    step, and a dependent that stays blocked.
//!
//! The model is scripted and the tools never touch the host.

pub mod model;
pub mod scenarios;
pub mod workspace;

pub use model::ScriptedModel;
pub use workspace::{devtools_registry, Workspace};

// ── Tests ─────────────────────────────────────────────────────────────────────
