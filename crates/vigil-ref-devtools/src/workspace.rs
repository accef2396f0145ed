//! Simulated project workspace and the tools that act on it.
//!
//! Everything here is in memory. `bash` interprets a handful of commands
//! against the workspace and never spawns a process, so scenarios can show
//! destructive commands being refused without any risk to the host.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use vigil_contracts::error::{VigilError, VigilResult};
use vigil_core::{
    traits::{Tool, ToolDescriptor},
    ToolRegistry,
};
use vigil_schema::JsonSchemaValidator;

/// A small fictional crate, seeded into every new workspace.
const SEED_FILES: &[(&str, &str)] = &[
    ("README.md", "# widget\n\nA tiny crate that counts widgets.\n"),
    ("CHANGELOG.md", "# Changelog\n\n## Unreleased\n"),
    ("Cargo.toml", "[package]\nname = \"widget\"\nversion = \"0.3.0\"\n"),
    ("src/lib.rs", "pub fn count(items: &[u8]) -> usize {\n    items.len()\n}\n"),
    ("tests/count.rs", "#[test]\nfn counts() {\n    assert_eq!(widget::count(&[1, 2]), 2);\n}\n"),
];

/// Shared in-memory file tree plus a log of every simulated command.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    files: Arc<Mutex<BTreeMap<String, String>>>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl Workspace {
    /// A workspace holding the seed crate.
    pub fn seeded() -> Self {
        let ws = Self::default();
        {
            let mut files = ws.files();
            for (path, content) in SEED_FILES {
                files.insert((*path).to_string(), (*content).to_string());
            }
        }
        ws
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.files.lock().expect("workspace lock poisoned")
    }

    pub fn read(&self, path: &str) -> Option<String> {
        self.files().get(path).cloned()
    }

    pub fn write(&self, path: &str, content: &str) {
        self.files().insert(path.to_string(), content.to_string());
    }

    pub fn paths(&self) -> Vec<String> {
        self.files().keys().cloned().collect()
    }

    /// Every command `bash` was asked to run, in order.
    pub fn command_log(&self) -> Vec<String> {
        self.commands.lock().expect("workspace lock poisoned").clone()
    }

    fn log_command(&self, command: &str) {
        self.commands
            .lock()
            .expect("workspace lock poisoned")
            .push(command.to_string());
    }
}

fn string_arg<'a>(args: &'a Value, key: &str, tool: &str) -> VigilResult<&'a str> {
    args.get(key).and_then(Value::as_str).ok_or_else(|| VigilError::ToolExecution {
        tool: tool.to_string(),
        reason: format!("missing string argument '{key}'"),
    })
}

// ── read ──────────────────────────────────────────────────────────────────────

pub struct ReadTool {
    workspace: Workspace,
}

#[async_trait]
impl Tool for ReadTool {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "read".to_string(),
            description: "Read a file from the workspace".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "file_path": { "type": "string", "minLength": 1 } },
                "required": ["file_path"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, args: Value) -> VigilResult<Value> {
        let path = string_arg(&args, "file_path", "read")?;
        self.workspace
            .read(path)
            .map(Value::String)
            .ok_or_else(|| VigilError::ToolExecution {
                tool: "read".to_string(),
                reason: format!("no such file: {path}"),
            })
    }
}

// ── write ─────────────────────────────────────────────────────────────────────

pub struct WriteTool {
    workspace: Workspace,
}

#[async_trait]
impl Tool for WriteTool {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "write".to_string(),
            description: "Create or overwrite a file in the workspace".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": { "type": "string", "minLength": 1 },
                    "content": { "type": "string" }
                },
                "required": ["file_path", "content"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, args: Value) -> VigilResult<Value> {
        let path = string_arg(&args, "file_path", "write")?;
        let content = string_arg(&args, "content", "write")?;
        self.workspace.write(path, content);
        debug!(path, bytes = content.len(), "workspace file written");
        Ok(json!({ "file_path": path, "bytes_written": content.len() }))
    }
}

// ── bash ──────────────────────────────────────────────────────────────────────

/// Simulated shell. Understands `ls`, `cat <path>`, `echo <text>`,
/// `cargo build`, `cargo test` and `git status`; anything else exits with
/// status 127. The seed crate never builds.
pub struct BashTool {
    workspace: Workspace,
}

impl BashTool {
    fn run(&self, command: &str) -> (i64, String) {
        let mut words = command.split_whitespace();
        match (words.next(), words.next()) {
            (Some("ls"), _) => (0, self.workspace.paths().join("\n")),
            (Some("cat"), Some(path)) => match self.workspace.read(path) {
                Some(content) => (0, content),
                None => (1, format!("cat: {path}: No such file or directory")),
            },
            (Some("echo"), _) => (0, command.trim_start_matches("echo").trim().to_string()),
            (Some("cargo"), Some("build")) => (
                101,
                "error[E0425]: cannot find value `itemz` in this scope\n --> src/lib.rs:2:5"
                    .to_string(),
            ),
            (Some("cargo"), Some("test")) => {
                let paths = self.workspace.paths();
                let tests = paths.iter().filter(|p| p.starts_with("tests/")).count();
                (0, format!("test result: ok. {tests} passed; 0 failed"))
            }
            (Some("git"), Some("status")) => {
                (0, "nothing to commit, working tree clean".to_string())
            }
            (Some(program), _) => (127, format!("{program}: command not found")),
            (None, _) => (0, String::new()),
        }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn describe(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "bash".to_string(),
            description: "Run a shell command in the workspace".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": { "command": { "type": "string", "minLength": 1 } },
                "required": ["command"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, args: Value) -> VigilResult<Value> {
        let command = string_arg(&args, "command", "bash")?;
        self.workspace.log_command(command);
        let (exit_code, output) = self.run(command);
        debug!(command, exit_code, "simulated command finished");
        Ok(json!({ "exit_code": exit_code, "output": output }))
    }
}

/// A registry holding `read`, `write` and `bash` over `workspace`, with
/// argument schemas enforced by the `jsonschema`-backed validator.
pub fn devtools_registry(workspace: &Workspace) -> VigilResult<ToolRegistry> {
    let mut registry = ToolRegistry::with_validator(Arc::new(JsonSchemaValidator::new()));
    registry.register(Arc::new(ReadTool { workspace: workspace.clone() }))?;
    registry.register(Arc::new(WriteTool { workspace: workspace.clone() }))?;
    registry.register(Arc::new(BashTool { workspace: workspace.clone() }))?;
    Ok(registry)
}
