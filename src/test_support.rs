//! Shared test fixtures: a scripted [`AgentInvoker`] and stage templates.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use crate::agent::{AgentInvoker, AgentOutput};
use crate::config::Config;
use crate::errors::AgentProcessError;
use crate::ralph_config::RalphToml;
use crate::template::{PromptDelivery, StepConfig};

/// Commands the fixture templates use, one per stage.
pub const RESEARCHER: &str = "researcher";
pub const PLANNER: &str = "planner";
pub const VALIDATOR: &str = "validator";
pub const IMPLEMENTER: &str = "implementer";
pub const REVIEWER: &str = "reviewer";
pub const PUBLISHER: &str = "publisher";

/// One scripted process outcome.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Files to create, relative to the invocation's cwd.
    pub writes: Vec<(PathBuf, String)>,
    pub spawn_error: bool,
}

impl Response {
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Default::default()
        }
    }

    pub fn exit(code: i32, stderr: &str) -> Self {
        Self {
            exit_code: code,
            stderr: stderr.to_string(),
            ..Default::default()
        }
    }

    pub fn spawn_failure() -> Self {
        Self {
            spawn_error: true,
            ..Default::default()
        }
    }

    pub fn writing(mut self, path: impl Into<PathBuf>, content: &str) -> Self {
        self.writes.push((path.into(), content.to_string()));
        self
    }
}

/// A recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub command: String,
    pub args: Vec<String>,
    pub prompt: String,
    pub delivery: PromptDelivery,
    pub cwd: PathBuf,
}

/// Invoker that replays scripted responses per command name.
///
/// Each command has a queue; the last queued response repeats once the
/// others are used up. Unscripted commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedInvoker {
    responses: Mutex<HashMap<String, VecDeque<Response>>>,
    calls: Mutex<Vec<Call>>,
    tools: Mutex<HashSet<String>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, command: &str, response: Response) {
        self.responses
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn respond(&self, command: &str, exit_code: i32, stdout: &str) {
        self.push(
            command,
            Response {
                exit_code,
                stdout: stdout.to_string(),
                ..Default::default()
            },
        );
    }

    /// Make `exists(tool)` report true.
    pub fn install_tool(&self, tool: &str) {
        self.tools.lock().unwrap().insert(tool.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.command == command)
            .count()
    }

    fn next_response(&self, command: &str) -> Response {
        let mut responses = self.responses.lock().unwrap();
        match responses.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => Response::default(),
        }
    }
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    async fn run(
        &self,
        config: &StepConfig,
        delivery: PromptDelivery,
        cwd: &Path,
    ) -> Result<AgentOutput, AgentProcessError> {
        self.calls.lock().unwrap().push(Call {
            command: config.command.clone(),
            args: config.args.clone(),
            prompt: config.prompt.clone(),
            delivery,
            cwd: cwd.to_path_buf(),
        });

        let response = self.next_response(&config.command);
        if response.spawn_error {
            return Err(AgentProcessError::SpawnFailed {
                command: config.command.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted"),
            });
        }
        for (relative, content) in &response.writes {
            let path = cwd.join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, content).unwrap();
            // Stamp a precise mtime; the kernel's coarse clock can repeat
            // within a tick, which would hide same-size rewrites.
            std::fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(SystemTime::now())
                .unwrap();
        }
        Ok(AgentOutput {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
        })
    }

    fn exists(&self, tool: &str) -> bool {
        self.tools.lock().unwrap().contains(tool)
    }
}

/// Write a template for every stage under `<root>/.ralph/templates`.
pub fn write_templates(root: &Path) {
    let dir = root.join(".ralph").join("templates");
    std::fs::create_dir_all(&dir).unwrap();
    let templates = [
        ("research", RESEARCHER),
        ("plan", PLANNER),
        ("validate", VALIDATOR),
        ("implement", IMPLEMENTER),
        ("review", REVIEWER),
        ("publish", PUBLISHER),
    ];
    for (name, command) in templates {
        std::fs::write(
            dir.join(format!("{}.md", name)),
            format!(
                "---\ncommand: {}\nargs: [\"--print\"]\n---\n{} ${{issue.id}}: ${{issue.title}}\n",
                command, name
            ),
        )
        .unwrap();
    }
}

/// Configuration rooted at `root` with built-in defaults.
pub fn config_for(root: &Path) -> Config {
    Config::from_parts(root.to_path_buf(), RalphToml::default(), None, false)
}
