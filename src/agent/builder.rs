//! Builder agent sessions.
//!
//! The Claude CLI prints a `"session_id": "..."` field in its output and
//! accepts `--resume <id>` to continue that conversation. Both conventions are
//! confined to [`CliBuilderSession`]; stages only see [`BuilderSession`].

use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use super::{AgentInvoker, AgentOutput};
use crate::errors::AgentProcessError;
use crate::template::{PromptDelivery, StepConfig};

static SESSION_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""session_id"\s*:\s*"([^"]+)""#).expect("session id regex")
});

/// One builder invocation: its output plus the handle it reported, if any.
#[derive(Debug, Clone)]
pub struct BuilderTurn {
    pub output: AgentOutput,
    pub handle: Option<String>,
}

/// Starts and resumes builder agent conversations.
#[async_trait]
pub trait BuilderSession: Send + Sync {
    async fn start(&self, config: &StepConfig, cwd: &Path)
    -> Result<BuilderTurn, AgentProcessError>;

    async fn resume(
        &self,
        handle: &str,
        config: &StepConfig,
        cwd: &Path,
    ) -> Result<BuilderTurn, AgentProcessError>;
}

/// Builder session driven through an [`AgentInvoker`] running a CLI agent.
pub struct CliBuilderSession {
    invoker: Arc<dyn AgentInvoker>,
}

impl CliBuilderSession {
    pub fn new(invoker: Arc<dyn AgentInvoker>) -> Self {
        Self { invoker }
    }

    async fn invoke(
        &self,
        config: &StepConfig,
        cwd: &Path,
    ) -> Result<BuilderTurn, AgentProcessError> {
        let output = self
            .invoker
            .run(config, config.delivery_or(PromptDelivery::Stdin), cwd)
            .await?;
        let handle = extract_session_id(&output.stdout);
        Ok(BuilderTurn { output, handle })
    }
}

#[async_trait]
impl BuilderSession for CliBuilderSession {
    async fn start(
        &self,
        config: &StepConfig,
        cwd: &Path,
    ) -> Result<BuilderTurn, AgentProcessError> {
        self.invoke(config, cwd).await
    }

    async fn resume(
        &self,
        handle: &str,
        config: &StepConfig,
        cwd: &Path,
    ) -> Result<BuilderTurn, AgentProcessError> {
        let resumed = config.with_extra_args(["--resume", handle]);
        self.invoke(&resumed, cwd).await
    }
}

/// Last `"session_id": "<value>"` occurrence in `stdout`.
pub fn extract_session_id(stdout: &str) -> Option<String> {
    SESSION_ID_REGEX
        .captures_iter(stdout)
        .last()
        .map(|caps| caps[1].trim().to_string())
        .filter(|id| !id.is_empty())
}
