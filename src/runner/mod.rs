//! Runner Module - where a resolved container command actually executes
//!
//! The orchestrator builds a [`RunRequest`] and hands it to whichever
//! [`TaskRunner`] the config selects. It never inspects the runner kind.
//!
//! Implementations:
//! - [`SubprocessRunner`]: host process via `tokio::process`
//! - [`ContainerRunner`]: `docker run` (or compatible CLI)
//! - [`RemoteJobRunner`]: managed job service through a [`JobClient`]
//! - [`MockRunner`]: closure-scripted, for tests

mod container;
mod mock;
mod remote;
mod subprocess;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8PathBuf;

use crate::config::RunnerConfig;
use crate::error::Result;
use crate::util::DEFAULT_REMOTE_ENDPOINT;

pub use container::ContainerRunner;
pub use mock::MockRunner;
pub use remote::{HttpJobClient, JobClient, JobCondition, JobOperation, RemoteJobRunner};
pub use subprocess::SubprocessRunner;

/// One resolved command ready to execute
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    /// Qualified task name (for logs)
    pub task_name: String,
    pub image: String,
    /// `command ++ args`, placeholders already resolved
    pub command: Vec<String>,
    /// Declared container env
    pub env: BTreeMap<String, String>,
    /// Mounted read-write into containers
    pub pipeline_root: Utf8PathBuf,
}

/// Why a run did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The command ran and exited non-zero
    Exit(i32),
    /// The command could not be run at all (spawn error, missing image, API error)
    Infrastructure,
    /// The command exceeded the runner's time limit and was killed
    Timeout(Duration),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exit(code) => write!(f, "exit code {code}"),
            Self::Infrastructure => f.write_str("infrastructure failure"),
            Self::Timeout(limit) => write!(f, "timed out after {}s", limit.as_secs()),
        }
    }
}

/// Outcome of a run
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Success,
    Failure { kind: FailureKind, message: String },
}

impl RunStatus {
    pub fn exit(code: i32, message: impl Into<String>) -> Self {
        Self::Failure {
            kind: FailureKind::Exit(code),
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Failure {
            kind: FailureKind::Infrastructure,
            message: message.into(),
        }
    }

    pub fn timeout(limit: Duration, message: impl Into<String>) -> Self {
        Self::Failure {
            kind: FailureKind::Timeout(limit),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Executes resolved commands
///
/// Failures are data: a runner reports them through [`RunStatus`] and
/// never returns early with an error.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, request: &RunRequest) -> RunStatus;

    /// Runner name for logs and events (e.g., "subprocess", "container")
    fn name(&self) -> &str;
}

/// Build the runner selected by config
pub fn from_config(config: &RunnerConfig) -> Result<Arc<dyn TaskRunner>> {
    let runner: Arc<dyn TaskRunner> = match config {
        RunnerConfig::Subprocess {
            interpreter,
            timeout_secs,
        } => {
            let mut runner = SubprocessRunner::new();
            if let Some(interpreter) = interpreter {
                runner = runner.with_interpreter(interpreter.clone());
            }
            if let Some(secs) = timeout_secs {
                runner = runner.with_timeout(Duration::from_secs(*secs));
            }
            Arc::new(runner)
        }
        RunnerConfig::Container { cli } => Arc::new(ContainerRunner::new(cli.clone())),
        RunnerConfig::RemoteJob {
            project,
            location,
            endpoint,
            poll_interval_secs,
        } => {
            let endpoint = endpoint.as_deref().unwrap_or(DEFAULT_REMOTE_ENDPOINT);
            let client = HttpJobClient::from_env(endpoint, project, location)?;
            let mut runner = RemoteJobRunner::new(Arc::new(client));
            if let Some(secs) = poll_interval_secs {
                runner = runner.with_poll_interval(Duration::from_secs(*secs));
            }
            Arc::new(runner)
        }
    };
    Ok(runner)
}
