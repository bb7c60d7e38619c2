//! Subprocess Runner - executes the command on the host
//!
//! The child inherits the parent environment plus the declared container
//! env and `LOCAL_SESSION=true`. Output is captured and forwarded to
//! `tracing` line by line once the process exits.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::{RunRequest, RunStatus, TaskRunner};
use crate::util::LOCAL_SESSION_ENV;

/// Command prefix that an isolated interpreter replaces
const PYTHON_PREFIX: &str = "python3";

#[derive(Debug, Clone, Default)]
pub struct SubprocessRunner {
    /// Replaces a leading `python3` (e.g., a virtualenv's python)
    interpreter: Option<String>,
    timeout: Option<Duration>,
}

impl SubprocessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Final argv after interpreter substitution
    pub fn argv(&self, command: &[String]) -> Vec<String> {
        let mut argv = command.to_vec();
        if let (Some(interpreter), Some(first)) = (&self.interpreter, argv.first_mut()) {
            if first == PYTHON_PREFIX {
                *first = interpreter.clone();
            }
        }
        argv
    }
}

#[async_trait]
impl TaskRunner for SubprocessRunner {
    #[instrument(skip(self, request), fields(task = %request.task_name))]
    async fn run(&self, request: &RunRequest) -> RunStatus {
        let argv = self.argv(&request.command);
        let Some((program, args)) = argv.split_first() else {
            return RunStatus::infrastructure("empty command");
        };
        debug!(program = %program, args = args.len(), "Spawning subprocess");

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .envs(&request.env)
            .env(LOCAL_SESSION_ENV, "true")
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs(), "Subprocess timed out");
                    return RunStatus::timeout(
                        limit,
                        format!("Command timed out after {}ms", limit.as_millis()),
                    );
                }
            },
            None => command.output().await,
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return RunStatus::infrastructure(format!("Failed to execute '{program}': {e}"))
            }
        };

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            info!(target: "kiln::task", task = %request.task_name, "{line}");
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            info!(target: "kiln::task", task = %request.task_name, stream = "stderr", "{line}");
        }

        if output.status.success() {
            return RunStatus::Success;
        }
        let tail = stderr.trim();
        let message = if tail.is_empty() {
            format!("'{program}' failed")
        } else {
            format!("'{program}' failed: {tail}")
        };
        match output.status.code() {
            Some(code) => RunStatus::exit(code, message),
            // Killed by a signal
            None => RunStatus::exit(-1, message),
        }
    }

    fn name(&self) -> &str {
        "subprocess"
    }
}
