//! Container Runner - executes the command in a fresh container
//!
//! Shells out to a docker-compatible CLI:
//! `{cli} run --rm -e LOCAL_SESSION=true -v {root}:{root}:rw --entrypoint {cmd0} {image} {args..}`
//!
//! The pipeline root is mounted at the same path so task roots resolve
//! identically inside and outside the container.

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::{RunRequest, RunStatus, TaskRunner};
use crate::util::LOCAL_SESSION_ENV;

/// `docker run` exits 125 when the daemon itself failed (missing image, bad flags)
const CLI_ERROR_EXIT: i32 = 125;

#[derive(Debug, Clone)]
pub struct ContainerRunner {
    cli: String,
}

impl ContainerRunner {
    pub fn new(cli: impl Into<String>) -> Self {
        Self { cli: cli.into() }
    }

    pub fn cli(&self) -> &str {
        &self.cli
    }

    /// CLI arguments (after the program name) for one request
    pub fn cli_args(&self, request: &RunRequest) -> Option<Vec<String>> {
        let (entrypoint, args) = request.command.split_first()?;
        let root = request.pipeline_root.as_str();

        let mut argv = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-e".to_string(),
            format!("{LOCAL_SESSION_ENV}=true"),
        ];
        for (key, value) in &request.env {
            argv.push("-e".to_string());
            argv.push(format!("{key}={value}"));
        }
        argv.extend([
            "-v".to_string(),
            format!("{root}:{root}:rw"),
            "--entrypoint".to_string(),
            entrypoint.clone(),
            request.image.clone(),
        ]);
        argv.extend(args.iter().cloned());
        Some(argv)
    }
}

impl Default for ContainerRunner {
    fn default() -> Self {
        Self::new(crate::util::DEFAULT_CONTAINER_CLI)
    }
}

#[async_trait]
impl TaskRunner for ContainerRunner {
    #[instrument(skip(self, request), fields(task = %request.task_name, image = %request.image))]
    async fn run(&self, request: &RunRequest) -> RunStatus {
        let Some(args) = self.cli_args(request) else {
            return RunStatus::infrastructure("empty command");
        };

        if let Err(e) = tokio::fs::create_dir_all(request.pipeline_root.as_std_path()).await {
            return RunStatus::infrastructure(format!(
                "Failed to create pipeline root {}: {e}",
                request.pipeline_root
            ));
        }

        debug!(cli = %self.cli, "Starting container");
        let output = tokio::process::Command::new(&self.cli)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return RunStatus::infrastructure(format!(
                    "Container CLI '{}' is not available: {e}",
                    self.cli
                ))
            }
        };

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            info!(target: "kiln::task", task = %request.task_name, "{line}");
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            info!(target: "kiln::task", task = %request.task_name, stream = "stderr", "{line}");
        }

        match output.status.code() {
            Some(0) => RunStatus::Success,
            Some(CLI_ERROR_EXIT) => RunStatus::infrastructure(format!(
                "{} could not start {}: {}",
                self.cli,
                request.image,
                stderr.trim()
            )),
            Some(code) => RunStatus::exit(code, format!("container exited: {}", stderr.trim())),
            None => RunStatus::exit(-1, "container terminated by signal"),
        }
    }

    fn name(&self) -> &str {
        "container"
    }
}
