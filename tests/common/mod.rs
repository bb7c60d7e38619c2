//! Shared helpers for integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use camino::Utf8PathBuf;
use serde_json::Value;
use tempfile::TempDir;

use kiln::runner::{MockRunner, RunRequest, RunStatus, TaskRunner};
use kiln::{ExecutionConfig, Orchestrator, PipelineSpec};

/// Config rooted in a fresh temp dir (keep the `TempDir` alive)
pub fn config(parallelism: usize) -> (TempDir, ExecutionConfig) {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path");
    let config = ExecutionConfig {
        pipeline_root: root,
        parallelism,
        ..ExecutionConfig::default()
    };
    (dir, config)
}

pub fn orchestrator(
    source: &str,
    config: ExecutionConfig,
    runner: Arc<dyn TaskRunner>,
) -> Orchestrator {
    let spec = PipelineSpec::from_yaml(source).expect("fixture parses");
    Orchestrator::new(spec, config, runner)
}

pub fn args(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Fixture commands put their output file last: write `content` there
pub fn write_output(request: &RunRequest, content: &str) {
    let path = request.command.last().expect("command has an output path");
    std::fs::write(path, content).expect("write output file");
}

/// Positional argument `$0` of an `sh -c` fixture command
pub fn first_arg(request: &RunRequest) -> &str {
    request.command.get(3).map(String::as_str).unwrap_or_default()
}

/// Mock that echoes `$0` into the output file, failing the named tasks
pub fn echo_runner(failing: &'static [&'static str]) -> MockRunner {
    MockRunner::new(move |request| {
        let task = request.task_name.as_str();
        if failing.contains(&task) {
            return RunStatus::exit(1, format!("{task} exploded"));
        }
        if request.command.len() > 4 {
            let arg = first_arg(request).to_string();
            write_output(request, &arg);
        }
        RunStatus::Success
    })
}
