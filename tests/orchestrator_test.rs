//! Orchestrator Integration Tests
//!
//! Whole pipelines through `Orchestrator::run`: data passing, fan-out,
//! conditions, nested DAGs, importers and failure policy.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::sync::Notify;

use common::{args, config, echo_runner, first_arg, orchestrator, write_output};
use kiln::runner::{MockRunner, RunRequest, RunStatus, SubprocessRunner, TaskRunner};
use kiln::store::TaskStatus;
use kiln::test_fixtures::*;
use kiln::{EventKind, KilnError, RuntimeValue};

/// Emulates the arithmetic fixture components by task name
fn arith_runner() -> MockRunner {
    MockRunner::new(|request| {
        let arg = first_arg(request).to_string();
        let task = request.task_name.rsplit('.').next().unwrap_or_default();
        let base = task.split('[').next().unwrap_or_default();
        let out = match base.trim_start_matches("comp-") {
            "add-one" => (arg.parse::<i64>().unwrap() + 1).to_string(),
            "double" => (arg.parse::<i64>().unwrap() * 2).to_string(),
            "exclaim" => format!("{arg}!"),
            "total" => {
                let values: Vec<i64> = serde_json::from_str(&arg).unwrap();
                values.iter().sum::<i64>().to_string()
            }
            other => panic!("unexpected task {other}"),
        };
        write_output(request, &out);
        RunStatus::Success
    })
}

fn param(outputs: &std::collections::BTreeMap<String, RuntimeValue>, key: &str) -> Value {
    outputs[key].as_parameter().cloned().unwrap()
}

// ═══════════════════════════════════════════════════════════════
// DATA PASSING
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_linear_pipeline_passes_outputs_downstream() {
    let (_dir, config) = config(4);
    let runner = arith_runner();
    let orch = orchestrator(ADD_EXCLAIM_IR, config, Arc::new(runner.clone()));

    let outputs = orch.run(&args(&[("n", json!(4))])).await.unwrap();

    assert_eq!(param(&outputs, "Output"), json!("5!"));
    assert_eq!(runner.task_names(), vec!["add-one", "exclaim"]);

    let requests = runner.requests();
    assert_eq!(requests[0].image, "python:3.11");
    assert_eq!(first_arg(&requests[0]), "4");
    // The integer output reaches exclaim in canonical string form
    assert_eq!(first_arg(&requests[1]), "5");
}

#[tokio::test]
async fn test_default_input_and_env_placeholder() {
    let (_dir, config) = config(1);
    let runner = echo_runner(&[]);
    let orch = orchestrator(ECHO_IR, config, Arc::new(runner.clone()));

    let outputs = orch.run(&args(&[])).await.unwrap();

    assert_eq!(param(&outputs, "Output"), json!("world"));
    let request = &runner.requests()[0];
    assert_eq!(request.env.get("GREETING_TASK").map(String::as_str), Some("echo"));
}

#[tokio::test]
async fn test_missing_required_argument_fails_before_dispatch() {
    let (_dir, config) = config(1);
    let runner = arith_runner();
    let orch = orchestrator(ADD_EXCLAIM_IR, config, Arc::new(runner.clone()));

    let err = orch.run(&args(&[])).await.unwrap_err();

    assert_eq!(err.code(), "KILN-051");
    assert!(runner.requests().is_empty());
}

#[tokio::test]
async fn test_unknown_argument_is_rejected() {
    let (_dir, config) = config(1);
    let orch = orchestrator(ECHO_IR, config, Arc::new(echo_runner(&[])));

    let err = orch.run(&args(&[("nope", json!(1))])).await.unwrap_err();

    assert!(matches!(err, KilnError::UnknownArgument { .. }));
}

// ═══════════════════════════════════════════════════════════════
// FAN-OUT / FAN-IN
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_iteration_collects_outputs_in_item_order() {
    let (_dir, config) = config(2);
    let runner = arith_runner();
    let orch = orchestrator(FAN_IN_IR, config, Arc::new(runner.clone()));

    let outputs = orch.run(&args(&[])).await.unwrap();

    assert_eq!(param(&outputs, "doubled"), json!([2, 4, 6]));
    assert_eq!(param(&outputs, "total"), json!(12));

    let mut names = runner.task_names();
    names.sort();
    assert_eq!(names, vec!["double[0]", "double[1]", "double[2]", "total"]);

    let fanned = orch
        .event_log()
        .events()
        .into_iter()
        .find_map(|e| match e.kind {
            EventKind::IterationStarted { task_id, count } => Some((task_id, count)),
            _ => None,
        });
    assert_eq!(fanned, Some((Arc::from("double"), 3)));
}

#[tokio::test]
async fn test_iteration_instances_and_hyphenated_sibling_get_separate_roots() {
    let (_dir, config) = config(4);
    // Instances also leave an executor_output.json behind; a shared task
    // root would leak it into the sibling
    let runner = MockRunner::new(|request| {
        let output = Path::new(request.command.last().unwrap());
        if request.task_name.starts_with("gen[") {
            let overrides = json!({"parameterValues": {"Output": request.task_name}});
            let executor_output = output.parent().unwrap().join("executor_output.json");
            std::fs::write(executor_output, overrides.to_string()).unwrap();
        }
        write_output(request, first_arg(request));
        RunStatus::Success
    });
    let orch = orchestrator(SIBLING_DIRS_IR, config, Arc::new(runner.clone()));

    let outputs = orch.run(&args(&[])).await.unwrap();

    assert_eq!(param(&outputs, "generated"), json!(["gen[0]", "gen[1]", "gen[2]"]));
    assert_eq!(param(&outputs, "sibling"), json!("from-sibling"));

    let mut files: Vec<String> = runner
        .requests()
        .iter()
        .map(|r| r.command.last().unwrap().clone())
        .collect();
    files.sort();
    files.dedup();
    assert_eq!(files.len(), 4);
    assert!(files.iter().any(|f| Path::new(f).ends_with("gen/2/Output")));
    assert!(files.iter().any(|f| Path::new(f).ends_with("gen-2/Output")));
}

/// `emit` writes `item{x}`
fn emit_runner() -> MockRunner {
    MockRunner::new(|request| {
        let out = format!("item{}", first_arg(request));
        write_output(request, &out);
        RunStatus::Success
    })
}

#[tokio::test]
async fn test_iterated_dag_with_skipped_inner_task_keeps_item_alignment() {
    let (_dir, config) = config(4);
    let runner = emit_runner();
    let orch = orchestrator(LOOP_CONDITION_IR, config, Arc::new(runner.clone()));

    let outputs = orch.run(&args(&[])).await.unwrap();

    // Both selectors agree, one slot per item
    assert_eq!(param(&outputs, "via_collected"), json!(["item1", null, "item3"]));
    assert_eq!(param(&outputs, "via_value"), json!(["item1", null, "item3"]));

    let mut names = runner.task_names();
    names.sort();
    assert_eq!(names, vec!["loop[0].emit", "loop[2].emit"]);
}

#[tokio::test]
async fn test_consumer_of_omitted_nested_output_is_skipped() {
    let (_dir, config) = config(2);
    let orch = orchestrator(LOOP_CONDITION_IR, config, Arc::new(emit_runner()));

    orch.run(&args(&[])).await.unwrap();

    let skipped: Vec<(String, String)> = orch
        .event_log()
        .events()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::TaskSkipped { task_id, reason } => Some((task_id.to_string(), reason)),
            _ => None,
        })
        .collect();
    assert!(skipped
        .iter()
        .any(|(t, r)| t == "single.emit" && r.contains("is false")));
    assert!(skipped
        .iter()
        .any(|(t, r)| t == "report" && r == "upstream 'single' did not produce 'out'"));
}

// ═══════════════════════════════════════════════════════════════
// CONDITIONS / NESTED DAGS / IMPORTER
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_condition_picks_one_branch_and_skips_dependents() {
    let (_dir, config) = config(2);
    let runner = echo_runner(&[]);
    let orch = orchestrator(CONDITION_IR, config, Arc::new(runner.clone()));

    let outputs = orch.run(&args(&[])).await.unwrap();

    assert_eq!(param(&outputs, "Output"), json!("got heads"));
    let names = runner.task_names();
    assert!(names.contains(&"on-heads".to_string()));
    assert!(!names.contains(&"on-tails".to_string()));
    assert!(!names.contains(&"after-tails".to_string()));

    let skipped: Vec<(String, String)> = orch
        .event_log()
        .events()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::TaskSkipped { task_id, reason } => Some((task_id.to_string(), reason)),
            _ => None,
        })
        .collect();
    assert_eq!(skipped.len(), 2);
    assert!(skipped
        .iter()
        .any(|(t, r)| t == "on-tails" && r.contains("is false")));
    assert!(skipped
        .iter()
        .any(|(t, r)| t == "after-tails" && r.contains("on-tails")));
}

#[tokio::test]
async fn test_condition_other_branch() {
    let (_dir, config) = config(2);
    let runner = echo_runner(&[]);
    let orch = orchestrator(CONDITION_IR, config, Arc::new(runner.clone()));

    let outputs = orch.run(&args(&[("side", json!("tails"))])).await.unwrap();

    assert_eq!(param(&outputs, "Output"), json!("got tails"));
    assert!(runner.task_names().contains(&"after-tails".to_string()));
}

#[tokio::test]
async fn test_nested_dag_uses_qualified_names() {
    let (_dir, config) = config(2);
    let runner = arith_runner();
    let orch = orchestrator(NESTED_IR, config, Arc::new(runner.clone()));

    let outputs = orch.run(&args(&[])).await.unwrap();

    assert_eq!(param(&outputs, "Output"), json!("5!"));
    assert_eq!(runner.task_names(), vec!["inner.add-one", "inner.exclaim"]);

    let dags: Vec<String> = orch
        .event_log()
        .events()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::DagStarted { dag, .. } => Some(dag.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(dags, vec!["", "inner"]);
}

#[tokio::test]
async fn test_importer_produces_artifact_without_running() {
    let (_dir, config) = config(2);
    let runner = echo_runner(&[]);
    let orch = orchestrator(IMPORTER_IR, config, Arc::new(runner.clone()));

    let outputs = orch.run(&args(&[])).await.unwrap();

    assert_eq!(param(&outputs, "seen"), json!("gs://bucket/data.csv"));
    let artifact = outputs["data"].as_artifact().unwrap();
    assert_eq!(artifact.uri, "gs://bucket/data.csv");
    assert_eq!(artifact.schema_title, "system.Dataset");
    assert_eq!(artifact.metadata["source"], json!("census"));
    assert_eq!(artifact.metadata["rows"], json!(42));

    // The importer itself never reaches the runner
    assert_eq!(runner.task_names(), vec!["label", "consume"]);
}

// ═══════════════════════════════════════════════════════════════
// FAILURE POLICY
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_fail_fast_stops_new_dispatches() {
    let (_dir, config) = config(1);
    let runner = echo_runner(&["boom"]);
    let orch = orchestrator(FAIL_FAST_IR, config, Arc::new(runner.clone()));

    let err = orch.run(&args(&[])).await.unwrap_err();

    match &err {
        KilnError::TaskFailed { task, reason } => {
            assert_eq!(task, "boom");
            assert!(reason.contains("exit code 1"), "{reason}");
            assert!(reason.contains("boom exploded"), "{reason}");
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    assert_eq!(runner.task_names(), vec!["boom"]);

    let failed_task = orch
        .event_log()
        .events()
        .into_iter()
        .find_map(|e| match e.kind {
            EventKind::PipelineFailed { failed_task, .. } => failed_task,
            _ => None,
        });
    assert_eq!(failed_task.as_deref(), Some("boom"));
}

/// `boom` fails only once `other` is running; `other` takes a while
struct GatedRunner {
    other_started: Notify,
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl TaskRunner for GatedRunner {
    async fn run(&self, request: &RunRequest) -> RunStatus {
        self.seen.lock().push(request.task_name.clone());
        match request.task_name.as_str() {
            "boom" => {
                self.other_started.notified().await;
                RunStatus::exit(1, "boom exploded")
            }
            "other" => {
                self.other_started.notify_one();
                tokio::time::sleep(Duration::from_millis(50)).await;
                write_output(request, first_arg(request));
                RunStatus::Success
            }
            _ => {
                write_output(request, first_arg(request));
                RunStatus::Success
            }
        }
    }

    fn name(&self) -> &str {
        "gated"
    }
}

#[tokio::test]
async fn test_fail_fast_lets_in_flight_siblings_finish() {
    let (_dir, config) = config(4);
    let runner = Arc::new(GatedRunner {
        other_started: Notify::new(),
        seen: Mutex::new(Vec::new()),
    });
    let orch = orchestrator(FAIL_FAST_IR, config, runner.clone());

    let err = orch.run(&args(&[])).await.unwrap_err();

    assert!(matches!(err, KilnError::TaskFailed { ref task, .. } if task == "boom"));
    let mut seen = runner.seen.lock().clone();
    seen.sort();
    // cleanup becomes ready once boom settles but is never dispatched
    assert_eq!(seen, vec!["boom", "other"]);

    let completed: Vec<String> = orch
        .event_log()
        .events()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::TaskCompleted { task_id, .. } => Some(task_id.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec!["other"]);
}

#[tokio::test]
async fn test_timeout_is_reported_as_task_timeout() {
    let (_dir, config) = config(1);
    let runner = MockRunner::new(|_| RunStatus::timeout(Duration::from_secs(3), "killed"));
    let orch = orchestrator(ECHO_IR, config, Arc::new(runner));

    let err = orch.run(&args(&[])).await.unwrap_err();

    match err {
        KilnError::TaskFailed { task, reason } => {
            assert_eq!(task, "echo");
            assert!(reason.contains("KILN-012"), "{reason}");
            assert!(reason.contains("timed out after 3s"), "{reason}");
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_continue_on_failure_runs_independent_and_exit_tasks() {
    let (_dir, mut config) = config(1);
    config.fail_fast = false;
    let runner = echo_runner(&["boom"]);
    let orch = orchestrator(FAIL_FAST_IR, config, Arc::new(runner.clone()));

    let err = orch.run(&args(&[])).await.unwrap_err();
    assert!(matches!(err, KilnError::TaskFailed { ref task, .. } if task == "boom"));

    let names = runner.task_names();
    assert!(names.contains(&"other".to_string()));
    assert!(names.contains(&"cleanup".to_string()));
    assert!(!names.contains(&"downstream".to_string()));

    // The exit task sees the failure as a status struct
    let cleanup = runner
        .requests()
        .into_iter()
        .find(|r| r.task_name == "cleanup")
        .unwrap();
    let status: Value = serde_json::from_str(first_arg(&cleanup)).unwrap();
    assert_eq!(status["state"], "FAILED");
    assert_eq!(status["pipelineTaskName"], "boom");
    assert!(status["error"]["message"]
        .as_str()
        .unwrap()
        .contains("boom exploded"));

    let reasons: Vec<String> = orch
        .event_log()
        .filter_task("downstream")
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::TaskSkipped { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(reasons, vec!["upstream 'boom' failed"]);
}

#[tokio::test]
async fn test_missing_output_file_fails_task() {
    let (_dir, config) = config(1);
    // Succeeds without writing anything
    let runner = MockRunner::succeeding();
    let orch = orchestrator(ECHO_IR, config, Arc::new(runner));

    let err = orch.run(&args(&[])).await.unwrap_err();

    match err {
        KilnError::TaskFailed { task, reason } => {
            assert_eq!(task, "echo");
            assert!(reason.contains("KILN-060"), "{reason}");
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
}

// ═══════════════════════════════════════════════════════════════
// SINGLE COMPONENT / CLEANUP
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_run_component_returns_task_result() {
    let (_dir, config) = config(1);
    let orch = orchestrator(ADD_EXCLAIM_IR, config, Arc::new(arith_runner()));

    let result = orch
        .run_component("comp-add-one", &args(&[("x", json!(41))]))
        .await
        .unwrap();

    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(result.outputs.output().unwrap().as_parameter(), Some(&json!(42)));
}

#[tokio::test]
async fn test_run_component_failure_is_a_failed_result() {
    let (_dir, config) = config(1);
    let orch = orchestrator(FAIL_FAST_IR, config, Arc::new(echo_runner(&["comp-boom"])));

    let result = orch.run_component("comp-boom", &args(&[])).await.unwrap();

    assert!(matches!(result.status, TaskStatus::Failed(ref msg) if msg.contains("exit code 1")));
}

#[tokio::test]
async fn test_cleanup_removes_task_roots_after_success() {
    let (dir, mut config) = config(1);
    config.cleanup = true;
    let orch = orchestrator(ECHO_IR, config, Arc::new(echo_runner(&[])));

    orch.run(&args(&[])).await.unwrap();

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

// ═══════════════════════════════════════════════════════════════
// REAL SUBPROCESSES
// ═══════════════════════════════════════════════════════════════

#[cfg(unix)]
#[tokio::test]
async fn test_subprocess_add_exclaim_end_to_end() {
    let (dir, config) = config(2);
    let orch = orchestrator(ADD_EXCLAIM_IR, config, Arc::new(SubprocessRunner::new()));

    let outputs = orch.run(&args(&[("n", json!(4))])).await.unwrap();

    assert_eq!(param(&outputs, "Output"), json!("5!"));
    // One pipeline resource directory holding both task roots
    let runs: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(runs.len(), 1);
    let run_dir = runs.into_iter().next().unwrap().unwrap().path();
    assert!(run_dir.join("add-one").join("Output").exists());
    assert!(run_dir.join("exclaim").join("Output").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_subprocess_fan_in_end_to_end() {
    let (_dir, config) = config(3);
    let orch = orchestrator(FAN_IN_IR, config, Arc::new(SubprocessRunner::new()));

    let outputs = orch.run(&args(&[])).await.unwrap();

    assert_eq!(param(&outputs, "doubled"), json!([2, 4, 6]));
    assert_eq!(param(&outputs, "total"), json!(12));
}

#[cfg(unix)]
#[tokio::test]
async fn test_subprocess_failure_reports_exit_code() {
    let (_dir, config) = config(1);
    let orch = orchestrator(FAIL_FAST_IR, config, Arc::new(SubprocessRunner::new()));

    let err = orch.run(&args(&[])).await.unwrap_err();

    assert_eq!(err.code(), "KILN-011");
    assert!(err.to_string().contains("boom"));
}
