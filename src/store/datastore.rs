//! ValueStore - per-DAG storage of parent inputs and task outputs
//!
//! One store exists per DAG invocation. Keys are `Arc<str>` so the same
//! name can be shared with events without copying. DashMap gives
//! lock-free concurrent access from the orchestrator's task futures.
//!
//! Every output slot is written at most once; a second write is a
//! programming error and panics.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::KilnError;

use super::value::{RuntimeValue, TaskOutputs};

/// Terminal state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Succeeded,
    Failed,
    Skipped,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        }
    }
}

/// Task execution status
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Success,
    Failed(String),
}

/// Result of running one task (leaf or nested DAG)
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub outputs: TaskOutputs,
    pub duration: Duration,
    pub status: TaskStatus,
}

impl TaskResult {
    pub fn success(outputs: TaskOutputs, duration: Duration) -> Self {
        Self {
            outputs,
            duration,
            status: TaskStatus::Success,
        }
    }

    pub fn failed(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            outputs: TaskOutputs::new(),
            duration,
            status: TaskStatus::Failed(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, TaskStatus::Success)
    }

    /// Error message if failed
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            TaskStatus::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn state(&self) -> TaskState {
        match self.status {
            TaskStatus::Success => TaskState::Succeeded,
            TaskStatus::Failed(_) => TaskState::Failed,
        }
    }

    /// The single output of a single-output task
    pub fn output(&self) -> Result<&RuntimeValue, KilnError> {
        self.outputs.output()
    }
}

/// Final status of a task, as seen by `taskFinalStatus` bindings
#[derive(Debug, Clone, PartialEq)]
pub struct FinalStatus {
    pub state: TaskState,
    pub task_name: String,
    pub job_resource_name: String,
    pub error: Option<String>,
}

impl FinalStatus {
    /// JSON struct handed to exit-handler tasks
    pub fn to_value(&self) -> Value {
        json!({
            "state": self.state.as_str(),
            "pipelineTaskName": self.task_name,
            "pipelineJobResourceName": self.job_resource_name,
            "error": {
                "code": if self.state == TaskState::Failed { 1 } else { 0 },
                "message": self.error.clone().unwrap_or_default(),
            },
        })
    }
}

#[derive(Debug, Default)]
struct TaskSlot {
    skipped: bool,
    outputs: BTreeMap<String, RuntimeValue>,
    /// Declared outputs a nested DAG left out because their producers were skipped
    omitted: Vec<String>,
}

/// Thread-safe store for one DAG invocation
#[derive(Clone, Default)]
pub struct ValueStore {
    /// Inputs handed to the DAG by its caller
    parent_inputs: Arc<DashMap<Arc<str>, RuntimeValue>>,
    /// task → output key → value
    tasks: Arc<DashMap<Arc<str>, TaskSlot>>,
    /// iterated task → instance index → outputs
    instances: Arc<DashMap<Arc<str>, BTreeMap<usize, TaskOutputs>>>,
    final_statuses: Arc<DashMap<Arc<str>, FinalStatus>>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with the DAG's bound inputs
    pub fn with_parent_inputs(inputs: impl IntoIterator<Item = (String, RuntimeValue)>) -> Self {
        let store = Self::new();
        for (name, value) in inputs {
            store.put_parent_input(&name, value);
        }
        store
    }

    // ═══════════════════════════════════════════════════════════════
    // PARENT INPUTS
    // ═══════════════════════════════════════════════════════════════

    /// # Panics
    ///
    /// When the input was already bound.
    pub fn put_parent_input(&self, name: &str, value: RuntimeValue) {
        let previous = self.parent_inputs.insert(Arc::from(name), value);
        assert!(previous.is_none(), "parent input '{name}' bound twice");
    }

    pub fn get_parent_input(&self, name: &str) -> Result<RuntimeValue, KilnError> {
        self.parent_inputs
            .get(name)
            .map(|v| v.value().clone())
            .ok_or_else(|| KilnError::ParentInputNotFound {
                name: name.to_string(),
            })
    }

    pub fn has_parent_input(&self, name: &str) -> bool {
        self.parent_inputs.contains_key(name)
    }

    // ═══════════════════════════════════════════════════════════════
    // TASK OUTPUTS
    // ═══════════════════════════════════════════════════════════════

    /// Record one output of a completed task
    ///
    /// # Panics
    ///
    /// When the slot was already written or the task was marked skipped.
    pub fn put_task_output(&self, task: &str, key: &str, value: RuntimeValue) {
        let mut slot = self.tasks.entry(Arc::from(task)).or_default();
        assert!(!slot.skipped, "task '{task}' was skipped; it cannot produce '{key}'");
        let previous = slot.outputs.insert(key.to_string(), value);
        assert!(previous.is_none(), "output '{task}.{key}' written twice");
    }

    /// Record every output of a completed task
    pub fn put_task_outputs(&self, task: &str, outputs: &TaskOutputs) {
        // Make sure a task with no outputs still has a slot
        self.tasks.entry(Arc::from(task)).or_default();
        for (key, value) in outputs.iter() {
            self.put_task_output(task, key, value.clone());
        }
    }

    /// Read a task output
    ///
    /// Fails with `OutputSkipped` when the producer was skipped or omitted
    /// the key, and `OutputNotProduced` when the slot is empty.
    pub fn get_task_output(&self, task: &str, key: &str) -> Result<RuntimeValue, KilnError> {
        let Some(slot) = self.tasks.get(task) else {
            return Err(KilnError::OutputNotProduced {
                task: task.to_string(),
                key: key.to_string(),
            });
        };
        if slot.skipped || slot.omitted.iter().any(|k| k == key) {
            return Err(KilnError::OutputSkipped {
                task: task.to_string(),
                key: key.to_string(),
            });
        }
        slot.outputs
            .get(key)
            .cloned()
            .ok_or_else(|| KilnError::OutputNotProduced {
                task: task.to_string(),
                key: key.to_string(),
            })
    }

    /// Record that a finished task deliberately did not produce `key`
    ///
    /// # Panics
    ///
    /// When the key was written.
    pub fn mark_omitted(&self, task: &str, key: &str) {
        let mut slot = self.tasks.entry(Arc::from(task)).or_default();
        assert!(!slot.outputs.contains_key(key), "output '{task}.{key}' was produced");
        slot.omitted.push(key.to_string());
    }

    pub fn is_omitted(&self, task: &str, key: &str) -> bool {
        self.tasks
            .get(task)
            .is_some_and(|s| s.omitted.iter().any(|k| k == key))
    }

    pub fn mark_skipped(&self, task: &str) {
        let mut slot = self.tasks.entry(Arc::from(task)).or_default();
        assert!(slot.outputs.is_empty(), "task '{task}' already produced outputs");
        slot.skipped = true;
    }

    pub fn is_skipped(&self, task: &str) -> bool {
        self.tasks.get(task).is_some_and(|s| s.skipped)
    }

    // ═══════════════════════════════════════════════════════════════
    // ITERATION INSTANCES
    // ═══════════════════════════════════════════════════════════════

    /// Open the instance table for an iterated task (possibly with zero items)
    pub fn declare_iteration(&self, task: &str) {
        self.instances.entry(Arc::from(task)).or_default();
    }

    /// # Panics
    ///
    /// When the same instance index is recorded twice.
    pub fn put_instance_outputs(&self, task: &str, index: usize, outputs: TaskOutputs) {
        let mut table = self.instances.entry(Arc::from(task)).or_default();
        let previous = table.insert(index, outputs);
        assert!(previous.is_none(), "instance {task}[{index}] written twice");
    }

    /// Record one output key of one instance
    ///
    /// # Panics
    ///
    /// When the key was already written for that instance.
    pub fn put_instance_output(&self, task: &str, index: usize, key: &str, value: RuntimeValue) {
        let mut table = self.instances.entry(Arc::from(task)).or_default();
        let outputs = table.entry(index).or_default();
        assert!(outputs.get(key).is_none(), "output '{task}[{index}].{key}' written twice");
        outputs.insert(key, value);
    }

    /// Whether the task ran under a parameter iterator
    pub fn is_iterated(&self, task: &str) -> bool {
        self.instances.contains_key(task)
    }

    /// Outputs of every instance of an iterated task, in iteration order
    ///
    /// One entry per instance: an instance that did not produce `key` (its
    /// producer inside a nested DAG was skipped) contributes `null`.
    pub fn collected(&self, task: &str, key: &str) -> Result<Vec<RuntimeValue>, KilnError> {
        if self.is_skipped(task) {
            return Err(KilnError::OutputSkipped {
                task: task.to_string(),
                key: key.to_string(),
            });
        }
        let Some(table) = self.instances.get(task) else {
            return Err(KilnError::OutputNotProduced {
                task: task.to_string(),
                key: key.to_string(),
            });
        };
        Ok(table
            .values()
            .map(|outputs| {
                outputs
                    .get(key)
                    .cloned()
                    .unwrap_or(RuntimeValue::Parameter(Value::Null))
            })
            .collect())
    }

    // ═══════════════════════════════════════════════════════════════
    // FINAL STATUS
    // ═══════════════════════════════════════════════════════════════

    pub fn put_final_status(&self, task: &str, status: FinalStatus) {
        self.final_statuses.insert(Arc::from(task), status);
    }

    pub fn final_status(&self, task: &str) -> Option<FinalStatus> {
        self.final_statuses.get(task).map(|s| s.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Artifact;
    use serde_json::json;

    #[test]
    fn parent_inputs_round_trip() {
        let store = ValueStore::with_parent_inputs([("n".to_string(), RuntimeValue::from(json!(5)))]);
        assert_eq!(store.get_parent_input("n").unwrap(), RuntimeValue::from(json!(5)));
        assert!(store.has_parent_input("n"));

        let err = store.get_parent_input("missing").unwrap_err();
        assert_eq!(err.code(), "KILN-047");
    }

    #[test]
    fn task_output_then_read() {
        let store = ValueStore::new();
        store.put_task_output("a", "x", json!("5!").into());
        assert_eq!(
            store.get_task_output("a", "x").unwrap(),
            RuntimeValue::from(json!("5!"))
        );
    }

    #[test]
    fn read_before_write_is_not_produced() {
        let store = ValueStore::new();
        let err = store.get_task_output("a", "x").unwrap_err();
        assert_eq!(err.code(), "KILN-044");

        store.put_task_output("a", "y", json!(1).into());
        assert_eq!(store.get_task_output("a", "x").unwrap_err().code(), "KILN-044");
    }

    #[test]
    fn read_of_skipped_task_is_distinct_error() {
        let store = ValueStore::new();
        store.mark_skipped("a");
        let err = store.get_task_output("a", "x").unwrap_err();
        assert_eq!(err.code(), "KILN-043");
        assert!(store.is_skipped("a"));
    }

    #[test]
    #[should_panic(expected = "written twice")]
    fn double_write_panics() {
        let store = ValueStore::new();
        store.put_task_output("a", "x", json!(1).into());
        store.put_task_output("a", "x", json!(2).into());
    }

    #[test]
    fn omitted_output_reads_as_skipped() {
        let store = ValueStore::new();
        store.put_task_output("inner", "kept", json!(1).into());
        store.mark_omitted("inner", "dropped");

        assert!(store.is_omitted("inner", "dropped"));
        assert!(!store.is_skipped("inner"));
        assert!(store.get_task_output("inner", "kept").is_ok());
        assert!(matches!(
            store.get_task_output("inner", "dropped"),
            Err(KilnError::OutputSkipped { .. })
        ));
        assert_eq!(store.get_task_output("inner", "other").unwrap_err().code(), "KILN-044");
    }

    #[test]
    fn collected_preserves_iteration_order() {
        let store = ValueStore::new();
        assert!(!store.is_iterated("double"));
        store.declare_iteration("double");
        assert!(store.is_iterated("double"));
        // Completion order differs from iteration order
        for (i, v) in [(2, 6), (0, 2), (1, 4)] {
            let mut outputs = TaskOutputs::new();
            outputs.insert("Output", json!(v));
            store.put_instance_outputs("double", i, outputs);
        }
        let values: Vec<Value> = store
            .collected("double", "Output")
            .unwrap()
            .into_iter()
            .filter_map(|v| v.as_parameter().cloned())
            .collect();
        assert_eq!(values, vec![json!(2), json!(4), json!(6)]);
    }

    #[test]
    fn single_instance_outputs_merge_per_index() {
        let store = ValueStore::new();
        store.put_instance_output("t", 1, "b", json!("y").into());
        store.put_instance_output("t", 0, "a", json!("x").into());
        store.put_instance_output("t", 1, "a", json!("z").into());
        assert_eq!(
            store.collected("t", "a").unwrap(),
            vec![RuntimeValue::from(json!("x")), RuntimeValue::from(json!("z"))]
        );
        // Instance 0 never produced `b`: its slot holds null
        assert_eq!(
            store.collected("t", "b").unwrap(),
            vec![RuntimeValue::from(Value::Null), RuntimeValue::from(json!("y"))]
        );
    }

    #[test]
    #[should_panic(expected = "bound twice")]
    fn parent_input_bound_twice_panics() {
        let store = ValueStore::new();
        store.put_parent_input("n", json!(1).into());
        store.put_parent_input("n", json!(2).into());
    }

    #[test]
    fn empty_iteration_collects_nothing() {
        let store = ValueStore::new();
        store.declare_iteration("t");
        assert!(store.collected("t", "Output").unwrap().is_empty());
        assert_eq!(store.collected("other", "Output").unwrap_err().code(), "KILN-044");
    }

    #[test]
    fn final_status_value_shape() {
        let status = FinalStatus {
            state: TaskState::Failed,
            task_name: "train".to_string(),
            job_resource_name: "p-2024".to_string(),
            error: Some("exit 1".to_string()),
        };
        let value = status.to_value();
        assert_eq!(value["state"], "FAILED");
        assert_eq!(value["error"]["code"], 1);
        assert_eq!(value["error"]["message"], "exit 1");
    }

    #[test]
    fn store_clones_share_state() {
        let store = ValueStore::new();
        let clone = store.clone();
        clone.put_task_output("a", "model", Artifact::new("model", "/tmp/m").into());
        assert!(store.get_task_output("a", "model").unwrap().is_artifact());
    }

    #[test]
    fn concurrent_writes_all_stored() {
        use std::thread;

        let store = Arc::new(ValueStore::new());
        let handles: Vec<_> = (0..64)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.put_task_output(&format!("task_{i}"), "out", json!(i).into());
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for i in 0..64 {
            assert!(store.get_task_output(&format!("task_{i}"), "out").is_ok());
        }
    }

    #[test]
    fn task_result_accessors() {
        let failed = TaskResult::failed("boom", Duration::from_millis(3));
        assert_eq!(failed.error(), Some("boom"));
        assert_eq!(failed.state(), TaskState::Failed);

        assert!(!failed.is_success());
        assert!(matches!(failed.output(), Err(KilnError::NoOutput)));

        let mut outputs = TaskOutputs::new();
        outputs.insert("Output", json!(42));
        let ok = TaskResult::success(outputs, Duration::ZERO);
        assert_eq!(ok.state().as_str(), "SUCCEEDED");
        assert_eq!(ok.output().unwrap(), &RuntimeValue::from(json!(42)));
    }
}
