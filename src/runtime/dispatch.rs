//! Task Dispatch - input binding, fan-out and leaf executors
//!
//! - `bind_task_inputs`: IR bindings → values, with skip propagation
//! - `iteration_items`: the sequence a `parameterIterator` fans out over
//! - `run_container` / `run_importer`: the two leaf executor kinds
//! - `aggregate_instances` / `collect_dag_outputs`: fan-in

use std::collections::BTreeMap;
use std::sync::Arc;

use camino::Utf8Path;
use rustc_hash::FxHashSet;
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::ast::{
    json_type_name, ArtifactBinding, ArtifactUri, ComponentSpec, ContainerSpec, DagSpec,
    ImporterSpec, IteratorItems, ParameterBinding, ParameterIterator, ParameterOutputSpec,
    TaskSpec,
};
use crate::binding::{parse_command, ExecutorInput, ResolutionContext};
use crate::error::KilnError;
use crate::event::{EventKind, EventLog};
use crate::runner::{FailureKind, RunRequest, RunStatus, TaskRunner};
use crate::store::{Artifact, RuntimeValue, TaskOutputs, ValueStore};
use crate::util::{task_root, IMPORTER_OUTPUT_KEY};

use super::output::capture_outputs;

// ═══════════════════════════════════════════════════════════════
// INPUT BINDING
// ═══════════════════════════════════════════════════════════════

/// Bound inputs of a task, or the reason it must be skipped
#[derive(Debug)]
pub(crate) enum Bound {
    Inputs(BTreeMap<String, RuntimeValue>),
    Skip(String),
}

/// An upstream value, or why it is unavailable
enum Upstream {
    Value(RuntimeValue),
    Missing(String),
}

fn read_upstream(
    store: &ValueStore,
    failed: &FxHashSet<Arc<str>>,
    producer: &str,
    key: &str,
) -> Result<Upstream, KilnError> {
    if failed.contains(producer) {
        return Ok(Upstream::Missing(format!("upstream '{producer}' failed")));
    }
    match store.get_task_output(producer, key) {
        Ok(value) => Ok(Upstream::Value(value)),
        Err(KilnError::OutputSkipped { .. }) if store.is_omitted(producer, key) => Ok(
            Upstream::Missing(format!("upstream '{producer}' did not produce '{key}'")),
        ),
        Err(KilnError::OutputSkipped { .. }) => {
            Ok(Upstream::Missing(format!("upstream '{producer}' was skipped")))
        }
        Err(e) => Err(e),
    }
}

/// Resolve every input binding of a task against its DAG's store
///
/// `failed` holds the upstream tasks that failed (only possible under the
/// ALL_UPSTREAM_TASKS_COMPLETED strategy). An unavailable upstream value
/// leaves an optional or defaulted input absent and skips the task
/// otherwise. Parent inputs the caller left unbound stay absent; defaults
/// and required-input checks happen in `bind_defaults`.
pub(crate) fn bind_task_inputs(
    task_name: &str,
    task: &TaskSpec,
    component: &ComponentSpec,
    store: &ValueStore,
    failed: &FxHashSet<Arc<str>>,
) -> Result<Bound, KilnError> {
    let defs = &component.input_definitions;
    let mut inputs = BTreeMap::new();

    for (name, binding) in &task.inputs.parameters {
        let value = match binding {
            ParameterBinding::Constant { runtime_value } => {
                Some(RuntimeValue::Parameter(runtime_value.constant.clone()))
            }
            ParameterBinding::ComponentInput {
                component_input_parameter,
            } => store.get_parent_input(component_input_parameter).ok(),
            ParameterBinding::TaskOutput {
                task_output_parameter: spec,
            } => match read_upstream(store, failed, &spec.producer_task, &spec.output_parameter_key)? {
                Upstream::Value(v) => Some(v),
                Upstream::Missing(reason) if defs.is_optional(name) => {
                    debug!(task = %task_name, input = %name, %reason, "Input left unbound");
                    None
                }
                Upstream::Missing(reason) => return Ok(Bound::Skip(reason)),
            },
            ParameterBinding::TaskFinalStatus { task_final_status } => {
                let producer = &task_final_status.producer_task;
                let status = store.final_status(producer).ok_or_else(|| KilnError::BindingError {
                    task: task_name.to_string(),
                    reason: format!("no final status recorded for '{producer}'"),
                })?;
                Some(RuntimeValue::Parameter(status.to_value()))
            }
        };
        if let Some(value) = value {
            inputs.insert(name.clone(), value);
        }
    }

    for (name, binding) in &task.inputs.artifacts {
        let value = match binding {
            ArtifactBinding::ComponentInput {
                component_input_artifact,
            } => store.get_parent_input(component_input_artifact).ok(),
            ArtifactBinding::TaskOutput {
                task_output_artifact: spec,
            } => match read_upstream(store, failed, &spec.producer_task, &spec.output_artifact_key)? {
                Upstream::Value(v) => Some(v),
                Upstream::Missing(reason) if defs.is_optional(name) => {
                    debug!(task = %task_name, input = %name, %reason, "Input left unbound");
                    None
                }
                Upstream::Missing(reason) => return Ok(Bound::Skip(reason)),
            },
        };
        if let Some(value) = value {
            inputs.insert(name.clone(), value);
        }
    }

    Ok(Bound::Inputs(inputs))
}

/// Declared outputs missing from a finished task's outputs
///
/// Only nested DAGs can finish like this: leaves fail on a missing output.
pub(crate) fn omitted_outputs<'c>(component: &'c ComponentSpec, outputs: &TaskOutputs) -> Vec<&'c str> {
    let defs = &component.output_definitions;
    defs.parameters
        .keys()
        .chain(defs.artifacts.keys())
        .filter(|key| outputs.get(key.as_str()).is_none())
        .map(String::as_str)
        .collect()
}

/// Parameter inputs only (what trigger conditions see)
pub(crate) fn parameter_values(inputs: &BTreeMap<String, RuntimeValue>) -> BTreeMap<String, Value> {
    inputs
        .iter()
        .filter_map(|(k, v)| v.as_parameter().map(|p| (k.clone(), p.clone())))
        .collect()
}

// ═══════════════════════════════════════════════════════════════
// ITERATION
// ═══════════════════════════════════════════════════════════════

/// Elements a task iterates over
///
/// Raw items and iterator inputs may be a JSON list or a string holding one.
pub(crate) fn iteration_items(
    task_name: &str,
    iterator: &ParameterIterator,
    inputs: &BTreeMap<String, RuntimeValue>,
) -> Result<Vec<Value>, KilnError> {
    let (source, items) = match &iterator.items {
        IteratorItems::Raw { raw } => ("raw items", raw.clone()),
        IteratorItems::InputParameter { input_parameter } => {
            let value = inputs
                .get(input_parameter)
                .and_then(RuntimeValue::as_parameter)
                .cloned()
                .ok_or_else(|| KilnError::BindingError {
                    task: task_name.to_string(),
                    reason: format!("iterator input '{input_parameter}' is not bound"),
                })?;
            (input_parameter.as_str(), value)
        }
    };

    let items = match items {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    };
    match items {
        Value::Array(items) => Ok(items),
        other => Err(KilnError::TypeMismatch {
            name: format!("{task_name} ({source})"),
            expected: "LIST".to_string(),
            actual: json_type_name(&other).to_string(),
        }),
    }
}

/// Fan-in: every declared output becomes a list, one entry per instance
///
/// Parameters aggregate into a JSON array aligned with the items; an instance
/// that omitted the output contributes `null`. Artifacts flatten into one list.
pub(crate) fn aggregate_instances(component: &ComponentSpec, instances: &[TaskOutputs]) -> TaskOutputs {
    let mut outputs = TaskOutputs::new();
    for name in component.output_definitions.parameters.keys() {
        let values: Vec<Value> = instances
            .iter()
            .map(|o| {
                o.get(name)
                    .and_then(RuntimeValue::as_parameter)
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect();
        outputs.insert(name.clone(), Value::Array(values));
    }
    for name in component.output_definitions.artifacts.keys() {
        let artifacts: Vec<Artifact> = instances
            .iter()
            .filter_map(|o| o.get(name))
            .flat_map(|v| v.artifacts().iter().cloned())
            .collect();
        outputs.insert(name.clone(), RuntimeValue::ArtifactList(artifacts));
    }
    outputs
}

// ═══════════════════════════════════════════════════════════════
// LEAF EXECUTORS
// ═══════════════════════════════════════════════════════════════

/// Identity and location of one leaf execution
pub(crate) struct Leaf<'a> {
    /// Qualified name (`outer.inner[2]`)
    pub task_id: &'a Arc<str>,
    /// Resource name (`outer-inner-2`)
    pub task_resource: &'a str,
    /// Task directory under the run (`outer/inner/2`)
    pub task_dir: &'a str,
    pub pipeline_resource: &'a str,
    pub job_uuid: &'a str,
    pub pipeline_root: &'a Utf8Path,
    pub event_log: &'a EventLog,
}

impl Leaf<'_> {
    fn resolution_context<'a>(
        &'a self,
        executor_input: &'a ExecutorInput,
        task_uuid: &'a str,
    ) -> ResolutionContext<'a> {
        ResolutionContext {
            executor_input,
            pipeline_job_name: self.pipeline_resource,
            pipeline_job_uuid: self.job_uuid,
            task_name: self.task_resource,
            task_uuid,
            pipeline_root: self.pipeline_root.as_str(),
        }
    }
}

/// Resolve the command line, run it, and capture the outputs
pub(crate) async fn run_container(
    leaf: &Leaf<'_>,
    component: &ComponentSpec,
    container: &ContainerSpec,
    inputs: &BTreeMap<String, RuntimeValue>,
    runner: &dyn TaskRunner,
) -> Result<TaskOutputs, KilnError> {
    let root = task_root(leaf.pipeline_root, leaf.pipeline_resource, leaf.task_dir);
    tokio::fs::create_dir_all(&root).await?;

    let executor_input = ExecutorInput::build(component, inputs, &root);
    let elements = parse_command(container.full_command())?;
    let task_uuid = Uuid::new_v4().to_string();
    let ctx = leaf.resolution_context(&executor_input, &task_uuid);

    let command = ctx.resolve_command(&elements)?;
    let env = container
        .env
        .iter()
        .map(|var| Ok((var.name.clone(), ctx.resolve_str(&var.value)?.into_owned())))
        .collect::<Result<BTreeMap<_, _>, KilnError>>()?;

    info!(task = %leaf.task_id, image = %container.image, ?command, "Resolved command");
    leaf.event_log.emit(EventKind::CommandResolved {
        task_id: Arc::clone(leaf.task_id),
        image: container.image.clone(),
        command: command.clone(),
    });

    let request = RunRequest {
        task_name: leaf.task_id.to_string(),
        image: container.image.clone(),
        command,
        env,
        pipeline_root: leaf.pipeline_root.to_path_buf(),
    };
    match runner.run(&request).await {
        RunStatus::Success => capture_outputs(component, &executor_input).await,
        RunStatus::Failure {
            kind: FailureKind::Timeout(limit),
            ..
        } => Err(KilnError::TaskTimeout {
            task: leaf.task_id.to_string(),
            timeout_secs: limit.as_secs(),
        }),
        RunStatus::Failure { kind, message } => {
            Err(KilnError::Execution(format!("{kind}: {message}")))
        }
    }
}

/// Produce the `artifact` output by reference; nothing is executed
pub(crate) fn run_importer(
    leaf: &Leaf<'_>,
    component: &ComponentSpec,
    importer: &ImporterSpec,
    inputs: &BTreeMap<String, RuntimeValue>,
) -> Result<TaskOutputs, KilnError> {
    let uri = match &importer.artifact_uri {
        ArtifactUri::Constant { constant } => constant.clone(),
        ArtifactUri::RuntimeParameter { runtime_parameter } => inputs
            .get(runtime_parameter)
            .and_then(RuntimeValue::as_parameter)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| KilnError::BindingError {
                task: leaf.task_id.to_string(),
                reason: format!("importer uri input '{runtime_parameter}' must be a string"),
            })?,
    };

    let metadata = match &importer.metadata {
        None => Map::new(),
        Some(template) => {
            let root = task_root(leaf.pipeline_root, leaf.pipeline_resource, leaf.task_dir);
            let executor_input = ExecutorInput::build(component, inputs, &root);
            let task_uuid = Uuid::new_v4().to_string();
            match leaf
                .resolution_context(&executor_input, &task_uuid)
                .resolve_value(template)?
            {
                Value::Object(map) => map,
                other => {
                    return Err(KilnError::BindingError {
                        task: leaf.task_id.to_string(),
                        reason: format!(
                            "importer metadata must be a mapping, got {}",
                            json_type_name(&other)
                        ),
                    })
                }
            }
        }
    };

    info!(task = %leaf.task_id, %uri, "Imported artifact");
    leaf.event_log.emit(EventKind::ImporterResolved {
        task_id: Arc::clone(leaf.task_id),
        uri: uri.clone(),
    });

    let artifact = Artifact::new(IMPORTER_OUTPUT_KEY, uri)
        .with_metadata(metadata)
        .with_schema_title(importer.type_schema.schema_title.clone());
    let mut outputs = TaskOutputs::new();
    outputs.insert(IMPORTER_OUTPUT_KEY, artifact);
    Ok(outputs)
}

// ═══════════════════════════════════════════════════════════════
// DAG OUTPUTS
// ═══════════════════════════════════════════════════════════════

/// `None` when the producer was skipped
fn select(store: &ValueStore, producer: &str, key: &str) -> Result<Option<RuntimeValue>, KilnError> {
    match store.get_task_output(producer, key) {
        Ok(value) => Ok(Some(value)),
        Err(KilnError::OutputSkipped { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn first_of<'s>(
    store: &ValueStore,
    selectors: impl IntoIterator<Item = (&'s str, &'s str)>,
) -> Result<Option<RuntimeValue>, KilnError> {
    for (producer, key) in selectors {
        if let Some(value) = select(store, producer, key)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn collect(store: &ValueStore, producer: &str, key: &str) -> Result<Option<RuntimeValue>, KilnError> {
    if store.is_skipped(producer) {
        return Ok(None);
    }
    if !store.is_iterated(producer) {
        return select(store, producer, key);
    }
    let values = store.collected(producer, key)?;
    Ok(Some(RuntimeValue::Parameter(Value::Array(
        values.iter().map(RuntimeValue::to_json).collect(),
    ))))
}

/// Read a finished DAG's declared outputs from its store
///
/// An output whose producers were all skipped is omitted.
pub(crate) fn collect_dag_outputs(dag: &DagSpec, store: &ValueStore) -> Result<TaskOutputs, KilnError> {
    let mut outputs = TaskOutputs::new();

    for (name, spec) in &dag.outputs.parameters {
        let value = match spec {
            ParameterOutputSpec::Single {
                value_from_parameter: s,
            } => select(store, &s.producer_subtask, &s.output_parameter_key)?,
            ParameterOutputSpec::Collected { collected: s } => {
                collect(store, &s.producer_subtask, &s.output_parameter_key)?
            }
            ParameterOutputSpec::OneOf { value_from_oneof } => first_of(
                store,
                value_from_oneof
                    .parameter_selectors
                    .iter()
                    .map(|s| (s.producer_subtask.as_str(), s.output_parameter_key.as_str())),
            )?,
        };
        match value {
            Some(value) => outputs.insert(name.clone(), value),
            None => debug!(output = %name, "Output omitted: every producer was skipped"),
        }
    }

    for (name, spec) in &dag.outputs.artifacts {
        let selectors = spec
            .artifact_selectors
            .iter()
            .map(|s| (s.producer_subtask.as_str(), s.output_artifact_key.as_str()));
        match first_of(store, selectors)? {
            Some(value) => outputs.insert(name.clone(), value),
            None => debug!(output = %name, "Output omitted: every producer was skipped"),
        }
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ParameterType;
    use crate::store::{FinalStatus, TaskState};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn component(yaml: &str) -> ComponentSpec {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn task(yaml: &str) -> TaskSpec {
        serde_yaml::from_str(yaml).unwrap()
    }

    const CONSUMER: &str = r#"
inputDefinitions:
  parameters:
    x: { parameterType: NUMBER_INTEGER }
    label: { parameterType: STRING, defaultValue: "none" }
executorLabel: exec-consume
"#;

    fn inputs_of(bound: Bound) -> BTreeMap<String, RuntimeValue> {
        match bound {
            Bound::Inputs(inputs) => inputs,
            Bound::Skip(reason) => panic!("unexpected skip: {reason}"),
        }
    }

    #[test]
    fn binds_constants_parent_inputs_and_upstream_outputs() {
        let store = ValueStore::with_parent_inputs([("n".to_string(), RuntimeValue::from(json!(3)))]);
        store.put_task_output("a", "out", RuntimeValue::from(json!("cat")));
        let t = task(
            r#"
componentRef: { name: comp-consume }
inputs:
  parameters:
    x: { componentInputParameter: n }
    label: { taskOutputParameter: { producerTask: a, outputParameterKey: out } }
"#,
        );
        let inputs =
            inputs_of(bind_task_inputs("b", &t, &component(CONSUMER), &store, &FxHashSet::default()).unwrap());
        assert_eq!(inputs["x"], RuntimeValue::from(json!(3)));
        assert_eq!(inputs["label"], RuntimeValue::from(json!("cat")));
    }

    #[test]
    fn skipped_producer_skips_required_input() {
        let store = ValueStore::new();
        store.mark_skipped("a");
        let t = task(
            r#"
componentRef: { name: comp-consume }
inputs:
  parameters:
    x: { taskOutputParameter: { producerTask: a, outputParameterKey: out } }
"#,
        );
        let bound = bind_task_inputs("b", &t, &component(CONSUMER), &store, &FxHashSet::default()).unwrap();
        assert!(matches!(bound, Bound::Skip(reason) if reason.contains("'a' was skipped")));
    }

    #[test]
    fn skipped_producer_leaves_defaulted_input_absent() {
        let store = ValueStore::new();
        store.mark_skipped("a");
        let t = task(
            r#"
componentRef: { name: comp-consume }
inputs:
  parameters:
    x: { runtimeValue: { constant: 1 } }
    label: { taskOutputParameter: { producerTask: a, outputParameterKey: out } }
"#,
        );
        let inputs =
            inputs_of(bind_task_inputs("b", &t, &component(CONSUMER), &store, &FxHashSet::default()).unwrap());
        assert_eq!(inputs.len(), 1);
        assert!(!inputs.contains_key("label"));
    }

    #[test]
    fn failed_producer_is_unavailable() {
        let store = ValueStore::new();
        let failed: FxHashSet<Arc<str>> = [Arc::from("a")].into_iter().collect();
        let t = task(
            r#"
componentRef: { name: comp-consume }
inputs:
  parameters:
    x: { taskOutputParameter: { producerTask: a, outputParameterKey: out } }
"#,
        );
        let bound = bind_task_inputs("b", &t, &component(CONSUMER), &store, &failed).unwrap();
        assert!(matches!(bound, Bound::Skip(reason) if reason.contains("'a' failed")));
    }

    #[test]
    fn omitted_nested_output_skips_required_input() {
        let store = ValueStore::new();
        store.put_task_outputs("inner", &TaskOutputs::new());
        store.mark_omitted("inner", "out");
        let t = task(
            r#"
componentRef: { name: comp-consume }
inputs:
  parameters:
    x: { taskOutputParameter: { producerTask: inner, outputParameterKey: out } }
"#,
        );
        let bound = bind_task_inputs("b", &t, &component(CONSUMER), &store, &FxHashSet::default()).unwrap();
        assert!(matches!(bound, Bound::Skip(reason) if reason.contains("did not produce 'out'")));
    }

    #[test]
    fn missing_key_from_successful_producer_is_error() {
        let store = ValueStore::new();
        store.put_task_outputs("a", &TaskOutputs::new());
        let t = task(
            r#"
componentRef: { name: comp-consume }
inputs:
  parameters:
    x: { taskOutputParameter: { producerTask: a, outputParameterKey: out } }
"#,
        );
        let err = bind_task_inputs("b", &t, &component(CONSUMER), &store, &FxHashSet::default()).unwrap_err();
        assert_eq!(err.code(), "KILN-044");
    }

    #[test]
    fn final_status_binding_reads_recorded_status() {
        let store = ValueStore::new();
        store.put_final_status(
            "train",
            FinalStatus {
                state: TaskState::Failed,
                task_name: "train".into(),
                job_resource_name: "p-1".into(),
                error: Some("boom".into()),
            },
        );
        let exit = component(
            r#"
inputDefinitions:
  parameters:
    status: { parameterType: TASK_FINAL_STATUS }
executorLabel: exec-exit
"#,
        );
        let t = task(
            r#"
componentRef: { name: comp-exit }
inputs:
  parameters:
    status: { taskFinalStatus: { producerTask: train } }
"#,
        );
        let inputs = inputs_of(bind_task_inputs("exit", &t, &exit, &store, &FxHashSet::default()).unwrap());
        let status = inputs["status"].as_parameter().unwrap();
        assert_eq!(status["state"], "FAILED");
        assert_eq!(status["error"]["message"], "boom");
        assert!(ParameterType::Struct.accepts(status));
    }

    #[test]
    fn iteration_items_from_raw_and_inputs() {
        let raw: ParameterIterator =
            serde_yaml::from_str(r#"{ items: { raw: "[1, 2, 3]" }, itemInput: item }"#).unwrap();
        assert_eq!(
            iteration_items("t", &raw, &BTreeMap::new()).unwrap(),
            vec![json!(1), json!(2), json!(3)]
        );

        let from_input: ParameterIterator =
            serde_yaml::from_str(r#"{ items: { inputParameter: xs }, itemInput: item }"#).unwrap();
        let inputs = BTreeMap::from([("xs".to_string(), RuntimeValue::from(json!(["a", "b"])))]);
        assert_eq!(iteration_items("t", &from_input, &inputs).unwrap().len(), 2);

        let bad = BTreeMap::from([("xs".to_string(), RuntimeValue::from(json!(5)))]);
        assert_eq!(iteration_items("t", &from_input, &bad).unwrap_err().code(), "KILN-045");
        assert_eq!(
            iteration_items("t", &from_input, &BTreeMap::new()).unwrap_err().code(),
            "KILN-040"
        );
    }

    #[test]
    fn aggregate_preserves_instance_order() {
        let comp = component(
            r#"
outputDefinitions:
  parameters:
    Output: { parameterType: NUMBER_INTEGER }
  artifacts:
    data: { artifactType: { schemaTitle: system.Dataset } }
executorLabel: exec-double
"#,
        );
        let instances: Vec<TaskOutputs> = (0..3)
            .map(|i| {
                let mut o = TaskOutputs::new();
                o.insert("Output", json!(i * 2));
                o.insert("data", Artifact::new("data", format!("/d/{i}")));
                o
            })
            .collect();
        let outputs = aggregate_instances(&comp, &instances);
        assert_eq!(outputs.get("Output"), Some(&RuntimeValue::from(json!([0, 2, 4]))));
        assert_eq!(outputs.get("data").unwrap().artifacts()[2].uri, "/d/2");

        let empty = aggregate_instances(&comp, &[]);
        assert_eq!(empty.get("Output"), Some(&RuntimeValue::from(json!([]))));
    }

    #[test]
    fn aggregate_keeps_slot_for_instance_without_output() {
        let comp = component(
            r#"
outputDefinitions:
  parameters:
    out: { parameterType: STRING }
dag: { tasks: {} }
"#,
        );
        let mut first = TaskOutputs::new();
        first.insert("out", json!("item1"));
        let mut third = TaskOutputs::new();
        third.insert("out", json!("item3"));
        let instances = vec![first, TaskOutputs::new(), third];

        let outputs = aggregate_instances(&comp, &instances);
        assert_eq!(
            outputs.get("out"),
            Some(&RuntimeValue::from(json!(["item1", null, "item3"])))
        );
    }

    #[test]
    fn dag_outputs_follow_selectors() {
        let dag: DagSpec = serde_yaml::from_str(
            r#"
tasks: {}
outputs:
  parameters:
    single: { valueFromParameter: { producerSubtask: a, outputParameterKey: out } }
    branch:
      valueFromOneof:
        parameterSelectors:
          - { producerSubtask: skipped, outputParameterKey: out }
          - { producerSubtask: a, outputParameterKey: out }
    gone: { valueFromParameter: { producerSubtask: skipped, outputParameterKey: out } }
    all: { collected: { producerSubtask: loop, outputParameterKey: out } }
"#,
        )
        .unwrap();
        let store = ValueStore::new();
        store.put_task_output("a", "out", RuntimeValue::from(json!(1)));
        store.mark_skipped("skipped");
        store.declare_iteration("loop");
        store.put_instance_output("loop", 0, "out", RuntimeValue::from(json!("x")));
        store.put_instance_output("loop", 1, "out", RuntimeValue::from(json!("y")));
        store.put_instance_outputs("loop", 2, TaskOutputs::new());

        let outputs = collect_dag_outputs(&dag, &store).unwrap();
        assert_eq!(outputs.get("single"), Some(&RuntimeValue::from(json!(1))));
        assert_eq!(outputs.get("branch"), Some(&RuntimeValue::from(json!(1))));
        assert_eq!(outputs.get("all"), Some(&RuntimeValue::from(json!(["x", "y", null]))));
        assert!(outputs.get("gone").is_none());
    }
}
