//! Static Validation - whole-pipeline checks before any dispatch
//!
//! Validates, for the root and every reachable component:
//! - task names are usable as task-root path segments
//! - components and executors exist, exactly one implementation each
//! - bindings reference siblings and declared parent inputs/outputs
//! - no dependency cycles (FlowGraph three-color DFS)
//! - every container element parses and references declared names
//! - trigger conditions parse and read bound parameters
//! - iterator inputs are bound and declared
//! - DAG outputs reference existing tasks and declared outputs
//!
//! Error codes:
//! - KILN-004: generic validation failure
//! - KILN-020/021: cycle / missing dependency
//! - KILN-022/023/024: unknown component / executor / bad implementation
//! - KILN-040: binding references something undeclared
//! - KILN-041/042: malformed / undeclared placeholder
//! - KILN-070: malformed condition

use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashSet;

use crate::ast::{
    ArtifactBinding, ArtifactUri, ComponentSpec, DagSpec, ExecutorSpec, Implementation,
    IteratorItems, ParameterBinding, ParameterOutputSpec, PipelineSpec, TaskSpec,
};
use crate::binding::{parse_command, parse_template, CommandElement, Condition};
use crate::error::KilnError;

use super::flow::FlowGraph;

/// Task names become directory names under the run
static TASK_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("task name regex is valid"));

/// Validate a whole pipeline document
pub fn validate_pipeline(spec: &PipelineSpec) -> Result<(), KilnError> {
    spec.validate_schema()?;
    let mut validator = Validator {
        spec,
        done: FxHashSet::default(),
        active: Vec::new(),
    };
    validator.component("root", &spec.root)
}

struct Validator<'a> {
    spec: &'a PipelineSpec,
    /// Components already validated
    done: FxHashSet<&'a str>,
    /// Components on the current nesting path (recursion guard)
    active: Vec<&'a str>,
}

fn binding_error(task: &str, reason: String) -> KilnError {
    KilnError::BindingError {
        task: task.to_string(),
        reason,
    }
}

impl<'a> Validator<'a> {
    fn component(&mut self, name: &'a str, component: &'a ComponentSpec) -> Result<(), KilnError> {
        if self.done.contains(name) {
            return Ok(());
        }
        if self.active.contains(&name) {
            return Err(KilnError::InvalidImplementation {
                component: name.to_string(),
                reason: format!("component nests itself ({} → {name})", self.active.join(" → ")),
            });
        }
        self.active.push(name);
        match component.implementation(name)? {
            Implementation::Executor(label) => self.executor(name, component, label)?,
            Implementation::Dag(dag) => self.dag(name, component, dag)?,
        }
        self.active.pop();
        self.done.insert(name);
        Ok(())
    }

    fn executor(
        &self,
        name: &str,
        component: &ComponentSpec,
        label: &str,
    ) -> Result<(), KilnError> {
        match self.spec.executor(name, label)? {
            ExecutorSpec::Container { container } => {
                let elements: Vec<CommandElement> = parse_command(container.full_command())?;
                for element in &elements {
                    element.check_declared(component)?;
                }
            }
            ExecutorSpec::Importer { importer } => {
                if let ArtifactUri::RuntimeParameter { runtime_parameter } = &importer.artifact_uri {
                    if !component.input_definitions.parameters.contains_key(runtime_parameter) {
                        return Err(KilnError::InvalidImplementation {
                            component: name.to_string(),
                            reason: format!(
                                "importer uri reads undeclared input '{runtime_parameter}'"
                            ),
                        });
                    }
                }
                if let Some(metadata) = &importer.metadata {
                    check_metadata(metadata, component)?;
                }
            }
        }
        Ok(())
    }

    fn dag(
        &mut self,
        name: &str,
        component: &'a ComponentSpec,
        dag: &'a DagSpec,
    ) -> Result<(), KilnError> {
        let graph = FlowGraph::from_dag(dag)?;
        graph.detect_cycles()?;

        for (task_name, task) in &dag.tasks {
            if !TASK_NAME_RE.is_match(task_name) {
                return Err(KilnError::ValidationError {
                    reason: format!(
                        "task name '{task_name}' in '{name}' may only contain letters, digits, '-' and '_'"
                    ),
                });
            }
            let child_name = task.component_ref.name.as_str();
            let child = self.spec.component(task_name, child_name)?;
            self.task(task_name, task, component, child, dag)?;
            self.component(child_name, child)?;
        }
        self.dag_outputs(name, component, dag)
    }

    fn task(
        &self,
        task_name: &str,
        task: &TaskSpec,
        parent: &ComponentSpec,
        child: &ComponentSpec,
        dag: &DagSpec,
    ) -> Result<(), KilnError> {
        let child_inputs = &child.input_definitions;

        for (input, binding) in &task.inputs.parameters {
            if !child_inputs.parameters.contains_key(input) {
                return Err(binding_error(
                    task_name,
                    format!("binds undeclared parameter input '{input}'"),
                ));
            }
            match binding {
                ParameterBinding::ComponentInput {
                    component_input_parameter: p,
                } if !parent.input_definitions.parameters.contains_key(p) => {
                    return Err(binding_error(
                        task_name,
                        format!("reads undeclared DAG input parameter '{p}'"),
                    ));
                }
                ParameterBinding::TaskOutput {
                    task_output_parameter: out,
                } => {
                    let producer = self.sibling_component(task_name, &out.producer_task, dag)?;
                    if !producer
                        .output_definitions
                        .parameters
                        .contains_key(&out.output_parameter_key)
                    {
                        return Err(binding_error(
                            task_name,
                            format!(
                                "'{}' declares no output parameter '{}'",
                                out.producer_task, out.output_parameter_key
                            ),
                        ));
                    }
                }
                _ => {}
            }
        }

        for (input, binding) in &task.inputs.artifacts {
            if !child_inputs.artifacts.contains_key(input) {
                return Err(binding_error(
                    task_name,
                    format!("binds undeclared artifact input '{input}'"),
                ));
            }
            match binding {
                ArtifactBinding::ComponentInput {
                    component_input_artifact: a,
                } if !parent.input_definitions.artifacts.contains_key(a) => {
                    return Err(binding_error(
                        task_name,
                        format!("reads undeclared DAG input artifact '{a}'"),
                    ));
                }
                ArtifactBinding::TaskOutput {
                    task_output_artifact: out,
                } => {
                    let producer = self.sibling_component(task_name, &out.producer_task, dag)?;
                    if !producer
                        .output_definitions
                        .artifacts
                        .contains_key(&out.output_artifact_key)
                    {
                        return Err(binding_error(
                            task_name,
                            format!(
                                "'{}' declares no output artifact '{}'",
                                out.producer_task, out.output_artifact_key
                            ),
                        ));
                    }
                }
                _ => {}
            }
        }

        let item_input = task.parameter_iterator.as_ref().map(|it| it.item_input.as_str());
        if let Some(iterator) = &task.parameter_iterator {
            if !child_inputs.contains(&iterator.item_input) {
                return Err(binding_error(
                    task_name,
                    format!("iterator item input '{}' is not declared", iterator.item_input),
                ));
            }
            if let IteratorItems::InputParameter { input_parameter } = &iterator.items {
                if !task.inputs.parameters.contains_key(input_parameter)
                    && !parent.input_definitions.parameters.contains_key(input_parameter)
                {
                    return Err(binding_error(
                        task_name,
                        format!("iterator items read unbound parameter '{input_parameter}'"),
                    ));
                }
            }
        }

        // Required inputs must be bound (the iterator binds its item input)
        for (input, spec) in &child_inputs.parameters {
            let bound = task.inputs.parameters.contains_key(input) || item_input == Some(input.as_str());
            if !bound && !spec.is_optional && spec.default_value.is_none() {
                return Err(KilnError::MissingArgument {
                    name: input.clone(),
                    component: task.component_ref.name.clone(),
                });
            }
        }
        for (input, spec) in &child_inputs.artifacts {
            let bound = task.inputs.artifacts.contains_key(input) || item_input == Some(input.as_str());
            if !bound && !spec.is_optional {
                return Err(KilnError::MissingArgument {
                    name: input.clone(),
                    component: task.component_ref.name.clone(),
                });
            }
        }

        if let Some(source) = task.condition() {
            let condition = Condition::parse(source)?;
            for key in condition.referenced_keys() {
                if !task.inputs.parameters.contains_key(key)
                    && !child_inputs.parameters.contains_key(key)
                {
                    return Err(KilnError::ConditionParse {
                        condition: source.to_string(),
                        reason: format!("'{key}' is not an input of task '{task_name}'"),
                    });
                }
            }
        }
        Ok(())
    }

    fn sibling_component(
        &self,
        task_name: &str,
        producer: &str,
        dag: &DagSpec,
    ) -> Result<&'a ComponentSpec, KilnError> {
        let sibling = dag
            .tasks
            .get(producer)
            .ok_or_else(|| KilnError::MissingDependency {
                task: task_name.to_string(),
                dep: producer.to_string(),
            })?;
        self.spec.component(producer, &sibling.component_ref.name)
    }

    fn dag_outputs(
        &self,
        name: &str,
        component: &ComponentSpec,
        dag: &DagSpec,
    ) -> Result<(), KilnError> {
        let declared = &component.output_definitions;
        let context = format!("dag outputs of '{name}'");

        for (output, spec) in &dag.outputs.parameters {
            if !declared.parameters.contains_key(output) {
                return Err(binding_error(&context, format!("'{output}' is not a declared output")));
            }
            let selectors: Vec<(&str, &str)> = match spec {
                ParameterOutputSpec::Single {
                    value_from_parameter: s,
                }
                | ParameterOutputSpec::Collected { collected: s } => {
                    vec![(s.producer_subtask.as_str(), s.output_parameter_key.as_str())]
                }
                ParameterOutputSpec::OneOf { value_from_oneof } => value_from_oneof
                    .parameter_selectors
                    .iter()
                    .map(|s| (s.producer_subtask.as_str(), s.output_parameter_key.as_str()))
                    .collect(),
            };
            for (producer, key) in selectors {
                let child = self.sibling_component(&context, producer, dag)?;
                if !child.output_definitions.parameters.contains_key(key) {
                    return Err(binding_error(
                        &context,
                        format!("'{producer}' declares no output parameter '{key}'"),
                    ));
                }
            }
        }

        for (output, spec) in &dag.outputs.artifacts {
            if !declared.artifacts.contains_key(output) {
                return Err(binding_error(&context, format!("'{output}' is not a declared output")));
            }
            for selector in &spec.artifact_selectors {
                let child = self.sibling_component(&context, &selector.producer_subtask, dag)?;
                if !child
                    .output_definitions
                    .artifacts
                    .contains_key(&selector.output_artifact_key)
                {
                    return Err(binding_error(
                        &context,
                        format!(
                            "'{}' declares no output artifact '{}'",
                            selector.producer_subtask, selector.output_artifact_key
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Every key and string leaf of importer metadata must be a valid template
fn check_metadata(value: &serde_json::Value, component: &ComponentSpec) -> Result<(), KilnError> {
    use serde_json::Value;
    let check_str = |s: &str| -> Result<(), KilnError> {
        CommandElement::Template(parse_template(s)?).check_declared(component)
    };
    match value {
        Value::String(s) => check_str(s),
        Value::Array(items) => items.iter().try_for_each(|v| check_metadata(v, component)),
        Value::Object(map) => map.iter().try_for_each(|(k, v)| {
            check_str(k)?;
            check_metadata(v, component)
        }),
        _ => Ok(()),
    }
}
