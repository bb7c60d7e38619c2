//! DAG Types - tasks, input bindings and DAG outputs
//!
//! Input bindings follow the IR's oneof encoding: a single-key map whose
//! key selects the binding kind.
//!
//! ```yaml
//! tasks:
//!   b:
//!     componentRef: { name: comp-b }
//!     inputs:
//!       parameters:
//!         x: { taskOutputParameter: { producerTask: a, outputParameterKey: x } }
//!         suffix: { runtimeValue: { constant: "!" } }
//!     triggerPolicy:
//!       condition: "inputs.parameter_values['x'] != ''"
//! outputs:
//!   parameters:
//!     y: { valueFromParameter: { producerSubtask: b, outputParameterKey: y } }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;

/// A named collection of tasks plus DAG-level outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DagSpec {
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskSpec>,
    #[serde(default, skip_serializing_if = "DagOutputsSpec::is_empty")]
    pub outputs: DagOutputsSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRef {
    pub name: String,
}

/// Optional display info attached by compilers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub name: String,
}

/// One node of a DAG
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub component_ref: ComponentRef,
    #[serde(default, skip_serializing_if = "TaskInputsSpec::is_empty")]
    pub inputs: TaskInputsSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependent_tasks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_policy: Option<TriggerPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_iterator: Option<ParameterIterator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_info: Option<TaskInfo>,
}

impl TaskSpec {
    /// Every sibling this task must wait for (bindings + dependentTasks)
    ///
    /// Deduplicated, in first-seen order.
    pub fn upstream_tasks(&self) -> SmallVec<[&str; 4]> {
        let params = self
            .inputs
            .parameters
            .values()
            .filter_map(ParameterBinding::producer_task);
        let artifacts = self
            .inputs
            .artifacts
            .values()
            .filter_map(ArtifactBinding::producer_task);
        let explicit = self.dependent_tasks.iter().map(String::as_str);

        let mut deps: SmallVec<[&str; 4]> = SmallVec::new();
        for name in params.chain(artifacts).chain(explicit) {
            if !deps.contains(&name) {
                deps.push(name);
            }
        }
        deps
    }

    /// Trigger strategy (defaults to all upstream succeeded)
    pub fn strategy(&self) -> TriggerStrategy {
        self.trigger_policy
            .as_ref()
            .map(|p| p.strategy)
            .unwrap_or_default()
    }

    pub fn condition(&self) -> Option<&str> {
        self.trigger_policy
            .as_ref()
            .and_then(|p| p.condition.as_deref())
            .filter(|c| !c.trim().is_empty())
    }
}

/// Task input bindings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskInputsSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterBinding>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, ArtifactBinding>,
}

impl TaskInputsSpec {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.artifacts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantValue {
    pub constant: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutputParameterSpec {
    pub producer_task: String,
    pub output_parameter_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutputArtifactSpec {
    pub producer_task: String,
    pub output_artifact_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFinalStatusSpec {
    pub producer_task: String,
}

/// Parameter input binding (exactly one kind)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterBinding {
    Constant {
        #[serde(rename = "runtimeValue")]
        runtime_value: ConstantValue,
    },
    ComponentInput {
        #[serde(rename = "componentInputParameter")]
        component_input_parameter: String,
    },
    TaskOutput {
        #[serde(rename = "taskOutputParameter")]
        task_output_parameter: TaskOutputParameterSpec,
    },
    TaskFinalStatus {
        #[serde(rename = "taskFinalStatus")]
        task_final_status: TaskFinalStatusSpec,
    },
}

impl ParameterBinding {
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant {
            runtime_value: ConstantValue {
                constant: value.into(),
            },
        }
    }

    pub fn task_output(producer: impl Into<String>, key: impl Into<String>) -> Self {
        Self::TaskOutput {
            task_output_parameter: TaskOutputParameterSpec {
                producer_task: producer.into(),
                output_parameter_key: key.into(),
            },
        }
    }

    pub fn component_input(name: impl Into<String>) -> Self {
        Self::ComponentInput {
            component_input_parameter: name.into(),
        }
    }

    /// Sibling task this binding depends on, if any
    pub fn producer_task(&self) -> Option<&str> {
        match self {
            Self::TaskOutput {
                task_output_parameter,
            } => Some(&task_output_parameter.producer_task),
            Self::TaskFinalStatus { task_final_status } => Some(&task_final_status.producer_task),
            Self::Constant { .. } | Self::ComponentInput { .. } => None,
        }
    }
}

/// Artifact input binding (exactly one kind)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtifactBinding {
    ComponentInput {
        #[serde(rename = "componentInputArtifact")]
        component_input_artifact: String,
    },
    TaskOutput {
        #[serde(rename = "taskOutputArtifact")]
        task_output_artifact: TaskOutputArtifactSpec,
    },
}

impl ArtifactBinding {
    pub fn task_output(producer: impl Into<String>, key: impl Into<String>) -> Self {
        Self::TaskOutput {
            task_output_artifact: TaskOutputArtifactSpec {
                producer_task: producer.into(),
                output_artifact_key: key.into(),
            },
        }
    }

    pub fn producer_task(&self) -> Option<&str> {
        match self {
            Self::TaskOutput {
                task_output_artifact,
            } => Some(&task_output_artifact.producer_task),
            Self::ComponentInput { .. } => None,
        }
    }
}

/// When a task may run relative to its upstream tasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerStrategy {
    #[default]
    AllUpstreamTasksSucceeded,
    AllUpstreamTasksCompleted,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub strategy: TriggerStrategy,
}

/// Sequence a task iterates over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IteratorItems {
    Raw {
        raw: Value,
    },
    InputParameter {
        #[serde(rename = "inputParameter")]
        input_parameter: String,
    },
}

/// Replicate a task once per element of a sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterIterator {
    pub items: IteratorItems,
    pub item_input: String,
}

// ═══════════════════════════════════════════════════════════════
// DAG OUTPUTS
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSelector {
    pub producer_subtask: String,
    pub output_parameter_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneOfSelectors {
    pub parameter_selectors: Vec<ParameterSelector>,
}

/// How a DAG-level output parameter is produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterOutputSpec {
    Single {
        #[serde(rename = "valueFromParameter")]
        value_from_parameter: ParameterSelector,
    },
    Collected {
        collected: ParameterSelector,
    },
    OneOf {
        #[serde(rename = "valueFromOneof")]
        value_from_oneof: OneOfSelectors,
    },
}

impl ParameterOutputSpec {
    /// Producer tasks referenced by this output
    pub fn producers(&self) -> Vec<&str> {
        match self {
            Self::Single {
                value_from_parameter: s,
            }
            | Self::Collected { collected: s } => vec![s.producer_subtask.as_str()],
            Self::OneOf { value_from_oneof } => value_from_oneof
                .parameter_selectors
                .iter()
                .map(|s| s.producer_subtask.as_str())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSelector {
    pub producer_subtask: String,
    pub output_artifact_key: String,
}

/// DAG-level output artifact (several selectors = first produced wins)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactOutputSpec {
    pub artifact_selectors: Vec<ArtifactSelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DagOutputsSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterOutputSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, ArtifactOutputSpec>,
}

impl DagOutputsSpec {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.artifacts.is_empty()
    }
}
