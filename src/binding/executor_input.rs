//! ExecutorInput - the per-task record placeholders are resolved against
//!
//! Built from a component's definitions, the task's bound inputs and the
//! task root directory. Every output gets a pre-assigned location under
//! the task root:
//!
//! ```text
//! {task_root}/{output_name}           parameter file / artifact uri
//! {task_root}/executor_output.json    optional executor output
//! ```

use std::collections::BTreeMap;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ast::{ArtifactTypeSchema, ComponentSpec};
use crate::store::{Artifact, RuntimeValue};
use crate::util::EXECUTOR_OUTPUT_FILE;

/// An artifact as written into the ExecutorInput
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeArtifact {
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactTypeSchema,
}

impl From<&Artifact> for RuntimeArtifact {
    fn from(a: &Artifact) -> Self {
        Self {
            name: a.name.clone(),
            uri: a.uri.clone(),
            metadata: a.metadata.clone(),
            artifact_type: ArtifactTypeSchema {
                schema_title: a.schema_title.clone(),
                schema_version: None,
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactList {
    pub artifacts: Vec<RuntimeArtifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputParameter {
    pub output_file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorInputs {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameter_values: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, ArtifactList>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorOutputs {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, OutputParameter>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, ArtifactList>,
    pub output_file: String,
}

/// Fully bound inputs plus pre-assigned output locations of one task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorInput {
    pub inputs: ExecutorInputs,
    pub outputs: ExecutorOutputs,
}

impl ExecutorInput {
    /// Build the record for one task execution
    ///
    /// `inputs` holds the task's bound values; declared parameter defaults
    /// fill any gaps.
    pub fn build(
        component: &ComponentSpec,
        inputs: &BTreeMap<String, RuntimeValue>,
        task_root: &Utf8Path,
    ) -> Self {
        let mut parameter_values = BTreeMap::new();
        let mut artifacts = BTreeMap::new();

        for (name, spec) in &component.input_definitions.parameters {
            match inputs.get(name).and_then(RuntimeValue::as_parameter) {
                Some(v) => {
                    parameter_values.insert(name.clone(), v.clone());
                }
                None => {
                    if let Some(default) = &spec.default_value {
                        parameter_values.insert(name.clone(), default.clone());
                    }
                }
            }
        }
        for name in component.input_definitions.artifacts.keys() {
            if let Some(value) = inputs.get(name).filter(|v| v.is_artifact()) {
                let list = ArtifactList {
                    artifacts: value.artifacts().iter().map(RuntimeArtifact::from).collect(),
                };
                artifacts.insert(name.clone(), list);
            }
        }

        let outputs = &component.output_definitions;
        let parameters = outputs
            .parameters
            .keys()
            .map(|name| {
                let output_file = task_root.join(name).to_string();
                (name.clone(), OutputParameter { output_file })
            })
            .collect();
        let output_artifacts = outputs
            .artifacts
            .iter()
            .map(|(name, spec)| {
                let artifact = RuntimeArtifact {
                    name: name.clone(),
                    uri: task_root.join(name).to_string(),
                    metadata: Map::new(),
                    artifact_type: spec.artifact_type.clone(),
                };
                (
                    name.clone(),
                    ArtifactList {
                        artifacts: vec![artifact],
                    },
                )
            })
            .collect();

        Self {
            inputs: ExecutorInputs {
                parameter_values,
                artifacts,
            },
            outputs: ExecutorOutputs {
                parameters,
                artifacts: output_artifacts,
                output_file: task_root.join(EXECUTOR_OUTPUT_FILE).to_string(),
            },
        }
    }

    /// Whether an input is bound (a null value still counts)
    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.parameter_values.contains_key(name) || self.inputs.artifacts.contains_key(name)
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.inputs.parameter_values.get(name)
    }

    /// First artifact bound to an input
    pub fn input_artifact(&self, name: &str) -> Option<&RuntimeArtifact> {
        self.inputs
            .artifacts
            .get(name)
            .and_then(|l| l.artifacts.first())
    }

    pub fn output_artifact(&self, name: &str) -> Option<&RuntimeArtifact> {
        self.outputs
            .artifacts
            .get(name)
            .and_then(|l| l.artifacts.first())
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
