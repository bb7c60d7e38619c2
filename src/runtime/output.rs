//! Output Capture - reads a finished task's outputs back from its task root
//!
//! Order of precedence per output:
//! 1. `executor_output.json` (`parameterValues` / `artifacts` overrides)
//! 2. the pre-assigned parameter file, decoded by `parameterType`
//! 3. for artifacts, the pre-assigned uri with empty metadata

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::ast::{ComponentSpec, ParameterType};
use crate::binding::ExecutorInput;
use crate::error::KilnError;
use crate::store::{Artifact, RuntimeValue, TaskOutputs};
use crate::util::EXECUTOR_OUTPUT_FILE;

/// `executor_output.json` as written by a component
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutorOutputFile {
    #[serde(default)]
    parameter_values: BTreeMap<String, Value>,
    #[serde(default)]
    artifacts: BTreeMap<String, ArtifactOverrides>,
}

#[derive(Debug, Default, Deserialize)]
struct ArtifactOverrides {
    #[serde(default)]
    artifacts: Vec<ArtifactOverride>,
}

#[derive(Debug, Default, Deserialize)]
struct ArtifactOverride {
    name: Option<String>,
    uri: Option<String>,
    metadata: Option<Map<String, Value>>,
}

async fn read_executor_output(path: &str) -> Result<Option<ExecutorOutputFile>, KilnError> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| KilnError::OutputDecode {
                output: EXECUTOR_OUTPUT_FILE.to_string(),
                reason: e.to_string(),
            }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Decode the text of an output parameter file
pub fn decode_parameter(name: &str, ty: ParameterType, raw: &str) -> Result<Value, KilnError> {
    let decode_err = |reason: String| KilnError::OutputDecode {
        output: name.to_string(),
        reason,
    };
    let text = raw.trim();
    match ty {
        ParameterType::String => Ok(Value::String(raw.to_string())),
        ParameterType::NumberInteger => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| decode_err(format!("'{text}' is not an integer: {e}"))),
        ParameterType::NumberDouble => {
            let n = text
                .parse::<f64>()
                .map_err(|e| decode_err(format!("'{text}' is not a number: {e}")))?;
            Number::from_f64(n)
                .map(Value::Number)
                .ok_or_else(|| decode_err(format!("'{text}' is not a finite number")))
        }
        ParameterType::Boolean => match text.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(decode_err(format!("'{text}' is not a boolean"))),
        },
        ParameterType::List | ParameterType::Struct | ParameterType::TaskFinalStatus => {
            let value: Value =
                serde_json::from_str(text).map_err(|e| decode_err(e.to_string()))?;
            if ty.accepts(&value) {
                Ok(value)
            } else {
                Err(decode_err(format!("expected {}, got JSON {}", ty.as_str(), text)))
            }
        }
    }
}

/// Read every declared output of a leaf task that succeeded
pub async fn capture_outputs(
    component: &ComponentSpec,
    executor_input: &ExecutorInput,
) -> Result<TaskOutputs, KilnError> {
    let mut overrides = read_executor_output(&executor_input.outputs.output_file)
        .await?
        .unwrap_or_default();
    let mut outputs = TaskOutputs::new();

    for (name, spec) in &component.output_definitions.parameters {
        if let Some(value) = overrides.parameter_values.remove(name) {
            debug!(output = %name, "Parameter from executor output");
            outputs.insert(name.clone(), value);
            continue;
        }
        let Some(location) = executor_input.outputs.parameters.get(name) else {
            continue;
        };
        let raw = match tokio::fs::read_to_string(&location.output_file).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KilnError::MissingOutputFile {
                    output: name.clone(),
                    path: location.output_file.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        outputs.insert(name.clone(), decode_parameter(name, spec.parameter_type, &raw)?);
    }

    for (name, spec) in &component.output_definitions.artifacts {
        let defaults = executor_input
            .outputs
            .artifacts
            .get(name)
            .map(|l| l.artifacts.as_slice())
            .unwrap_or_default();
        let written = overrides
            .artifacts
            .remove(name)
            .map(|o| o.artifacts)
            .unwrap_or_default();
        let count = defaults.len().max(written.len());

        let artifacts: Vec<Artifact> = (0..count)
            .map(|i| {
                let base = defaults.get(i);
                let over = written.get(i);
                let artifact_name = over
                    .and_then(|o| o.name.clone())
                    .or_else(|| base.map(|b| b.name.clone()))
                    .unwrap_or_else(|| name.clone());
                let uri = over
                    .and_then(|o| o.uri.clone())
                    .or_else(|| base.map(|b| b.uri.clone()))
                    .unwrap_or_default();
                let metadata = over
                    .and_then(|o| o.metadata.clone())
                    .or_else(|| base.map(|b| b.metadata.clone()))
                    .unwrap_or_default();
                Artifact::new(artifact_name, uri)
                    .with_metadata(metadata)
                    .with_schema_title(spec.artifact_type.schema_title.clone())
            })
            .collect();

        let value = if spec.is_artifact_list {
            RuntimeValue::ArtifactList(artifacts)
        } else {
            match artifacts.into_iter().next() {
                Some(artifact) => RuntimeValue::Artifact(artifact),
                None => continue,
            }
        };
        outputs.insert(name.clone(), value);
    }

    Ok(outputs)
}
