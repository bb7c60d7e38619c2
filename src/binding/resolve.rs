//! Placeholder Resolution - AST evaluation over an ExecutorInput
//!
//! Resolution is a pure function of the `ResolutionContext`: the same
//! context and elements always yield the same strings.

use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::error::KilnError;
use crate::store::uri_to_path;

use super::executor_input::{ExecutorInput, RuntimeArtifact};
use super::placeholder::{parse_template, ArtifactField, CommandElement, Placeholder, Segment};

/// Everything a placeholder can refer to
#[derive(Debug, Clone, Copy)]
pub struct ResolutionContext<'a> {
    pub executor_input: &'a ExecutorInput,
    pub pipeline_job_name: &'a str,
    pub pipeline_job_uuid: &'a str,
    pub task_name: &'a str,
    pub task_uuid: &'a str,
    pub pipeline_root: &'a str,
}

/// Canonical string form of a JSON value (strict: null is an error)
///
/// Strings are inserted raw, objects and lists as compact JSON.
pub fn value_to_string(value: &Value, placeholder: &Placeholder) -> Result<String, KilnError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Err(KilnError::NullValue {
            placeholder: placeholder.to_string(),
        }),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Ok(other.to_string()),
    }
}

fn artifact_field(artifact: &RuntimeArtifact, field: ArtifactField) -> String {
    match field {
        ArtifactField::Uri => artifact.uri.clone(),
        ArtifactField::Path => uri_to_path(&artifact.uri),
        ArtifactField::Metadata => Value::Object(artifact.metadata.clone()).to_string(),
    }
}

impl ResolutionContext<'_> {
    fn missing(&self, placeholder: &Placeholder, what: &str) -> KilnError {
        KilnError::UnresolvedPlaceholder {
            placeholder: placeholder.to_string(),
            reason: format!("{what} is not bound for task '{}'", self.task_name),
        }
    }

    /// Resolve one placeholder token to its string value
    pub fn resolve_placeholder(&self, placeholder: &Placeholder) -> Result<String, KilnError> {
        let ei = self.executor_input;
        match placeholder {
            Placeholder::ExecutorInput => Ok(ei.to_json_string()),
            Placeholder::InputParameter(name) => {
                let value = ei
                    .parameter(name)
                    .ok_or_else(|| self.missing(placeholder, "input parameter"))?;
                value_to_string(value, placeholder)
            }
            Placeholder::InputArtifact { name, field } => ei
                .input_artifact(name)
                .map(|a| artifact_field(a, *field))
                .ok_or_else(|| self.missing(placeholder, "input artifact")),
            Placeholder::OutputParameterFile(name) => ei
                .outputs
                .parameters
                .get(name)
                .map(|p| p.output_file.clone())
                .ok_or_else(|| self.missing(placeholder, "output parameter")),
            Placeholder::OutputArtifact { name, field } => ei
                .output_artifact(name)
                .map(|a| artifact_field(a, *field))
                .ok_or_else(|| self.missing(placeholder, "output artifact")),
            Placeholder::OutputFile => Ok(ei.outputs.output_file.clone()),
            Placeholder::PipelineJobName => Ok(self.pipeline_job_name.to_string()),
            Placeholder::PipelineJobUuid => Ok(self.pipeline_job_uuid.to_string()),
            Placeholder::PipelineTaskName => Ok(self.task_name.to_string()),
            Placeholder::PipelineTaskUuid => Ok(self.task_uuid.to_string()),
            Placeholder::PipelineRoot => Ok(self.pipeline_root.to_string()),
        }
    }

    /// Resolve template segments into one string
    pub fn resolve_segments(&self, segments: &[Segment]) -> Result<String, KilnError> {
        let mut out = String::new();
        for segment in segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Ref(p) => out.push_str(&self.resolve_placeholder(p)?),
            }
        }
        Ok(out)
    }

    /// Resolve one element to zero or more command words
    ///
    /// Templates and Concat give one word; IfPresent splices its branch.
    pub fn resolve_element(&self, element: &CommandElement) -> Result<Vec<String>, KilnError> {
        match element {
            CommandElement::Template(segments) => Ok(vec![self.resolve_segments(segments)?]),
            CommandElement::Concat(parts) => {
                let mut joined = String::new();
                for part in parts {
                    for word in self.resolve_element(part)? {
                        joined.push_str(&word);
                    }
                }
                Ok(vec![joined])
            }
            CommandElement::IfPresent {
                input_name,
                then,
                otherwise,
            } => {
                let branch = if self.executor_input.has_input(input_name) {
                    then
                } else {
                    otherwise
                };
                self.resolve_command(branch)
            }
        }
    }

    /// Resolve a full command (command + args) to argv
    pub fn resolve_command(&self, elements: &[CommandElement]) -> Result<Vec<String>, KilnError> {
        let mut argv = Vec::with_capacity(elements.len());
        for element in elements {
            argv.extend(self.resolve_element(element)?);
        }
        Ok(argv)
    }

    /// Resolve placeholders in a single string
    ///
    /// Returns `Cow::Borrowed` when the text holds no token.
    pub fn resolve_str<'s>(&self, text: &'s str) -> Result<Cow<'s, str>, KilnError> {
        if !text.contains("{{$") {
            return Ok(Cow::Borrowed(text));
        }
        let segments = parse_template(text)?;
        self.resolve_segments(&segments).map(Cow::Owned)
    }

    /// Resolve placeholders in every key and string leaf of a JSON value
    pub fn resolve_value(&self, value: &Value) -> Result<Value, KilnError> {
        match value {
            Value::String(s) => Ok(Value::String(self.resolve_str(s)?.into_owned())),
            Value::Array(items) => items
                .iter()
                .map(|v| self.resolve_value(v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, v) in map {
                    out.insert(self.resolve_str(key)?.into_owned(), self.resolve_value(v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }
}
