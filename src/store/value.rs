//! Runtime values - parameters, artifacts and per-task output maps

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::KilnError;

/// Remote URI schemes mounted under local prefixes
const URI_MOUNTS: &[(&str, &str)] = &[("gs://", "/gcs/"), ("s3://", "/s3/"), ("minio://", "/minio/")];

/// Map an artifact URI to the local path a task reads/writes
pub fn uri_to_path(uri: &str) -> String {
    for (scheme, mount) in URI_MOUNTS {
        if let Some(rest) = uri.strip_prefix(scheme) {
            return format!("{}{}", mount, rest);
        }
    }
    uri.to_string()
}

/// An artifact value passed between tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default = "default_schema_title")]
    pub schema_title: String,
}

fn default_schema_title() -> String {
    "system.Artifact".to_string()
}

impl Artifact {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            metadata: Map::new(),
            schema_title: default_schema_title(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_schema_title(mut self, title: impl Into<String>) -> Self {
        self.schema_title = title.into();
        self
    }

    /// Local filesystem path for this artifact
    pub fn path(&self) -> String {
        uri_to_path(&self.uri)
    }

    /// Build from a caller-supplied root argument: `{"uri": ..., "metadata"?: ...}`
    pub fn from_argument(name: &str, value: &Value) -> Result<Self, KilnError> {
        let uri = value
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| KilnError::TypeMismatch {
                name: name.to_string(),
                expected: "artifact {\"uri\": ...}".to_string(),
                actual: crate::ast::json_type_name(value).to_string(),
            })?;
        let metadata = value
            .get("metadata")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Ok(Self::new(name, uri).with_metadata(metadata))
    }
}

/// A resolved parameter or artifact value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuntimeValue {
    Parameter(Value),
    Artifact(Artifact),
    ArtifactList(Vec<Artifact>),
}

impl RuntimeValue {
    pub fn as_parameter(&self) -> Option<&Value> {
        match self {
            Self::Parameter(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_artifact(&self) -> Option<&Artifact> {
        match self {
            Self::Artifact(a) => Some(a),
            _ => None,
        }
    }

    /// Artifacts carried by this value (one for a single artifact)
    pub fn artifacts(&self) -> &[Artifact] {
        match self {
            Self::Artifact(a) => std::slice::from_ref(a),
            Self::ArtifactList(list) => list,
            Self::Parameter(_) => &[],
        }
    }

    pub fn is_artifact(&self) -> bool {
        !matches!(self, Self::Parameter(_))
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl From<Value> for RuntimeValue {
    fn from(v: Value) -> Self {
        Self::Parameter(v)
    }
}

impl From<Artifact> for RuntimeValue {
    fn from(a: Artifact) -> Self {
        Self::Artifact(a)
    }
}

/// Named outputs of one task (or one DAG invocation)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TaskOutputs(BTreeMap<String, RuntimeValue>);

impl TaskOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RuntimeValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&RuntimeValue> {
        self.0.get(name)
    }

    /// The single output of a single-output task
    ///
    /// Errors when the task has zero or several outputs instead of
    /// picking one.
    pub fn output(&self) -> Result<&RuntimeValue, KilnError> {
        match self.0.len() {
            1 => self.0.values().next().ok_or(KilnError::NoOutput),
            0 => Err(KilnError::NoOutput),
            count => Err(KilnError::AmbiguousOutput { count }),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RuntimeValue)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> BTreeMap<String, RuntimeValue> {
        self.0
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl FromIterator<(String, RuntimeValue)> for TaskOutputs {
    fn from_iter<I: IntoIterator<Item = (String, RuntimeValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for TaskOutputs {
    type Item = (String, RuntimeValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, RuntimeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
