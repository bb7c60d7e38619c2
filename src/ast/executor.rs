//! Executor Types - how a leaf component runs
//!
//! - `ContainerSpec`: image + command/args templates
//! - `ImporterSpec`: produce an artifact by reference (URI)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::component::ArtifactTypeSchema;

/// A command/args element: plain template string or structured placeholder
///
/// Structured placeholders are `{"Concat": [...]}` and
/// `{"IfPresent": {"InputName": ..., "Then": [...], "Else": [...]}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandArg {
    Text(String),
    Structured(Map<String, Value>),
}

impl From<&str> for CommandArg {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl CommandArg {
    /// Raw JSON form (used by the placeholder parser and error messages)
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Structured(m) => Value::Object(m.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// Container executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<CommandArg>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<CommandArg>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

impl ContainerSpec {
    /// command followed by args
    pub fn full_command(&self) -> impl Iterator<Item = &CommandArg> {
        self.command.iter().chain(self.args.iter())
    }
}

/// Artifact URI of an importer: literal or taken from the `uri` input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtifactUri {
    Constant {
        constant: String,
    },
    RuntimeParameter {
        #[serde(rename = "runtimeParameter")]
        runtime_parameter: String,
    },
}

/// Importer executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImporterSpec {
    pub artifact_uri: ArtifactUri,
    #[serde(default)]
    pub type_schema: ArtifactTypeSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub reimport: bool,
}

/// Exactly one executor kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutorSpec {
    Container { container: ContainerSpec },
    Importer { importer: ImporterSpec },
}

impl ExecutorSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Container { .. } => "container",
            Self::Importer { .. } => "importer",
        }
    }
}
