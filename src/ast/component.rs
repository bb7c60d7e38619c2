//! Component Types - inputs, outputs and implementation of a unit of work
//!
//! Contains:
//! - `ComponentSpec`: leaf (executor) or sub-graph (dag) definition
//! - `ParameterType`: the 7 parameter kinds of the IR
//! - `ParameterSpec` / `ArtifactSpec`: declared inputs and outputs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KilnError;

use super::dag::DagSpec;

/// Parameter value kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterType {
    String,
    NumberInteger,
    NumberDouble,
    Boolean,
    List,
    Struct,
    TaskFinalStatus,
}

impl ParameterType {
    /// Check whether a JSON value is acceptable for this type
    ///
    /// Integers are accepted where doubles are expected.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::NumberInteger => value.is_i64() || value.is_u64(),
            Self::NumberDouble => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Struct | Self::TaskFinalStatus => value.is_object(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::NumberInteger => "NUMBER_INTEGER",
            Self::NumberDouble => "NUMBER_DOUBLE",
            Self::Boolean => "BOOLEAN",
            Self::List => "LIST",
            Self::Struct => "STRUCT",
            Self::TaskFinalStatus => "TASK_FINAL_STATUS",
        }
    }
}

/// JSON type name for error messages
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "double",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "struct",
    }
}

/// Artifact type schema (e.g. `system.Model`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactTypeSchema {
    pub schema_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
}

impl Default for ArtifactTypeSchema {
    fn default() -> Self {
        Self {
            schema_title: "system.Artifact".to_string(),
            schema_version: Some("0.0.1".to_string()),
        }
    }
}

/// Declared parameter input/output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSpec {
    pub parameter_type: ParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_optional: bool,
}

/// Declared artifact input/output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactSpec {
    #[serde(default)]
    pub artifact_type: ArtifactTypeSchema,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_artifact_list: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_optional: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Parameter + artifact definitions (inputs or outputs)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definitions {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ParameterSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, ArtifactSpec>,
}

impl Definitions {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.artifacts.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parameters.contains_key(name) || self.artifacts.contains_key(name)
    }

    /// Total number of declared values
    pub fn len(&self) -> usize {
        self.parameters.len() + self.artifacts.len()
    }

    /// An input may be left unbound when it is optional or has a default
    pub fn is_optional(&self, name: &str) -> bool {
        if let Some(p) = self.parameters.get(name) {
            return p.is_optional || p.default_value.is_some();
        }
        self.artifacts.get(name).is_some_and(|a| a.is_optional)
    }
}

/// Immutable definition of a unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    #[serde(default, skip_serializing_if = "Definitions::is_empty")]
    pub input_definitions: Definitions,
    #[serde(default, skip_serializing_if = "Definitions::is_empty")]
    pub output_definitions: Definitions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dag: Option<DagSpec>,
}

/// Resolved view of a component's implementation
#[derive(Debug, Clone, Copy)]
pub enum Implementation<'a> {
    Executor(&'a str),
    Dag(&'a DagSpec),
}

impl ComponentSpec {
    /// Exactly one of `executorLabel` / `dag` must be present
    pub fn implementation(&self, name: &str) -> Result<Implementation<'_>, KilnError> {
        match (&self.executor_label, &self.dag) {
            (Some(label), None) => Ok(Implementation::Executor(label)),
            (None, Some(dag)) => Ok(Implementation::Dag(dag)),
            (Some(_), Some(_)) => Err(KilnError::InvalidImplementation {
                component: name.to_string(),
                reason: "both executorLabel and dag are set".to_string(),
            }),
            (None, None) => Err(KilnError::InvalidImplementation {
                component: name.to_string(),
                reason: "neither executorLabel nor dag is set".to_string(),
            }),
        }
    }

    pub fn is_dag(&self) -> bool {
        self.dag.is_some()
    }
}
