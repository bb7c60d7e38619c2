//! Pipeline Types - root IR document
//!
//! Contains:
//! - `PipelineSpec`: root with components, executors and the root DAG
//! - `PipelineInfo`: pipeline name/description
//!
//! The document round-trips through YAML and JSON; all maps are BTreeMaps
//! so serialization order is stable.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::KilnError;

use super::component::ComponentSpec;
use super::executor::ExecutorSpec;

/// Supported IR schema major version
pub const SCHEMA_MAJOR: &str = "2.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    #[serde(default)]
    pub executors: BTreeMap<String, ExecutorSpec>,
}

/// Root IR document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSpec {
    pub pipeline_info: PipelineInfo,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_version: Option<String>,
    pub root: ComponentSpec,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentSpec>,
    #[serde(default)]
    pub deployment_spec: DeploymentSpec,
}

fn default_schema_version() -> String {
    "2.1.0".to_string()
}

impl PipelineSpec {
    /// Parse a YAML document (JSON is valid YAML)
    pub fn from_yaml(source: &str) -> Result<Self, KilnError> {
        serde_yaml::from_str(source).map_err(|e| KilnError::ParseError {
            details: e.to_string(),
        })
    }

    pub fn from_json(source: &str) -> Result<Self, KilnError> {
        serde_json::from_str(source).map_err(|e| KilnError::ParseError {
            details: e.to_string(),
        })
    }

    /// Load from a `.yaml`/`.yml`/`.json` file
    pub fn from_path(path: &Path) -> Result<Self, KilnError> {
        if !path.exists() {
            return Err(KilnError::PipelineNotFound {
                path: path.display().to_string(),
            });
        }
        let source = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&source),
            _ => Self::from_yaml(&source),
        }
    }

    pub fn to_yaml(&self) -> Result<String, KilnError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> Result<String, KilnError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn name(&self) -> &str {
        &self.pipeline_info.name
    }

    /// Reject IR produced for another major schema version
    pub fn validate_schema(&self) -> Result<(), KilnError> {
        if !self.schema_version.starts_with(SCHEMA_MAJOR) {
            return Err(KilnError::UnsupportedSchema {
                version: self.schema_version.clone(),
            });
        }
        if !self.root.is_dag() {
            return Err(KilnError::InvalidImplementation {
                component: "root".to_string(),
                reason: "the root component must be a dag".to_string(),
            });
        }
        Ok(())
    }

    pub fn component(&self, task: &str, name: &str) -> Result<&ComponentSpec, KilnError> {
        self.components
            .get(name)
            .ok_or_else(|| KilnError::UnknownComponent {
                task: task.to_string(),
                component: name.to_string(),
            })
    }

    pub fn executor(&self, component: &str, label: &str) -> Result<&ExecutorSpec, KilnError> {
        self.deployment_spec
            .executors
            .get(label)
            .ok_or_else(|| KilnError::UnknownExecutor {
                component: component.to_string(),
                executor: label.to_string(),
            })
    }
}
