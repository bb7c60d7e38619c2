//! Argument Binding - caller arguments to a component's declared inputs
//!
//! `bind_defaults` is applied to every invocation (root, nested DAG, leaf):
//! caller values win, declared defaults fill gaps, optional inputs may stay
//! absent, unknown names and missing required inputs are errors.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::ast::{json_type_name, ComponentSpec, ParameterType};
use crate::error::KilnError;
use crate::store::{Artifact, RuntimeValue};

/// Fill defaults and reject unknown/missing inputs
pub fn bind_defaults(
    component: &ComponentSpec,
    component_name: &str,
    mut values: BTreeMap<String, RuntimeValue>,
) -> Result<BTreeMap<String, RuntimeValue>, KilnError> {
    let defs = &component.input_definitions;

    if let Some(unknown) = values.keys().find(|k| !defs.contains(k.as_str())) {
        return Err(KilnError::UnknownArgument {
            name: unknown.clone(),
            component: component_name.to_string(),
        });
    }

    for (name, spec) in &defs.parameters {
        if values.contains_key(name) {
            continue;
        }
        match &spec.default_value {
            Some(default) => {
                values.insert(name.clone(), RuntimeValue::Parameter(default.clone()));
            }
            None if spec.is_optional => {}
            None => {
                return Err(KilnError::MissingArgument {
                    name: name.clone(),
                    component: component_name.to_string(),
                })
            }
        }
    }
    for (name, spec) in &defs.artifacts {
        if !values.contains_key(name) && !spec.is_optional {
            return Err(KilnError::MissingArgument {
                name: name.clone(),
                component: component_name.to_string(),
            });
        }
    }
    Ok(values)
}

/// Convert caller-supplied JSON arguments for the root component
///
/// Parameters are type-checked against their `parameterType`; artifacts
/// are given as `{"uri": ..., "metadata"?: ...}`.
pub fn bind_root_arguments(
    component: &ComponentSpec,
    component_name: &str,
    args: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, RuntimeValue>, KilnError> {
    let defs = &component.input_definitions;
    let mut values = BTreeMap::new();

    for (name, value) in args {
        if let Some(spec) = defs.parameters.get(name) {
            check_parameter_type(name, spec.parameter_type, value)?;
            values.insert(name.clone(), RuntimeValue::Parameter(value.clone()));
        } else if let Some(spec) = defs.artifacts.get(name) {
            let artifact = |v: &Value| {
                Artifact::from_argument(name, v)
                    .map(|a| a.with_schema_title(spec.artifact_type.schema_title.clone()))
            };
            let bound = match value {
                Value::Array(items) if spec.is_artifact_list => RuntimeValue::ArtifactList(
                    items.iter().map(artifact).collect::<Result<_, _>>()?,
                ),
                single => RuntimeValue::Artifact(artifact(single)?),
            };
            values.insert(name.clone(), bound);
        } else {
            return Err(KilnError::UnknownArgument {
                name: name.clone(),
                component: component_name.to_string(),
            });
        }
    }

    bind_defaults(component, component_name, values)
}

fn check_parameter_type(name: &str, expected: ParameterType, value: &Value) -> Result<(), KilnError> {
    if expected.accepts(value) {
        return Ok(());
    }
    Err(KilnError::TypeMismatch {
        name: name.to_string(),
        expected: expected.as_str().to_string(),
        actual: json_type_name(value).to_string(),
    })
}

/// Parse `key=value` from the command line (JSON if it parses, else a string)
pub fn parse_cli_argument(raw: &str) -> Result<(String, Value), KilnError> {
    let (key, value) = raw.split_once('=').ok_or_else(|| KilnError::InvalidArgument {
        raw: raw.to_string(),
        reason: "expected key=value".to_string(),
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(KilnError::InvalidArgument {
            raw: raw.to_string(),
            reason: "empty argument name".to_string(),
        });
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn component() -> ComponentSpec {
        serde_json::from_value(json!({
            "inputDefinitions": {
                "parameters": {
                    "name": {"parameterType": "STRING"},
                    "times": {"parameterType": "NUMBER_INTEGER", "defaultValue": 2},
                    "rate": {"parameterType": "NUMBER_DOUBLE", "isOptional": true}
                },
                "artifacts": {
                    "data": {"artifactType": {"schemaTitle": "system.Dataset"}, "isOptional": true}
                }
            },
            "dag": {"tasks": {}}
        }))
        .unwrap()
    }

    fn args(v: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn defaults_fill_gaps_and_callers_win() {
        let bound = bind_root_arguments(&component(), "root", &args(json!({"name": "a"}))).unwrap();
        assert_eq!(bound["times"], RuntimeValue::from(json!(2)));
        assert!(!bound.contains_key("rate"));

        let bound =
            bind_root_arguments(&component(), "root", &args(json!({"name": "a", "times": 9})))
                .unwrap();
        assert_eq!(bound["times"], RuntimeValue::from(json!(9)));
    }

    #[test]
    fn unknown_and_missing_arguments() {
        let err = bind_root_arguments(&component(), "root", &args(json!({"name": "a", "bogus": 1})))
            .unwrap_err();
        assert_eq!(err.code(), "KILN-050");

        let err = bind_root_arguments(&component(), "root", &args(json!({}))).unwrap_err();
        assert_eq!(err.code(), "KILN-051");
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn root_parameters_are_type_checked() {
        let err = bind_root_arguments(&component(), "root", &args(json!({"name": 5}))).unwrap_err();
        assert_eq!(err.code(), "KILN-045");
        // Integers are accepted as doubles
        assert!(bind_root_arguments(&component(), "root", &args(json!({"name": "a", "rate": 1})))
            .is_ok());
    }

    #[test]
    fn artifact_arguments_take_schema_title() {
        let bound = bind_root_arguments(
            &component(),
            "root",
            &args(json!({"name": "a", "data": {"uri": "/tmp/d"}})),
        )
        .unwrap();
        let artifact = bound["data"].as_artifact().unwrap();
        assert_eq!(artifact.uri, "/tmp/d");
        assert_eq!(artifact.schema_title, "system.Dataset");
    }

    #[test]
    fn cli_arguments_parse_json_or_string() {
        assert_eq!(parse_cli_argument("n=5").unwrap(), ("n".to_string(), json!(5)));
        assert_eq!(
            parse_cli_argument("name=world").unwrap(),
            ("name".to_string(), json!("world"))
        );
        assert_eq!(
            parse_cli_argument("xs=[1,2]").unwrap(),
            ("xs".to_string(), json!([1, 2]))
        );
        assert_eq!(parse_cli_argument("novalue").unwrap_err().code(), "KILN-052");
        assert_eq!(parse_cli_argument("=1").unwrap_err().code(), "KILN-052");
    }
}
