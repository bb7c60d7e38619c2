//! DAG Integration Tests
//!
//! Graph structure of parsed pipelines and whole-document validation.

use pretty_assertions::assert_eq;

use kiln::dag::{validate_pipeline, FlowGraph};
use kiln::test_fixtures::*;
use kiln::{KilnError, PipelineSpec};

/// Pipeline whose root tasks all run `comp-noop` with the given dependencies
fn pipeline(tasks: &[(&str, &[&str])]) -> PipelineSpec {
    let tasks: serde_json::Map<String, serde_json::Value> = tasks
        .iter()
        .map(|(name, deps)| {
            (
                name.to_string(),
                serde_json::json!({
                    "componentRef": {"name": "comp-noop"},
                    "dependentTasks": deps,
                }),
            )
        })
        .collect();
    let doc = serde_json::json!({
        "pipelineInfo": {"name": "graph"},
        "schemaVersion": "2.1.0",
        "root": {"dag": {"tasks": tasks}},
        "components": {"comp-noop": {"executorLabel": "exec-noop"}},
        "deploymentSpec": {"executors": {"exec-noop": {"container": {
            "image": "alpine", "command": ["true"]
        }}}}
    });
    PipelineSpec::from_json(&doc.to_string()).unwrap()
}

fn root_graph(spec: &PipelineSpec) -> FlowGraph {
    FlowGraph::from_dag(spec.root.dag.as_ref().unwrap()).unwrap()
}

/// Parse a fixture, edit its YAML tree, re-parse
fn edited(source: &str, edit: impl FnOnce(&mut serde_yaml::Value)) -> PipelineSpec {
    let mut doc: serde_yaml::Value = serde_yaml::from_str(source).unwrap();
    edit(&mut doc);
    PipelineSpec::from_yaml(&serde_yaml::to_string(&doc).unwrap()).unwrap()
}

// ═══════════════════════════════════════════════════════════════
// GRAPH STRUCTURE
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_dag_diamond_order() {
    // a → b, a → c, b → d, c → d
    let spec = pipeline(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])]);
    let graph = root_graph(&spec);

    let order = graph.topological_order().unwrap();
    let names: Vec<&str> = order.iter().map(|t| &**t).collect();
    assert_eq!(names, vec!["a", "b", "c", "d"]);
    assert_eq!(graph.get_dependencies("d").len(), 2);
    assert_eq!(graph.get_successors("a").len(), 2);
    assert!(validate_pipeline(&spec).is_ok());
}

#[test]
fn test_dag_disconnected_chains() {
    let spec = pipeline(&[("a", &[]), ("b", &["a"]), ("c", &[]), ("d", &["c"])]);
    let graph = root_graph(&spec);

    assert!(graph.detect_cycles().is_ok());
    assert!(graph.get_dependencies("c").is_empty());
    assert_eq!(graph.get_successors("c").len(), 1);
}

#[test]
fn test_dag_cycle_is_rejected() {
    let spec = pipeline(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"])]);

    let err = validate_pipeline(&spec).unwrap_err();
    assert_eq!(err.code(), "KILN-020");
}

#[test]
fn test_data_edges_count_as_dependencies() {
    let spec = PipelineSpec::from_yaml(ADD_EXCLAIM_IR).unwrap();
    let graph = root_graph(&spec);

    assert_eq!(graph.get_dependencies("exclaim").len(), 1);
    assert_eq!(&*graph.get_successors("add-one")[0], "exclaim");
}

// ═══════════════════════════════════════════════════════════════
// VALIDATION
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_all_fixtures_are_valid() {
    for (name, source) in ALL_FIXTURES {
        let spec = PipelineSpec::from_yaml(source).unwrap();
        spec.validate_schema().unwrap();
        assert!(validate_pipeline(&spec).is_ok(), "{name} should validate");
    }
}

#[test]
fn test_unsupported_schema_version() {
    let spec = edited(ECHO_IR, |doc| {
        doc["schemaVersion"] = "1.0.0".into();
    });

    let err = spec.validate_schema().unwrap_err();
    assert!(matches!(err, KilnError::UnsupportedSchema { .. }));
}

#[test]
fn test_missing_executor_is_reported() {
    let spec = edited(ECHO_IR, |doc| {
        doc["components"]["comp-echo"]["executorLabel"] = "exec-missing".into();
    });

    let err = validate_pipeline(&spec).unwrap_err();
    assert_eq!(err.code(), "KILN-023");
}

#[test]
fn test_unknown_component_is_reported() {
    let spec = edited(ECHO_IR, |doc| {
        doc["root"]["dag"]["tasks"]["echo"]["componentRef"]["name"] = "comp-nope".into();
    });

    let err = validate_pipeline(&spec).unwrap_err();
    assert!(matches!(err, KilnError::UnknownComponent { ref component, .. } if component == "comp-nope"));
}

#[test]
fn test_undeclared_output_key_in_nested_dag() {
    let spec = edited(NESTED_IR, |doc| {
        doc["components"]["comp-inner"]["dag"]["tasks"]["exclaim"]["inputs"]["parameters"]["text"]
            ["taskOutputParameter"]["outputParameterKey"] = "Missing".into();
    });

    assert!(validate_pipeline(&spec).is_err());
}

#[test]
fn test_iterator_item_input_must_be_declared() {
    let spec = edited(FAN_IN_IR, |doc| {
        doc["root"]["dag"]["tasks"]["double"]["parameterIterator"]["itemInput"] = "y".into();
    });

    assert!(validate_pipeline(&spec).is_err());
}

#[test]
fn test_condition_must_reference_task_inputs() {
    let spec = edited(CONDITION_IR, |doc| {
        doc["root"]["dag"]["tasks"]["on-heads"]["triggerPolicy"]["condition"] =
            "inputs.parameter_values['unknown'] == 'heads'".into();
    });

    assert!(validate_pipeline(&spec).is_err());
}

#[test]
fn test_importer_runtime_parameter_must_be_declared() {
    let spec = edited(IMPORTER_IR, |doc| {
        doc["deploymentSpec"]["executors"]["exec-importer"]["importer"]["artifactUri"]
            ["runtimeParameter"] = "nope".into();
    });

    assert!(validate_pipeline(&spec).is_err());
}
