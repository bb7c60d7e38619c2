//! AST Module - typed pipeline IR
//!
//! Contains parsed Rust types from compiled pipeline documents:
//! - `pipeline`: PipelineSpec, PipelineInfo, DeploymentSpec
//! - `component`: ComponentSpec, Definitions, ParameterType
//! - `dag`: DagSpec, TaskSpec, input bindings, DAG outputs
//! - `executor`: ExecutorSpec (container | importer), CommandArg
//!
//! These types represent the "what" - static structure parsed from YAML/JSON.
//! For runtime execution, see the `runtime` module.

mod component;
mod dag;
mod executor;
mod pipeline;

// Re-export all public types
pub use component::{
    json_type_name, ArtifactSpec, ArtifactTypeSchema, ComponentSpec, Definitions, Implementation,
    ParameterSpec, ParameterType,
};
pub use dag::{
    ArtifactBinding, ArtifactOutputSpec, ArtifactSelector, ComponentRef, ConstantValue,
    DagOutputsSpec, DagSpec, IteratorItems, OneOfSelectors, ParameterBinding, ParameterIterator,
    ParameterOutputSpec, ParameterSelector, TaskFinalStatusSpec, TaskInfo, TaskInputsSpec,
    TaskOutputArtifactSpec, TaskOutputParameterSpec, TaskSpec, TriggerPolicy, TriggerStrategy,
};
pub use executor::{ArtifactUri, CommandArg, ContainerSpec, EnvVar, ExecutorSpec, ImporterSpec};
pub use pipeline::{DeploymentSpec, PipelineInfo, PipelineSpec, SCHEMA_MAJOR};
