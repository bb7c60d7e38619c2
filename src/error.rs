// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Kiln Error Types with Error Codes
//!
//! Error code ranges:
//! - KILN-000-009: IR document errors
//! - KILN-010-019: Task execution errors
//! - KILN-020-029: DAG structure errors
//! - KILN-030-039: Runner/configuration errors
//! - KILN-040-049: Binding/placeholder errors
//! - KILN-050-059: Argument errors
//! - KILN-060-069: Output capture errors
//! - KILN-070-079: Trigger condition errors
//! - KILN-090-099: IO/serialization errors

use miette::Diagnostic;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KilnError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
///
/// Implements both `thiserror::Error` for std error compatibility
/// and `miette::Diagnostic` for fancy terminal error display.
#[derive(Error, Debug, Diagnostic)]
#[diagnostic(url(docsrs))]
pub enum KilnError {
    // ═══════════════════════════════════════════
    // IR DOCUMENT ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[KILN-001] Failed to parse pipeline IR: {details}")]
    #[diagnostic(
        code(kiln::parse_error),
        help("Check the IR document is valid YAML or JSON")
    )]
    ParseError { details: String },

    #[error("[KILN-002] Unsupported IR schema version: {version}")]
    #[diagnostic(
        code(kiln::unsupported_schema),
        help("Recompile the pipeline with a 2.x IR schema")
    )]
    UnsupportedSchema { version: String },

    #[error("[KILN-003] Pipeline file not found: {path}")]
    #[diagnostic(code(kiln::pipeline_not_found), help("Check the file path exists"))]
    PipelineNotFound { path: String },

    #[error("[KILN-004] Pipeline validation failed: {reason}")]
    #[diagnostic(
        code(kiln::validation_error),
        help("Check the IR structure: components, executors and task bindings")
    )]
    ValidationError { reason: String },

    // ═══════════════════════════════════════════
    // TASK EXECUTION ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[KILN-011] Task '{task}' failed: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error("[KILN-012] Task '{task}' timed out after {timeout_secs}s")]
    TaskTimeout { task: String, timeout_secs: u64 },

    /// Internal execution error (join failures, panics in spawned tasks)
    #[error("[KILN-013] Execution error: {0}")]
    Execution(String),

    // ═══════════════════════════════════════════
    // DAG ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[KILN-020] Cycle detected in DAG: {cycle}")]
    CycleDetected { cycle: String },

    #[error("[KILN-021] Missing dependency: task '{task}' depends on unknown '{dep}'")]
    MissingDependency { task: String, dep: String },

    #[error("[KILN-022] Task '{task}' references unknown component '{component}'")]
    UnknownComponent { task: String, component: String },

    #[error("[KILN-023] Component '{component}' references unknown executor '{executor}'")]
    UnknownExecutor { component: String, executor: String },

    #[error("[KILN-024] Component '{component}' has an invalid implementation: {reason}")]
    InvalidImplementation { component: String, reason: String },

    #[error("[KILN-025] DAG '{dag}' stalled: no task ready but {pending} still pending")]
    DagStalled { dag: String, pending: usize },

    // ═══════════════════════════════════════════
    // RUNNER / CONFIG ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[KILN-030] Runner '{runner}' unavailable: {reason}")]
    RunnerUnavailable { runner: String, reason: String },

    #[error("[KILN-033] Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("[KILN-034] Configuration error: {reason}")]
    ConfigError { reason: String },

    #[error("[KILN-035] Remote job error: {reason}")]
    RemoteJob { reason: String },

    // ═══════════════════════════════════════════
    // BINDING / PLACEHOLDER ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[KILN-040] Binding failed for task '{task}': {reason}")]
    BindingError { task: String, reason: String },

    #[error("[KILN-041] Malformed placeholder in '{element}': {reason}")]
    PlaceholderParse { element: String, reason: String },

    #[error("[KILN-042] Cannot resolve placeholder '{placeholder}': {reason}")]
    UnresolvedPlaceholder { placeholder: String, reason: String },

    #[error("[KILN-043] Output '{key}' of task '{task}' was not produced (task skipped)")]
    OutputSkipped { task: String, key: String },

    #[error("[KILN-044] Output '{key}' of task '{task}' read before it was produced")]
    OutputNotProduced { task: String, key: String },

    #[error("[KILN-045] Type mismatch for '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("[KILN-046] Placeholder '{placeholder}' resolved to null")]
    NullValue { placeholder: String },

    #[error("[KILN-047] DAG input '{name}' is not bound")]
    ParentInputNotFound { name: String },

    // ═══════════════════════════════════════════
    // ARGUMENT ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[KILN-050] Unknown argument '{name}' for '{component}'")]
    UnknownArgument { name: String, component: String },

    #[error("[KILN-051] Missing required input '{name}' for '{component}'")]
    MissingArgument { name: String, component: String },

    #[error("[KILN-052] Invalid argument '{raw}': {reason}")]
    InvalidArgument { raw: String, reason: String },

    // ═══════════════════════════════════════════
    // OUTPUT CAPTURE ERRORS (060-069)
    // ═══════════════════════════════════════════
    #[error("[KILN-060] Output '{output}' was not written to {path}")]
    MissingOutputFile { output: String, path: String },

    #[error("[KILN-061] Cannot decode output '{output}': {reason}")]
    OutputDecode { output: String, reason: String },

    #[error("[KILN-062] Task has {count} outputs; reference the output by its name")]
    AmbiguousOutput { count: usize },

    #[error("[KILN-063] Task has no outputs")]
    NoOutput,

    // ═══════════════════════════════════════════
    // CONDITION ERRORS (070-079)
    // ═══════════════════════════════════════════
    #[error("[KILN-070] Invalid condition '{condition}': {reason}")]
    ConditionParse { condition: String, reason: String },

    #[error("[KILN-071] Cannot evaluate condition '{condition}': {reason}")]
    ConditionEval { condition: String, reason: String },

    // ═══════════════════════════════════════════
    // IO ERRORS (090-099)
    // ═══════════════════════════════════════════
    #[error("[KILN-093] IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("[KILN-094] JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("[KILN-095] YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

impl KilnError {
    /// Get the error code (e.g., "KILN-001")
    pub fn code(&self) -> &'static str {
        match self {
            // IR document errors
            Self::ParseError { .. } => "KILN-001",
            Self::UnsupportedSchema { .. } => "KILN-002",
            Self::PipelineNotFound { .. } => "KILN-003",
            Self::ValidationError { .. } => "KILN-004",
            // Task errors
            Self::TaskFailed { .. } => "KILN-011",
            Self::TaskTimeout { .. } => "KILN-012",
            Self::Execution(_) => "KILN-013",
            // DAG errors
            Self::CycleDetected { .. } => "KILN-020",
            Self::MissingDependency { .. } => "KILN-021",
            Self::UnknownComponent { .. } => "KILN-022",
            Self::UnknownExecutor { .. } => "KILN-023",
            Self::InvalidImplementation { .. } => "KILN-024",
            Self::DagStalled { .. } => "KILN-025",
            // Runner/config errors
            Self::RunnerUnavailable { .. } => "KILN-030",
            Self::InvalidConfig { .. } => "KILN-033",
            Self::ConfigError { .. } => "KILN-034",
            Self::RemoteJob { .. } => "KILN-035",
            // Binding/placeholder errors
            Self::BindingError { .. } => "KILN-040",
            Self::PlaceholderParse { .. } => "KILN-041",
            Self::UnresolvedPlaceholder { .. } => "KILN-042",
            Self::OutputSkipped { .. } => "KILN-043",
            Self::OutputNotProduced { .. } => "KILN-044",
            Self::TypeMismatch { .. } => "KILN-045",
            Self::NullValue { .. } => "KILN-046",
            Self::ParentInputNotFound { .. } => "KILN-047",
            // Argument errors
            Self::UnknownArgument { .. } => "KILN-050",
            Self::MissingArgument { .. } => "KILN-051",
            Self::InvalidArgument { .. } => "KILN-052",
            // Output errors
            Self::MissingOutputFile { .. } => "KILN-060",
            Self::OutputDecode { .. } => "KILN-061",
            Self::AmbiguousOutput { .. } => "KILN-062",
            Self::NoOutput => "KILN-063",
            // Condition errors
            Self::ConditionParse { .. } => "KILN-070",
            Self::ConditionEval { .. } => "KILN-071",
            // IO errors
            Self::IoError(_) => "KILN-093",
            Self::JsonError(_) => "KILN-094",
            Self::YamlParse(_) => "KILN-095",
        }
    }

    /// Check if error is recoverable (a rerun may succeed)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TaskTimeout { .. } | Self::RunnerUnavailable { .. } | Self::RemoteJob { .. }
        )
    }

    /// Configuration errors are detected before any task is dispatched
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::ParseError { .. }
                | Self::UnsupportedSchema { .. }
                | Self::ValidationError { .. }
                | Self::CycleDetected { .. }
                | Self::MissingDependency { .. }
                | Self::UnknownComponent { .. }
                | Self::UnknownExecutor { .. }
                | Self::InvalidImplementation { .. }
                | Self::PlaceholderParse { .. }
                | Self::UnresolvedPlaceholder { .. }
                | Self::UnknownArgument { .. }
                | Self::MissingArgument { .. }
                | Self::TypeMismatch { .. }
                | Self::ConditionParse { .. }
        )
    }
}

impl FixSuggestion for KilnError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            KilnError::ParseError { .. } => Some("Check the IR document is valid YAML or JSON"),
            KilnError::UnsupportedSchema { .. } => {
                Some("Recompile the pipeline with a 2.x IR schema")
            }
            KilnError::PipelineNotFound { .. } => Some("Check the file path exists"),
            KilnError::ValidationError { .. } => {
                Some("Check the IR structure: components, executors and task bindings")
            }
            KilnError::TaskFailed { .. } => Some("Inspect the task logs above for the failure"),
            KilnError::TaskTimeout { .. } => Some("Increase timeout_secs in the runner config"),
            KilnError::Execution(_) => Some("This is an internal error; rerun with RUST_LOG=debug"),
            KilnError::CycleDetected { .. } => {
                Some("Remove circular dependencies between task bindings")
            }
            KilnError::MissingDependency { .. } => {
                Some("Add the missing task or fix the producerTask reference")
            }
            KilnError::UnknownComponent { .. } => {
                Some("Add the component under 'components' or fix componentRef.name")
            }
            KilnError::UnknownExecutor { .. } => {
                Some("Add the executor under deploymentSpec.executors")
            }
            KilnError::InvalidImplementation { .. } => {
                Some("A component needs exactly one of executorLabel or dag")
            }
            KilnError::DagStalled { .. } => {
                Some("This is a scheduling bug; rerun with RUST_LOG=debug")
            }
            KilnError::RunnerUnavailable { .. } => {
                Some("Check the runner backend is installed and running")
            }
            KilnError::InvalidConfig { .. } => Some("Check configuration value is valid"),
            KilnError::ConfigError { .. } => {
                Some("Check ~/.config/kiln/config.toml for syntax errors")
            }
            KilnError::RemoteJob { .. } => {
                Some("Check project, location and KILN_REMOTE_TOKEN are set")
            }
            KilnError::BindingError { .. } => {
                Some("Check the task input bindings and producer outputs")
            }
            KilnError::PlaceholderParse { .. } => {
                Some("Use {{$.inputs.parameters['name']}} style placeholders")
            }
            KilnError::UnresolvedPlaceholder { .. } => {
                Some("Declare the referenced input or output on the component")
            }
            KilnError::OutputSkipped { .. } => {
                Some("The producer was skipped; guard the consumer with the same condition")
            }
            KilnError::OutputNotProduced { .. } => {
                Some("This is a scheduling bug; rerun with RUST_LOG=debug")
            }
            KilnError::TypeMismatch { .. } => Some("Pass a value matching the parameterType"),
            KilnError::NullValue { .. } => Some("Provide a non-null value for the input"),
            KilnError::ParentInputNotFound { .. } => {
                Some("Declare the input in the enclosing DAG's inputDefinitions")
            }
            KilnError::UnknownArgument { .. } => Some("Remove the argument or check its spelling"),
            KilnError::MissingArgument { .. } => {
                Some("Pass the input with --arg name=value or declare a default")
            }
            KilnError::InvalidArgument { .. } => Some("Use the form name=value"),
            KilnError::MissingOutputFile { .. } => {
                Some("The task must write every declared output parameter file")
            }
            KilnError::OutputDecode { .. } => {
                Some("Write output values matching the declared parameterType")
            }
            KilnError::AmbiguousOutput { .. } => Some("Use outputs.get(name) instead of output()"),
            KilnError::NoOutput => Some("The component declares no outputs"),
            KilnError::ConditionParse { .. } => {
                Some("Use inputs.parameter_values['name'] == 'value' style conditions")
            }
            KilnError::ConditionEval { .. } => Some("Check the condition's operand types"),
            KilnError::IoError(_) => Some("Check file path and permissions"),
            KilnError::JsonError(_) => Some("Check JSON syntax"),
            KilnError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ═══════════════════════════════════════════════════════════════════════════
    // IR DOCUMENT ERRORS (000-009)
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_parse_error_code_and_display() {
        let err = KilnError::ParseError {
            details: "unexpected token at line 5".to_string(),
        };
        assert_eq!(err.code(), "KILN-001");
        let msg = err.to_string();
        assert!(msg.contains("[KILN-001]"));
        assert!(msg.contains("unexpected token"));
    }

    #[test]
    fn test_parse_error_fix_suggestion() {
        let err = KilnError::ParseError {
            details: "bad yaml".to_string(),
        };
        let suggestion = <KilnError as FixSuggestion>::fix_suggestion(&err);
        assert!(suggestion.is_some());
        assert!(suggestion.unwrap().contains("YAML"));
    }

    #[test]
    fn test_unsupported_schema_error() {
        let err = KilnError::UnsupportedSchema {
            version: "1.0.0".to_string(),
        };
        assert_eq!(err.code(), "KILN-002");
        assert!(err.to_string().contains("1.0.0"));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TASK / DAG ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_task_failed_names_task() {
        let err = KilnError::TaskFailed {
            task: "outer.train[2]".to_string(),
            reason: "exit code 1".to_string(),
        };
        assert_eq!(err.code(), "KILN-011");
        let msg = err.to_string();
        assert!(msg.contains("[KILN-011]"));
        assert!(msg.contains("outer.train[2]"));
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_cycle_detected_is_configuration_error() {
        let err = KilnError::CycleDetected {
            cycle: "a → b → a".to_string(),
        };
        assert_eq!(err.code(), "KILN-020");
        assert!(err.is_configuration_error());
        assert!(err.fix_suggestion().unwrap().contains("circular"));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BINDING / OUTPUT ERRORS
    // ═══════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_output_skipped_and_not_produced_have_distinct_codes() {
        let skipped = KilnError::OutputSkipped {
            task: "a".to_string(),
            key: "x".to_string(),
        };
        let missing = KilnError::OutputNotProduced {
            task: "a".to_string(),
            key: "x".to_string(),
        };
        assert_eq!(skipped.code(), "KILN-043");
        assert_eq!(missing.code(), "KILN-044");
    }

    #[test]
    fn test_ambiguous_output_error() {
        let err = KilnError::AmbiguousOutput { count: 2 };
        assert_eq!(err.code(), "KILN-062");
        assert!(err.to_string().contains("2 outputs"));
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(KilnError::TaskTimeout {
            task: "t".to_string(),
            timeout_secs: 5
        }
        .is_recoverable());
        assert!(KilnError::RunnerUnavailable {
            runner: "container".to_string(),
            reason: "docker not found".to_string()
        }
        .is_recoverable());
        assert!(!KilnError::NoOutput.is_recoverable());
    }

    #[test]
    fn test_io_error_from_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: KilnError = io.into();
        assert_eq!(err.code(), "KILN-093");
        assert!(err.fix_suggestion().is_some());
    }
}
