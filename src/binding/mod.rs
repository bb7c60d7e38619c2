//! Binding Module - from IR bindings to resolved command lines
//!
//! - `args`: caller arguments → declared inputs (`bind_defaults`)
//! - `executor_input`: the per-task record (inputs + output locations)
//! - `placeholder`: command elements → typed AST
//! - `resolve`: AST evaluation over a `ResolutionContext`
//! - `condition`: trigger condition expressions
//!
//! Data flow:
//! ```text
//! bound inputs ──► ExecutorInput::build ──┐
//!                                         ▼
//! command/args ──► parse_command ──► ResolutionContext::resolve_command ──► argv
//! ```

mod args;
mod condition;
mod executor_input;
mod placeholder;
mod resolve;

pub use args::{bind_defaults, bind_root_arguments, parse_cli_argument};
pub use condition::{evaluate_condition, Condition};
pub use executor_input::{
    ArtifactList, ExecutorInput, ExecutorInputs, ExecutorOutputs, OutputParameter, RuntimeArtifact,
};
pub use placeholder::{
    parse_command, parse_element, parse_template, ArtifactField, CommandElement, Placeholder,
    Segment,
};
pub use resolve::{value_to_string, ResolutionContext};
