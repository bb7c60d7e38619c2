//! DAG Module - dependency graph and static validation
//!
//! - `flow`: FlowGraph built from a DagSpec (topological order, cycles)
//! - `validate`: whole-pipeline checks run before any dispatch
//!
//! FlowGraph is immutable after construction.

mod flow;
mod validate;

pub use flow::{DepVec, FlowGraph};
pub use validate::validate_pipeline;
