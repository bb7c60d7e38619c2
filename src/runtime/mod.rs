//! Runtime Module - pipeline execution
//!
//! Contains the runtime execution components:
//! - `orchestrator`: DAG execution with tokio concurrency
//! - `dispatch`: input binding, fan-out/fan-in, leaf executors
//! - `output`: reading task outputs back from the task root
//!
//! This module represents the "how" - runtime execution.
//! For static structure, see the `ast` and `dag` modules.

mod dispatch;
mod orchestrator;
mod output;

pub use orchestrator::Orchestrator;
pub use output::{capture_outputs, decode_parameter};
