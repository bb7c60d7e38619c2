//! Store Module - runtime values and per-DAG storage
//!
//! - `value`: Artifact, RuntimeValue, TaskOutputs
//! - `datastore`: ValueStore, TaskResult, FinalStatus

mod datastore;
mod value;

pub use datastore::{FinalStatus, TaskResult, TaskState, TaskStatus, ValueStore};
pub use value::{uri_to_path, Artifact, RuntimeValue, TaskOutputs};
