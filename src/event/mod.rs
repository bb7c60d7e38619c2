//! Event Module - event sourcing for pipeline runs
//!
//! Provides a full audit trail of one orchestrator run.
//! Key types:
//! - `Event`: envelope with id + timestamp + kind
//! - `EventKind`: pipeline / DAG / task / fine-grained variants
//! - `EventLog`: thread-safe, append-only log
//! - `TraceWriter`: NDJSON file writer for debugging

mod log;
mod trace;

pub use log::{Event, EventKind, EventLog};
pub use trace::{
    calculate_pipeline_hash, generate_run_id, list_traces, list_traces_in, read_trace, TraceInfo,
    TraceWriter, TRACE_DIR,
};
