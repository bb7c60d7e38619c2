//! Utilities Module - shared infrastructure
//!
//! - `constants`: file names, env vars, timeouts
//! - `naming`: pipeline/task resource names and qualified task names

pub mod constants;
mod naming;

pub use constants::{
    CONNECT_TIMEOUT, DEFAULT_CONTAINER_CLI, DEFAULT_PIPELINE_ROOT, DEFAULT_REMOTE_ENDPOINT,
    EXECUTOR_OUTPUT_FILE, IMPORTER_OUTPUT_KEY, LOCAL_SESSION_ENV, REMOTE_POLL_INTERVAL,
    REMOTE_REQUEST_TIMEOUT, REMOTE_TOKEN_ENV,
};
pub use naming::{
    job_id, pipeline_resource_name, qualified_name, random_id, task_dir, task_resource_name, task_root,
};
