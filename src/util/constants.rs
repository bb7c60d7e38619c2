//! Centralized constants for kiln runtime configuration
//!
//! File names, env vars, timeouts and polling intervals in one place.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════
// Task Root Layout
// ═══════════════════════════════════════════════════════════════

/// Default root for task outputs when no config overrides it
pub const DEFAULT_PIPELINE_ROOT: &str = "./local_outputs";

/// File a component may write to override its captured outputs
pub const EXECUTOR_OUTPUT_FILE: &str = "executor_output.json";

/// Output key of an importer task
pub const IMPORTER_OUTPUT_KEY: &str = "artifact";

// ═══════════════════════════════════════════════════════════════
// Runner Environment
// ═══════════════════════════════════════════════════════════════

/// Set to `true` for every locally executed task
pub const LOCAL_SESSION_ENV: &str = "LOCAL_SESSION";

/// Bearer token for the remote job API
pub const REMOTE_TOKEN_ENV: &str = "KILN_REMOTE_TOKEN";

/// Default container CLI
pub const DEFAULT_CONTAINER_CLI: &str = "docker";

/// Default remote job API endpoint
pub const DEFAULT_REMOTE_ENDPOINT: &str = "https://run.googleapis.com";

// ═══════════════════════════════════════════════════════════════
// Timeouts
// ═══════════════════════════════════════════════════════════════

/// Poll interval while waiting on a remote job operation
pub const REMOTE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Timeout for a single remote API request
pub const REMOTE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for establishing HTTP connections
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════
