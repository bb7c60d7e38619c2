//! Kiln - local execution engine for compiled pipeline IR
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  ast/       IR (YAML/JSON) → PipelineSpec, ComponentSpec     │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  runtime/   Orchestrator, dispatch, output capture           │
//! │  dag/       FlowGraph, whole-pipeline validation             │
//! │  binding/   Placeholders, executor input, conditions         │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  store/     Runtime values, per-DAG ValueStore               │
//! │  runner/    Subprocess, container, remote job, mock          │
//! │  event/     Event sourcing (EventLog, NDJSON traces)         │
//! │  util/      Constants, resource naming                       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`ast`] | IR parsing → `PipelineSpec`, `ComponentSpec`, `DagSpec` |
//! | [`runtime`] | DAG execution with tokio concurrency |
//! | [`dag`] | Dependency graph and static checks |
//! | [`binding`] | Placeholder AST, resolution, trigger conditions |
//! | [`store`] | Thread-safe task output storage (DashMap) |
//! | [`runner`] | Where a resolved command actually runs |
//! | [`event`] | Event sourcing for audit trail |
//! | [`config`] | Execution settings (TOML + env) |
//! | [`error`] | Error types with fix suggestions |

// ═══════════════════════════════════════════════════════════════
// DOMAIN MODEL - IR → Rust types
// ═══════════════════════════════════════════════════════════════
pub mod ast;

// ═══════════════════════════════════════════════════════════════
// APPLICATION LAYER - Execution logic
// ═══════════════════════════════════════════════════════════════
pub mod binding;
pub mod dag;
pub mod runtime;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER - Storage, runners, events
// ═══════════════════════════════════════════════════════════════
pub mod event;
pub mod runner;
pub mod store;
pub mod util;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING - Error handling, configuration
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod error;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod test_fixtures;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

// Error types
pub use error::{KilnError, Result};

// Config types
pub use config::{ExecutionConfig, RunnerConfig};

// AST types (Domain Model)
pub use ast::{ComponentSpec, DagSpec, ExecutorSpec, PipelineSpec, TaskSpec};

// Runtime types (Application Layer)
pub use runtime::Orchestrator;

// DAG types
pub use dag::{validate_pipeline, FlowGraph};

// Runner types
pub use runner::{RunRequest, RunStatus, TaskRunner};

// Event types
pub use event::{list_traces, Event, EventKind, EventLog, TraceInfo, TraceWriter};

// Store types
pub use store::{Artifact, RuntimeValue, TaskOutputs, TaskResult, TaskState, ValueStore};
