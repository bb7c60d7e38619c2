//! EventLog - event sourcing for pipeline runs
//!
//! Provides a full audit trail of one orchestrator run.
//! - Event: envelope with id + timestamp + kind
//! - EventKind: pipeline / DAG / task / fine-grained levels
//! - EventLog: thread-safe, append-only log
//!
//! Task ids are qualified names (`outer.inner[2]`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single event in the run log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since run start (ms)
    pub timestamp_ms: u64,
    /// Event type and data
    pub kind: EventKind,
}

/// All possible event types
///
/// Uses Arc<str> for task_id fields to enable zero-cost cloning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // PIPELINE LEVEL
    // ═══════════════════════════════════════════
    PipelineStarted {
        task_count: usize,
        /// Unique id of this run
        run_id: String,
        /// Hash of the IR document
        pipeline_hash: String,
        kiln_version: String,
    },
    PipelineCompleted {
        outputs: Arc<Value>,
        total_duration_ms: u64,
    },
    PipelineFailed {
        error: String,
        failed_task: Option<Arc<str>>,
    },

    // ═══════════════════════════════════════════
    // DAG LEVEL (root and nested)
    // ═══════════════════════════════════════════
    DagStarted {
        /// Qualified name of the DAG task ("" for the root)
        dag: Arc<str>,
        task_count: usize,
    },
    DagCompleted {
        dag: Arc<str>,
        succeeded: bool,
    },

    // ═══════════════════════════════════════════
    // TASK LEVEL
    // ═══════════════════════════════════════════
    TaskScheduled {
        task_id: Arc<str>,
        dependencies: Vec<Arc<str>>,
    },
    TaskSkipped {
        task_id: Arc<str>,
        reason: String,
    },
    /// Task dispatch begins with its bound inputs
    TaskStarted {
        task_id: Arc<str>,
        inputs: Value,
    },
    TaskCompleted {
        task_id: Arc<str>,
        outputs: Arc<Value>,
        duration_ms: u64,
    },
    TaskFailed {
        task_id: Arc<str>,
        error: String,
        duration_ms: u64,
    },
    /// A parameter iterator fanned out
    IterationStarted {
        task_id: Arc<str>,
        count: usize,
    },

    // ═══════════════════════════════════════════
    // FINE-GRAINED (command / importer)
    // ═══════════════════════════════════════════
    CommandResolved {
        task_id: Arc<str>,
        image: String,
        command: Vec<String>,
    },
    ImporterResolved {
        task_id: Arc<str>,
        uri: String,
    },
}

impl EventKind {
    /// Extract task_id if event is task-related
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskScheduled { task_id, .. }
            | Self::TaskSkipped { task_id, .. }
            | Self::TaskStarted { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFailed { task_id, .. }
            | Self::IterationStarted { task_id, .. }
            | Self::CommandResolved { task_id, .. }
            | Self::ImporterResolved { task_id, .. } => Some(task_id),
            Self::PipelineStarted { .. }
            | Self::PipelineCompleted { .. }
            | Self::PipelineFailed { .. }
            | Self::DagStarted { .. }
            | Self::DagCompleted { .. } => None,
        }
    }

    /// Check if this is a pipeline-level event
    pub fn is_pipeline_event(&self) -> bool {
        matches!(
            self,
            Self::PipelineStarted { .. }
                | Self::PipelineCompleted { .. }
                | Self::PipelineFailed { .. }
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    /// Create a new event log (call at run start)
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        // Id and push under one lock so ids stay in log order
        let mut events = self.events.write();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        events.push(Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        });
        id
    }

    /// Get all events (cloned - use `with_events` for zero-copy access)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Zero-copy access to events via callback
    ///
    /// Holds read lock for duration of callback - keep it short.
    pub fn with_events<T>(&self, f: impl FnOnce(&[Event]) -> T) -> T {
        f(&self.events.read())
    }

    /// Filter events by task ID
    pub fn filter_task(&self, task_id: &str) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.task_id() == Some(task_id))
                .cloned()
                .collect()
        })
    }

    pub fn pipeline_events(&self) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.is_pipeline_event())
                .cloned()
                .collect()
        })
    }

    /// Count events for a specific task (no allocation)
    pub fn count_task(&self, task_id: &str) -> usize {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.task_id() == Some(task_id))
                .count()
        })
    }

    /// Qualified names of tasks that started, in start order
    pub fn started_tasks(&self) -> Vec<Arc<str>> {
        self.with_events(|events| {
            events
                .iter()
                .filter_map(|e| match &e.kind {
                    EventKind::TaskStarted { task_id, .. } => Some(Arc::clone(task_id)),
                    _ => None,
                })
                .collect()
        })
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        self.with_events(|events| serde_json::to_value(events).unwrap_or(Value::Null))
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    // ═══════════════════════════════════════════════════════════════
    // Test helpers
    // ═══════════════════════════════════════════════════════════════

    fn pipeline_started(task_count: usize) -> EventKind {
        EventKind::PipelineStarted {
            task_count,
            run_id: "2024-01-01T00-00-00-beef".to_string(),
            pipeline_hash: "xxh3:0000000000000000".to_string(),
            kiln_version: "0.3.0".to_string(),
        }
    }

    fn task_started(task_id: &str) -> EventKind {
        EventKind::TaskStarted {
            task_id: task_id.into(),
            inputs: json!({}),
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // EventKind
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn eventkind_task_id_extraction() {
        assert_eq!(task_started("outer.inner[1]").task_id(), Some("outer.inner[1]"));
        assert_eq!(pipeline_started(5).task_id(), None);
        assert_eq!(
            EventKind::DagStarted {
                dag: "outer".into(),
                task_count: 2
            }
            .task_id(),
            None
        );
    }

    #[test]
    fn eventkind_is_pipeline_event() {
        assert!(pipeline_started(3).is_pipeline_event());
        assert!(EventKind::PipelineFailed {
            error: "boom".into(),
            failed_task: Some("a".into()),
        }
        .is_pipeline_event());
        assert!(!task_started("t1").is_pipeline_event());
    }

    #[test]
    fn eventkind_serializes_with_type_tag() {
        let kind = EventKind::TaskCompleted {
            task_id: "add".into(),
            outputs: Arc::new(json!({"Output": 3})),
            duration_ms: 150,
        };

        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "task_completed");
        assert_eq!(json["task_id"], "add");
        assert_eq!(json["outputs"]["Output"], 3);

        let skipped = serde_json::to_value(EventKind::TaskSkipped {
            task_id: "b".into(),
            reason: "condition false".into(),
        })
        .unwrap();
        assert_eq!(skipped["type"], "task_skipped");
    }

    #[test]
    fn eventkind_roundtrips() {
        let kind = EventKind::CommandResolved {
            task_id: "echo".into(),
            image: "alpine".into(),
            command: vec!["echo".into(), "world".into()],
        };
        let back: EventKind = serde_json::from_value(serde_json::to_value(&kind).unwrap()).unwrap();
        assert_eq!(back, kind);
    }

    // ═══════════════════════════════════════════════════════════════
    // EventLog
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn eventlog_ids_are_monotonic() {
        let log = EventLog::new();
        let a = log.emit(pipeline_started(1));
        let b = log.emit(task_started("a"));
        assert_eq!((a, b), (0, 1));
        assert_eq!(log.len(), 2);
        let ids: Vec<u64> = log.events().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn eventlog_filters() {
        let log = EventLog::new();
        log.emit(pipeline_started(2));
        log.emit(task_started("a"));
        log.emit(task_started("b"));
        log.emit(EventKind::TaskCompleted {
            task_id: "a".into(),
            outputs: Arc::new(json!({})),
            duration_ms: 1,
        });

        assert_eq!(log.count_task("a"), 2);
        assert_eq!(log.filter_task("b").len(), 1);
        assert_eq!(log.pipeline_events().len(), 1);
        let started = log.started_tasks();
        assert_eq!(started.len(), 2);
        assert_eq!(&*started[0], "a");
    }

    #[test]
    fn eventlog_clones_share_storage() {
        let log = EventLog::new();
        let clone = log.clone();
        clone.emit(task_started("x"));
        assert!(!log.is_empty());
        assert!(log.to_json().is_array());
    }

    #[tokio::test]
    async fn eventlog_concurrent_emits() {
        let log = EventLog::new();
        let mut handles = Vec::new();
        for i in 0..8 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..10 {
                    log.emit(task_started(&format!("t{i}-{j}")));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(log.len(), 80);
        let ids: Vec<u64> = log.events().iter().map(|e| e.id).collect();
        assert_eq!(ids, (0..80).collect::<Vec<_>>());
    }
}
