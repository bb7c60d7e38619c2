//! Mock Runner - scripted through a closure, records every request
//!
//! The closure may write files under the task root (e.g., output parameter
//! files) before returning a status, which is how tests simulate components.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{RunRequest, RunStatus, TaskRunner};

type Script = dyn Fn(&RunRequest) -> RunStatus + Send + Sync;

#[derive(Clone)]
pub struct MockRunner {
    script: Arc<Script>,
    requests: Arc<Mutex<Vec<RunRequest>>>,
}

impl MockRunner {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&RunRequest) -> RunStatus + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every run succeeds without side effects
    pub fn succeeding() -> Self {
        Self::new(|_| RunStatus::Success)
    }

    /// Requests seen so far, in dispatch order
    pub fn requests(&self) -> Vec<RunRequest> {
        self.requests.lock().clone()
    }

    /// Qualified task names seen so far
    pub fn task_names(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.task_name.clone())
            .collect()
    }
}

impl std::fmt::Debug for MockRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRunner")
            .field("requests", &self.requests.lock().len())
            .finish()
    }
}

#[async_trait]
impl TaskRunner for MockRunner {
    async fn run(&self, request: &RunRequest) -> RunStatus {
        self.requests.lock().push(request.clone());
        (self.script)(request)
    }

    fn name(&self) -> &str {
        "mock"
    }
}
