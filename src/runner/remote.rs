//! Remote Job Runner - executes the command as a managed job
//!
//! Lifecycle: create job → wait for creation → run job → poll the run
//! operation until `done`. The run succeeds iff the execution's
//! `Completed` condition is `CONDITION_SUCCEEDED`.
//!
//! [`HttpJobClient`] talks to a Cloud Run v2-style REST API:
//! - `POST {endpoint}/v2/projects/{p}/locations/{l}/jobs?jobId={id}`
//! - `POST {endpoint}/v2/{job}:run`
//! - `GET  {endpoint}/v2/{operation}`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use super::{RunRequest, RunStatus, TaskRunner};
use crate::error::{KilnError, Result};
use crate::util::{
    job_id, CONNECT_TIMEOUT, REMOTE_POLL_INTERVAL, REMOTE_REQUEST_TIMEOUT, REMOTE_TOKEN_ENV,
};

const COMPLETED: &str = "Completed";
const CONDITION_SUCCEEDED: &str = "CONDITION_SUCCEEDED";

// ═══════════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════════

/// Long-running operation as returned by the job API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOperation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    /// Job (for create) or Execution (for run) once done
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JobOperation {
    /// Conditions of the finished resource, if any
    pub fn conditions(&self) -> Vec<JobCondition> {
        self.response
            .as_ref()
            .and_then(|r| r.get("conditions"))
            .and_then(|c| serde_json::from_value(c.clone()).ok())
            .unwrap_or_default()
    }

    /// `response.name` (the created job's resource name)
    pub fn resource_name(&self) -> Option<&str> {
        self.response.as_ref()?.get("name")?.as_str()
    }
}

// ═══════════════════════════════════════════════════════════════
// JobClient
// ═══════════════════════════════════════════════════════════════

/// Job service API, one call per lifecycle step
#[async_trait]
pub trait JobClient: Send + Sync {
    async fn create_job(&self, job_id: &str, request: &RunRequest) -> Result<JobOperation>;

    async fn run_job(&self, job_name: &str) -> Result<JobOperation>;

    async fn get_operation(&self, operation_name: &str) -> Result<JobOperation>;
}

/// REST client with bearer-token auth
#[derive(Debug, Clone)]
pub struct HttpJobClient {
    http: reqwest::Client,
    endpoint: String,
    parent: String,
    token: Option<String>,
}

impl HttpJobClient {
    pub fn new(
        endpoint: &str,
        project: &str,
        location: &str,
        token: Option<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REMOTE_REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("kiln/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| KilnError::RunnerUnavailable {
                runner: "remote_job".to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            parent: format!("projects/{project}/locations/{location}"),
            token,
        })
    }

    /// Token from `KILN_REMOTE_TOKEN`
    pub fn from_env(endpoint: &str, project: &str, location: &str) -> Result<Self> {
        let token = std::env::var(REMOTE_TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| KilnError::RunnerUnavailable {
                runner: "remote_job".to_string(),
                reason: format!("{REMOTE_TOKEN_ENV} is not set"),
            })?;
        Self::new(endpoint, project, location, Some(token))
    }

    /// `projects/{p}/locations/{l}`
    pub fn parent(&self) -> &str {
        &self.parent
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/v2/{}", self.endpoint, resource)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<JobOperation> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(|e| KilnError::RemoteJob {
            reason: format!("request failed: {e}"),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(KilnError::RemoteJob {
                reason: format!("HTTP {}: {}", status.as_u16(), body.trim()),
            });
        }
        response
            .json::<JobOperation>()
            .await
            .map_err(|e| KilnError::RemoteJob {
                reason: format!("invalid operation response: {e}"),
            })
    }
}

#[async_trait]
impl JobClient for HttpJobClient {
    async fn create_job(&self, job_id: &str, request: &RunRequest) -> Result<JobOperation> {
        let env: Vec<Value> = request
            .env
            .iter()
            .map(|(name, value)| json!({"name": name, "value": value}))
            .collect();
        let body = json!({
            "template": {
                "template": {
                    "containers": [{
                        "image": request.image,
                        "command": request.command,
                        "env": env,
                    }]
                }
            }
        });
        let url = self.url(&format!("{}/jobs", self.parent));
        self.send(self.http.post(url).query(&[("jobId", job_id)]).json(&body))
            .await
    }

    async fn run_job(&self, job_name: &str) -> Result<JobOperation> {
        let url = self.url(&format!("{job_name}:run"));
        self.send(self.http.post(url).json(&json!({}))).await
    }

    async fn get_operation(&self, operation_name: &str) -> Result<JobOperation> {
        self.send(self.http.get(self.url(operation_name))).await
    }
}

// ═══════════════════════════════════════════════════════════════
// RemoteJobRunner
// ═══════════════════════════════════════════════════════════════

pub struct RemoteJobRunner {
    client: Arc<dyn JobClient>,
    poll_interval: Duration,
}

impl RemoteJobRunner {
    pub fn new(client: Arc<dyn JobClient>) -> Self {
        Self {
            client,
            poll_interval: REMOTE_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Poll until `done`; an operation error is surfaced as `RemoteJob`
    async fn wait(&self, mut operation: JobOperation) -> Result<JobOperation> {
        while !operation.done {
            tokio::time::sleep(self.poll_interval).await;
            debug!(operation = %operation.name, "Polling operation");
            operation = self.client.get_operation(&operation.name).await?;
        }
        if let Some(error) = &operation.error {
            return Err(KilnError::RemoteJob {
                reason: format!("operation {} failed ({}): {}", operation.name, error.code, error.message),
            });
        }
        Ok(operation)
    }

    async fn submit(&self, request: &RunRequest) -> Result<JobOperation> {
        let id = job_id();
        let created = self.client.create_job(&id, request).await?;
        let created = self.wait(created).await?;
        let job_name = created
            .resource_name()
            .map(str::to_string)
            .ok_or_else(|| KilnError::RemoteJob {
                reason: format!("created job {id} has no resource name"),
            })?;
        info!(job = %job_name, "Remote job created");

        let run = self.client.run_job(&job_name).await?;
        self.wait(run).await
    }
}

#[async_trait]
impl TaskRunner for RemoteJobRunner {
    #[instrument(skip(self, request), fields(task = %request.task_name, image = %request.image))]
    async fn run(&self, request: &RunRequest) -> RunStatus {
        if request.command.is_empty() {
            return RunStatus::infrastructure("empty command");
        }
        let finished = match self.submit(request).await {
            Ok(op) => op,
            Err(e) => {
                warn!(error = %e, "Remote job did not run");
                return RunStatus::infrastructure(e.to_string());
            }
        };

        let conditions = finished.conditions();
        match conditions.iter().find(|c| c.condition_type == COMPLETED) {
            Some(c) if c.state == CONDITION_SUCCEEDED => RunStatus::Success,
            Some(c) => RunStatus::exit(
                1,
                format!(
                    "job did not complete: {}{}",
                    c.state,
                    c.message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default()
                ),
            ),
            None => RunStatus::exit(1, "job finished without a Completed condition"),
        }
    }

    fn name(&self) -> &str {
        "remote_job"
    }
}
