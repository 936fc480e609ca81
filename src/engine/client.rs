use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::types::{Execution, ExecutionHandle, WorkflowDefinition};
use crate::config::{EngineConfig, RequestConfig};
use crate::error::{EngineError, EngineResult};

/// Contract the healing core depends on.
///
/// The core never talks to a transport directly; everything upstream goes
/// through this trait so tests can substitute a programmable engine.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Fetch a workflow definition. `force_refresh` bypasses any caching.
    async fn get_workflow(&self, id: &str, force_refresh: bool) -> EngineResult<WorkflowDefinition>;

    /// Push a full workflow definition, returning the stored version.
    async fn update_workflow(&self, workflow: &WorkflowDefinition)
        -> EngineResult<WorkflowDefinition>;

    /// Delete a workflow.
    async fn delete_workflow(&self, id: &str) -> EngineResult<()>;

    /// List recent executions for a workflow, newest first.
    async fn list_executions(&self, workflow_id: &str, limit: u32) -> EngineResult<Vec<Execution>>;

    /// Trigger a test run of a workflow.
    async fn trigger_workflow(
        &self,
        id: &str,
        payload: Option<Value>,
    ) -> EngineResult<ExecutionHandle>;

    /// Stop a running execution.
    async fn stop_execution(&self, execution_id: &str) -> EngineResult<()>;
}

/// HTTP implementation of [`EngineClient`] for an n8n-style REST API.
pub struct HttpEngineClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
    cache: RwLock<HashMap<String, WorkflowDefinition>>,
}

impl HttpEngineClient {
    /// Create a new engine client.
    pub fn new(config: &EngineConfig, request_config: &RequestConfig) -> EngineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(EngineError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout_ms: request_config.timeout_ms,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> EngineResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let start = Instant::now();

        let mut builder = self
            .client
            .request(method.clone(), &url)
            .header("X-N8N-API-KEY", &self.api_key)
            .header("Accept", "application/json");

        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                EngineError::Timeout {
                    timeout_ms: self.timeout_ms,
                }
            } else {
                EngineError::Http(e)
            }
        })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, path, error_body));
        }

        debug!(
            method = %method,
            path = path,
            latency_ms = start.elapsed().as_millis() as u64,
            "Engine request succeeded"
        );

        response
            .json()
            .await
            .map_err(|e| EngineError::InvalidResponse {
                message: format!("Failed to parse response from {}: {}", path, e),
            })
    }

    async fn request_no_body(&self, method: Method, path: &str) -> EngineResult<()> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .request(method, &url)
            .header("X-N8N-API-KEY", &self.api_key)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Timeout {
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    EngineError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, path, error_body));
        }

        Ok(())
    }
}

/// Map a non-2xx status to the structured error variant retry
/// classification keys off.
fn classify_status(status: StatusCode, path: &str, body: String) -> EngineError {
    match status.as_u16() {
        401 | 403 => EngineError::Unauthorized { message: body },
        404 => EngineError::NotFound {
            resource: path.to_string(),
        },
        400 | 422 => EngineError::Validation { message: body },
        code => EngineError::Api {
            status: code,
            message: body,
        },
    }
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    async fn get_workflow(&self, id: &str, force_refresh: bool) -> EngineResult<WorkflowDefinition> {
        if !force_refresh {
            if let Some(cached) = self.cache.read().await.get(id) {
                debug!(workflow_id = id, "Serving workflow from cache");
                return Ok(cached.clone());
            }
        }

        let workflow: WorkflowDefinition = self
            .request(Method::GET, &format!("/api/v1/workflows/{}", id), None)
            .await?;

        self.cache
            .write()
            .await
            .insert(id.to_string(), workflow.clone());

        Ok(workflow)
    }

    async fn update_workflow(
        &self,
        workflow: &WorkflowDefinition,
    ) -> EngineResult<WorkflowDefinition> {
        let body = serde_json::to_value(workflow).map_err(|e| EngineError::InvalidResponse {
            message: format!("Failed to serialize workflow: {}", e),
        })?;

        let updated: WorkflowDefinition = self
            .request(
                Method::PUT,
                &format!("/api/v1/workflows/{}", workflow.id),
                Some(&body),
            )
            .await?;

        info!(workflow_id = %workflow.id, "Workflow updated");

        // Stored version replaces any cached snapshot
        self.cache
            .write()
            .await
            .insert(workflow.id.clone(), updated.clone());

        Ok(updated)
    }

    async fn delete_workflow(&self, id: &str) -> EngineResult<()> {
        self.request_no_body(Method::DELETE, &format!("/api/v1/workflows/{}", id))
            .await?;
        self.cache.write().await.remove(id);
        Ok(())
    }

    async fn list_executions(&self, workflow_id: &str, limit: u32) -> EngineResult<Vec<Execution>> {
        #[derive(serde::Deserialize)]
        struct ExecutionList {
            #[serde(default)]
            data: Vec<Execution>,
        }

        let list: ExecutionList = self
            .request(
                Method::GET,
                &format!(
                    "/api/v1/executions?workflowId={}&limit={}",
                    workflow_id, limit
                ),
                None,
            )
            .await?;

        Ok(list.data)
    }

    async fn trigger_workflow(
        &self,
        id: &str,
        payload: Option<Value>,
    ) -> EngineResult<ExecutionHandle> {
        let body = payload.unwrap_or_else(|| Value::Object(Default::default()));
        self.request(
            Method::POST,
            &format!("/api/v1/workflows/{}/run", id),
            Some(&body),
        )
        .await
    }

    async fn stop_execution(&self, execution_id: &str) -> EngineResult<()> {
        self.request_no_body(
            Method::POST,
            &format!("/api/v1/executions/{}/stop", execution_id),
        )
        .await
    }
}
