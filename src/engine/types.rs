//! Wire types for the workflow engine REST API.
//!
//! These mirror the engine's JSON shapes (n8n-style): a workflow is a set of
//! named nodes plus a connection graph keyed by source node name. The core
//! treats every fetched definition as a read-only snapshot; mutation happens
//! on clones that are pushed back whole.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A workflow definition as returned by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    /// Connection graph keyed by source node name.
    #[serde(default)]
    pub connections: HashMap<String, NodeConnections>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
}

/// One node within a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub id: String,
    pub name: String,
    /// Node type string, e.g. `n8n-nodes-base.httpRequest`.
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub parameters: Value,
    /// Credential bindings; `Some` with an empty map means a credential
    /// slot exists but nothing is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<HashMap<String, Value>>,
}

impl WorkflowNode {
    /// Whether this node type starts a workflow rather than receiving input.
    pub fn is_trigger(&self) -> bool {
        let t = self.node_type.to_lowercase();
        t.contains("trigger") || t.contains("webhook") || t.ends_with(".start")
    }

    /// Whether this node makes outbound HTTP requests.
    pub fn is_http(&self) -> bool {
        self.node_type.to_lowercase().contains("httprequest")
    }

    /// Read a string parameter, if present.
    pub fn string_param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }

    /// Whether the node carries any configured request timeout.
    pub fn has_timeout(&self) -> bool {
        if self.parameters.get("timeout").is_some() {
            return true;
        }
        self.parameters
            .get("options")
            .and_then(|o| o.get("timeout"))
            .is_some()
    }
}

/// Outgoing connections of a single node, grouped by output index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConnections {
    #[serde(default)]
    pub main: Vec<Vec<ConnectionTarget>>,
}

/// One edge in the connection graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionTarget {
    /// Target node name.
    pub node: String,
    #[serde(rename = "type", default = "default_connection_type")]
    pub connection_type: String,
    #[serde(default)]
    pub index: u32,
}

fn default_connection_type() -> String {
    "main".to_string()
}

/// A recorded workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    #[serde(rename = "workflowId")]
    pub workflow_id: String,
    #[serde(default)]
    pub finished: bool,
    /// Engine status string: `success`, `error`, `running`, `waiting`.
    #[serde(default)]
    pub status: String,
    #[serde(rename = "startedAt", default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "stoppedAt", default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

impl Execution {
    /// Whether the execution terminated without error.
    pub fn succeeded(&self) -> bool {
        self.finished && self.status != "error" && self.error.is_none()
    }

    /// Whether the execution terminated with an error.
    pub fn failed(&self) -> bool {
        self.status == "error" || self.error.is_some()
    }

    /// Best-effort name of the node the execution failed on.
    ///
    /// Prefers the structured field; falls back to the first quoted name in
    /// the error message for engines that only report free text.
    pub fn failing_node_name(&self) -> Option<String> {
        let err = self.error.as_ref()?;
        if let Some(node) = &err.node_name {
            return Some(node.clone());
        }
        extract_quoted_name(&err.message)
    }
}

/// Error detail attached to a failed execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionError {
    pub message: String,
    #[serde(rename = "nodeName", default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

/// Handle returned when a workflow is triggered for a test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionHandle {
    #[serde(rename = "executionId")]
    pub execution_id: String,
    #[serde(default)]
    pub status: String,
}

/// Pull the first single- or double-quoted substring out of a message.
fn extract_quoted_name(message: &str) -> Option<String> {
    for quote in ['\'', '"'] {
        let mut parts = message.splitn(3, quote);
        parts.next()?;
        if let Some(name) = parts.next() {
            if parts.next().is_some() && !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }
    None
}
