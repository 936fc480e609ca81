//! Workflow diagnostics engine.
//!
//! Inspects a workflow definition and its recent execution history and emits
//! a typed issue list plus a 0-100 health score. Three passes:
//!
//! 1. **Node pass**: disabled nodes, empty credential bindings, HTTP nodes
//!    without a timeout or URL.
//! 2. **Connection pass**: non-trigger nodes no edge ever reaches.
//! 3. **History pass**: nodes failing repeatedly in recent executions.
//!
//! Diagnostics are ephemeral; nothing here mutates or persists anything.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use super::safety;
use super::types::{DiagnosticIssue, IssueType, Severity, WorkflowDiagnostics};
use crate::engine::types::{Execution, WorkflowDefinition, WorkflowNode};

/// Minimum recent failures on one node before it is flagged.
const REPEATED_FAILURE_THRESHOLD: usize = 2;

/// Stateless inspector producing [`WorkflowDiagnostics`].
pub struct DiagnosticsEngine;

impl DiagnosticsEngine {
    /// Create a diagnostics engine.
    pub fn new() -> Self {
        Self
    }

    /// Inspect one workflow and its recent executions.
    pub fn diagnose(
        &self,
        workflow: &WorkflowDefinition,
        recent_executions: &[Execution],
    ) -> WorkflowDiagnostics {
        let mut issues = Vec::new();

        for node in &workflow.nodes {
            self.check_node(node, &mut issues);
        }

        self.check_connections(workflow, &mut issues);
        self.check_execution_history(workflow, recent_executions, &mut issues);

        let health_score = health_score(&issues);
        let fixable_issues_count = issues.iter().filter(|i| i.fixable).count();
        let auto_fix_safe_count = issues.iter().filter(|i| i.fixable && i.auto_fix_safe).count();

        debug!(
            workflow_id = %workflow.id,
            issues = issues.len(),
            health_score = health_score,
            "Diagnosis complete"
        );

        WorkflowDiagnostics {
            workflow_id: workflow.id.clone(),
            timestamp: Utc::now(),
            issues,
            health_score,
            fixable_issues_count,
            auto_fix_safe_count,
        }
    }

    fn check_node(&self, node: &WorkflowNode, issues: &mut Vec<DiagnosticIssue>) {
        if node.disabled {
            issues.push(DiagnosticIssue {
                issue_type: IssueType::DisabledNode,
                severity: Severity::Warning,
                node_id: Some(node.id.clone()),
                node_name: Some(node.name.clone()),
                node_type: Some(node.node_type.clone()),
                message: format!("Node '{}' is disabled and will be skipped", node.name),
                details: None,
                fixable: true,
                auto_fix_safe: true,
            });
        }

        if let Some(credentials) = &node.credentials {
            if credentials.is_empty() {
                issues.push(DiagnosticIssue {
                    issue_type: IssueType::MissingCredential,
                    severity: Severity::Error,
                    node_id: Some(node.id.clone()),
                    node_name: Some(node.name.clone()),
                    node_type: Some(node.node_type.clone()),
                    message: format!(
                        "Node '{}' has a credential slot with nothing attached",
                        node.name
                    ),
                    details: None,
                    // Selecting a credential needs a human
                    fixable: false,
                    auto_fix_safe: false,
                });
            }
        }

        if node.is_http() && !node.disabled {
            if !node.has_timeout() {
                issues.push(DiagnosticIssue {
                    issue_type: IssueType::TimeoutConfiguration,
                    severity: Severity::Warning,
                    node_id: Some(node.id.clone()),
                    node_name: Some(node.name.clone()),
                    node_type: Some(node.node_type.clone()),
                    message: format!(
                        "HTTP node '{}' has no request timeout and can hang the workflow",
                        node.name
                    ),
                    details: None,
                    fixable: true,
                    auto_fix_safe: true,
                });
            }

            if node.string_param("url").map_or(true, str::is_empty) {
                issues.push(DiagnosticIssue {
                    issue_type: IssueType::InvalidParameter,
                    severity: Severity::Error,
                    node_id: Some(node.id.clone()),
                    node_name: Some(node.name.clone()),
                    node_type: Some(node.node_type.clone()),
                    message: format!("HTTP node '{}' has no URL configured", node.name),
                    details: Some(json!({ "parameter": "url" })),
                    // Guessing a URL is not a repair
                    fixable: false,
                    auto_fix_safe: false,
                });
            }
        }
    }

    fn check_connections(&self, workflow: &WorkflowDefinition, issues: &mut Vec<DiagnosticIssue>) {
        let mut has_incoming: HashSet<&str> = HashSet::new();
        for connections in workflow.connections.values() {
            for output in &connections.main {
                for target in output {
                    has_incoming.insert(target.node.as_str());
                }
            }
        }

        for node in &workflow.nodes {
            if node.is_trigger() || node.disabled {
                continue;
            }
            if !has_incoming.contains(node.name.as_str()) {
                issues.push(DiagnosticIssue {
                    issue_type: IssueType::BrokenConnection,
                    severity: Severity::Error,
                    node_id: Some(node.id.clone()),
                    node_name: Some(node.name.clone()),
                    node_type: Some(node.node_type.clone()),
                    message: format!(
                        "Node '{}' is unreachable: no connection feeds into it",
                        node.name
                    ),
                    details: None,
                    // Rewiring topology is never automated
                    fixable: true,
                    auto_fix_safe: false,
                });
            }
        }
    }

    fn check_execution_history(
        &self,
        workflow: &WorkflowDefinition,
        recent_executions: &[Execution],
        issues: &mut Vec<DiagnosticIssue>,
    ) {
        let mut failures_by_node: HashMap<String, usize> = HashMap::new();
        for execution in recent_executions.iter().filter(|e| e.failed()) {
            if let Some(node_name) = execution.failing_node_name() {
                *failures_by_node.entry(node_name).or_insert(0) += 1;
            }
        }

        for (node_name, count) in failures_by_node {
            if count < REPEATED_FAILURE_THRESHOLD {
                continue;
            }

            let node = workflow.nodes.iter().find(|n| n.name == node_name);
            let node_type = node.map(|n| n.node_type.clone());
            let auto_fix_safe = node_type
                .as_deref()
                .map(safety::is_safe_to_auto_fix)
                .unwrap_or(false);

            issues.push(DiagnosticIssue {
                issue_type: IssueType::UnknownError,
                severity: Severity::Error,
                node_id: node.map(|n| n.id.clone()),
                node_name: Some(node_name.clone()),
                node_type,
                message: format!(
                    "Node '{}' failed in {} recent executions",
                    node_name, count
                ),
                details: Some(json!({ "failure_count": count })),
                fixable: false,
                auto_fix_safe,
            });
        }
    }
}

impl Default for DiagnosticsEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// `max(0, 100 - Σ deduction(severity))` over all issues.
fn health_score(issues: &[DiagnosticIssue]) -> u32 {
    let total: u32 = issues.iter().map(|i| i.severity.deduction()).sum();
    100u32.saturating_sub(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{ConnectionTarget, ExecutionError, NodeConnections};
    use serde_json::{json, Value};

    fn node(name: &str, node_type: &str, disabled: bool, parameters: Value) -> WorkflowNode {
        WorkflowNode {
            id: format!("id-{}", name.to_lowercase().replace(' ', "-")),
            name: name.to_string(),
            node_type: node_type.to_string(),
            disabled,
            parameters,
            credentials: None,
        }
    }

    fn connect(workflow: &mut WorkflowDefinition, from: &str, to: &str) {
        workflow
            .connections
            .entry(from.to_string())
            .or_default()
            .main
            .push(vec![ConnectionTarget {
                node: to.to_string(),
                connection_type: "main".to_string(),
                index: 0,
            }]);
    }

    fn base_workflow(nodes: Vec<WorkflowNode>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "wf-1".to_string(),
            name: "Test Workflow".to_string(),
            active: true,
            nodes,
            connections: HashMap::new(),
            settings: None,
        }
    }

    fn failed_execution(node_name: &str) -> Execution {
        Execution {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: "wf-1".to_string(),
            finished: true,
            status: "error".to_string(),
            started_at: None,
            stopped_at: None,
            error: Some(ExecutionError {
                message: "failed".to_string(),
                node_name: Some(node_name.to_string()),
            }),
        }
    }

    #[test]
    fn test_healthy_workflow_scores_100() {
        let mut wf = base_workflow(vec![
            node("Trigger", "n8n-nodes-base.webhook", false, json!({})),
            node(
                "Send",
                "n8n-nodes-base.httpRequest",
                false,
                json!({ "url": "https://x", "options": { "timeout": 5000 } }),
            ),
        ]);
        connect(&mut wf, "Trigger", "Send");

        let diag = DiagnosticsEngine::new().diagnose(&wf, &[]);
        assert!(diag.issues.is_empty());
        assert_eq!(diag.health_score, 100);
    }

    #[test]
    fn test_single_disabled_node_scores_95() {
        let mut wf = base_workflow(vec![
            node("Trigger", "n8n-nodes-base.webhook", false, json!({})),
            node("Transform", "n8n-nodes-base.set", true, json!({})),
        ]);
        connect(&mut wf, "Trigger", "Transform");

        let diag = DiagnosticsEngine::new().diagnose(&wf, &[]);
        assert_eq!(diag.issues.len(), 1);
        let issue = &diag.issues[0];
        assert_eq!(issue.issue_type, IssueType::DisabledNode);
        assert!(issue.fixable);
        assert!(issue.auto_fix_safe);
        assert_eq!(diag.health_score, 95);
        assert_eq!(diag.fixable_issues_count, 1);
        assert_eq!(diag.auto_fix_safe_count, 1);
    }

    #[test]
    fn test_missing_credential_not_fixable() {
        let mut n = node("Mail", "n8n-nodes-base.emailSend", false, json!({}));
        n.credentials = Some(HashMap::new());
        let mut wf = base_workflow(vec![
            node("Trigger", "n8n-nodes-base.webhook", false, json!({})),
            n,
        ]);
        connect(&mut wf, "Trigger", "Mail");

        let diag = DiagnosticsEngine::new().diagnose(&wf, &[]);
        let issue = diag
            .issues
            .iter()
            .find(|i| i.issue_type == IssueType::MissingCredential)
            .unwrap();
        assert!(!issue.fixable);
        assert_eq!(issue.severity, Severity::Error);
    }

    #[test]
    fn test_http_without_timeout_is_fixable() {
        let mut wf = base_workflow(vec![
            node("Trigger", "n8n-nodes-base.webhook", false, json!({})),
            node(
                "Fetch",
                "n8n-nodes-base.httpRequest",
                false,
                json!({ "url": "https://x" }),
            ),
        ]);
        connect(&mut wf, "Trigger", "Fetch");

        let diag = DiagnosticsEngine::new().diagnose(&wf, &[]);
        let issue = diag
            .issues
            .iter()
            .find(|i| i.issue_type == IssueType::TimeoutConfiguration)
            .unwrap();
        assert!(issue.fixable);
        assert!(issue.auto_fix_safe);
    }

    #[test]
    fn test_http_without_url_not_fixable() {
        let mut wf = base_workflow(vec![
            node("Trigger", "n8n-nodes-base.webhook", false, json!({})),
            node(
                "Fetch",
                "n8n-nodes-base.httpRequest",
                false,
                json!({ "options": { "timeout": 5000 } }),
            ),
        ]);
        connect(&mut wf, "Trigger", "Fetch");

        let diag = DiagnosticsEngine::new().diagnose(&wf, &[]);
        let issue = diag
            .issues
            .iter()
            .find(|i| i.issue_type == IssueType::InvalidParameter)
            .unwrap();
        assert!(!issue.fixable);
    }

    #[test]
    fn test_orphan_node_flagged_but_not_auto_safe() {
        let wf = base_workflow(vec![
            node("Trigger", "n8n-nodes-base.webhook", false, json!({})),
            node("Orphan", "n8n-nodes-base.set", false, json!({})),
        ]);

        let diag = DiagnosticsEngine::new().diagnose(&wf, &[]);
        let issue = diag
            .issues
            .iter()
            .find(|i| i.issue_type == IssueType::BrokenConnection)
            .unwrap();
        assert_eq!(issue.node_name.as_deref(), Some("Orphan"));
        assert!(issue.fixable);
        assert!(!issue.auto_fix_safe);
    }

    #[test]
    fn test_trigger_nodes_need_no_incoming_edge() {
        let wf = base_workflow(vec![node(
            "Trigger",
            "n8n-nodes-base.scheduleTrigger",
            false,
            json!({}),
        )]);

        let diag = DiagnosticsEngine::new().diagnose(&wf, &[]);
        assert!(diag.issues.is_empty());
    }

    #[test]
    fn test_repeated_failures_raise_unknown_error() {
        let mut wf = base_workflow(vec![
            node("Trigger", "n8n-nodes-base.webhook", false, json!({})),
            node(
                "Fetch",
                "n8n-nodes-base.httpRequest",
                false,
                json!({ "url": "https://x", "timeout": 5000 }),
            ),
        ]);
        connect(&mut wf, "Trigger", "Fetch");

        let executions = vec![failed_execution("Fetch"), failed_execution("Fetch")];
        let diag = DiagnosticsEngine::new().diagnose(&wf, &executions);

        let issue = diag
            .issues
            .iter()
            .find(|i| i.issue_type == IssueType::UnknownError)
            .unwrap();
        assert_eq!(issue.node_name.as_deref(), Some("Fetch"));
        // httpRequest passes the safety classifier
        assert!(issue.auto_fix_safe);
        assert!(!issue.fixable);
    }

    #[test]
    fn test_single_failure_below_threshold_ignored() {
        let mut wf = base_workflow(vec![
            node("Trigger", "n8n-nodes-base.webhook", false, json!({})),
            node(
                "Fetch",
                "n8n-nodes-base.httpRequest",
                false,
                json!({ "url": "https://x", "timeout": 5000 }),
            ),
        ]);
        connect(&mut wf, "Trigger", "Fetch");

        let diag = DiagnosticsEngine::new().diagnose(&wf, &[failed_execution("Fetch")]);
        assert!(diag
            .issues
            .iter()
            .all(|i| i.issue_type != IssueType::UnknownError));
    }

    #[test]
    fn test_health_score_deduction_sums() {
        // One warning (5) + one error (15) = 80
        let mut wf = base_workflow(vec![
            node("Trigger", "n8n-nodes-base.webhook", false, json!({})),
            node("Disabled", "n8n-nodes-base.set", true, json!({})),
            node("Orphan", "n8n-nodes-base.set", false, json!({})),
        ]);
        connect(&mut wf, "Trigger", "Disabled");

        let diag = DiagnosticsEngine::new().diagnose(&wf, &[]);
        assert_eq!(diag.health_score, 80);
    }

    #[test]
    fn test_health_score_floors_at_zero() {
        let issues: Vec<DiagnosticIssue> = (0..5)
            .map(|i| DiagnosticIssue {
                issue_type: IssueType::UnknownError,
                severity: Severity::Critical,
                node_id: None,
                node_name: Some(format!("n{}", i)),
                node_type: None,
                message: "broken".to_string(),
                details: None,
                fixable: false,
                auto_fix_safe: false,
            })
            .collect();
        assert_eq!(health_score(&issues), 0);
    }
}
