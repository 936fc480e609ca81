//! Fix proposal engine.
//!
//! Maps fixable, auto-fix-safe diagnostic issues to concrete proposed
//! mutations, each carrying a confidence score and a one-line rationale.
//! Applying a patch set is a pure function over a clone of the workflow;
//! the same application backs both real runs and dry runs.
//!
//! Connection-topology issues are deliberately never turned into fixes.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use super::confidence::{ConfidenceEngine, ScoreContext};
use super::safety;
use super::types::{
    AutonomyLevel, DiagnosticIssue, FixAction, IssueType, ProposedFix, WorkflowDiagnostics,
};
use crate::engine::types::{WorkflowDefinition, WorkflowNode};

/// Generates and applies bounded repair proposals.
pub struct FixEngine {
    confidence: Arc<ConfidenceEngine>,
    default_node_timeout_ms: u64,
}

impl FixEngine {
    /// Create a fix engine scoring through the given confidence engine.
    pub fn new(confidence: Arc<ConfidenceEngine>, default_node_timeout_ms: u64) -> Self {
        Self {
            confidence,
            default_node_timeout_ms,
        }
    }

    /// Propose fixes for every issue that is fixable, auto-fix-safe, and
    /// targets a node type the safety classifier accepts.
    pub async fn propose_fixes(
        &self,
        workflow: &WorkflowDefinition,
        diagnostics: &WorkflowDiagnostics,
        autonomy: AutonomyLevel,
    ) -> Vec<ProposedFix> {
        let mut fixes = Vec::new();

        for issue in &diagnostics.issues {
            if !issue.fixable || !issue.auto_fix_safe {
                continue;
            }

            let Some(node) = issue
                .node_id
                .as_deref()
                .and_then(|id| workflow.nodes.iter().find(|n| n.id == id))
            else {
                continue;
            };

            if !safety::is_safe_to_auto_fix(&node.node_type) {
                debug!(
                    node = %node.name,
                    node_type = %node.node_type,
                    "Skipping fix: node type not auto-fix-safe"
                );
                continue;
            }

            if let Some((action, changes, reasoning)) = self.strategy_for(issue, node) {
                let context = ScoreContext {
                    target_resource: Some(node.id.clone()),
                    metadata: [("issue".to_string(), issue.issue_type.to_string())]
                        .into_iter()
                        .collect(),
                };
                let confidence = self
                    .confidence
                    .calculate_score(action.as_str(), autonomy, Some(&context))
                    .await;

                fixes.push(ProposedFix {
                    issue_type: issue.issue_type,
                    node_id: node.id.clone(),
                    node_name: node.name.clone(),
                    action,
                    changes,
                    confidence_score: confidence.score,
                    reasoning,
                });
            }
        }

        debug!(
            workflow_id = %workflow.id,
            proposed = fixes.len(),
            "Fix proposal complete"
        );

        fixes
    }

    /// Apply a patch set to a clone of the workflow. Pure: no I/O, the
    /// input is never mutated. Dry runs use the same application and
    /// discard the result.
    pub fn apply_fixes(
        &self,
        workflow: &WorkflowDefinition,
        fixes: &[ProposedFix],
    ) -> WorkflowDefinition {
        let mut patched = workflow.clone();

        for fix in fixes {
            let Some(node) = patched.nodes.iter_mut().find(|n| n.id == fix.node_id) else {
                continue;
            };

            match fix.action {
                FixAction::EnableNode => {
                    node.disabled = false;
                }
                FixAction::UpdateSettings | FixAction::UpdateNode => {
                    merge_into(&mut node.parameters, &fix.changes);
                }
            }
        }

        patched
    }

    /// Issue-type → patch strategy. Returns `None` for issue types with no
    /// automated repair.
    fn strategy_for(
        &self,
        issue: &DiagnosticIssue,
        node: &WorkflowNode,
    ) -> Option<(FixAction, Value, String)> {
        match issue.issue_type {
            IssueType::DisabledNode => Some((
                FixAction::EnableNode,
                json!({ "disabled": false }),
                format!("Node '{}' is disabled; enabling restores the path", node.name),
            )),
            IssueType::TimeoutConfiguration => Some((
                FixAction::UpdateSettings,
                json!({ "options": { "timeout": self.default_node_timeout_ms } }),
                format!(
                    "HTTP node '{}' has no timeout; adding a {}ms default prevents hangs",
                    node.name, self.default_node_timeout_ms
                ),
            )),
            // Rewiring connections unattended is judged too risky
            IssueType::BrokenConnection => None,
            IssueType::MissingCredential
            | IssueType::InvalidParameter
            | IssueType::UnknownError => None,
        }
    }
}

/// Recursively merge `patch` into `target`. Objects merge key-wise;
/// anything else is replaced.
fn merge_into(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                match target_map.get_mut(key) {
                    Some(existing) => merge_into(existing, patch_value),
                    None => {
                        target_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (target, patch) => {
            *target = patch.clone();
        }
    }
}
