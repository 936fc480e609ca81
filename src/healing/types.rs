//! Core data model for the self-healing pipeline.
//!
//! Everything here is transient: diagnostics are produced fresh per
//! invocation, rollback points and action history live only for the process
//! lifetime, and nothing is ever persisted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a rollback point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RollbackPointId(pub String);

impl RollbackPointId {
    /// Create a new unique rollback point ID.
    pub fn new() -> Self {
        Self(format!("rollback_{}", uuid::Uuid::new_v4()))
    }
}

impl Default for RollbackPointId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RollbackPointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation identifier threaded through one heal invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct HealRunId(pub String);

impl HealRunId {
    /// Create a new unique heal run ID.
    pub fn new() -> Self {
        Self(format!("heal_{}", uuid::Uuid::new_v4()))
    }
}

impl Default for HealRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HealRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Severity and Issue Types
// ============================================================================

/// Severity levels for diagnosed issues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational - no action needed
    Info = 0,
    /// Warning - degraded but functional
    Warning = 1,
    /// Error - a node or connection is broken
    Error = 2,
    /// Critical - the workflow cannot run
    Critical = 3,
}

impl Severity {
    /// Health score deduction for one issue of this severity.
    pub fn deduction(&self) -> u32 {
        match self {
            Severity::Critical => 25,
            Severity::Error => 15,
            Severity::Warning => 5,
            Severity::Info => 1,
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Categories of diagnosable workflow defects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    /// A node is disabled and will be skipped at runtime
    DisabledNode,
    /// A node has an empty credential binding
    MissingCredential,
    /// A node parameter is missing or malformed
    InvalidParameter,
    /// An HTTP node has no request timeout configured
    TimeoutConfiguration,
    /// A non-trigger node has no incoming connection
    BrokenConnection,
    /// A node failed repeatedly in recent executions
    UnknownError,
}

impl IssueType {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::DisabledNode => "disabled_node",
            IssueType::MissingCredential => "missing_credential",
            IssueType::InvalidParameter => "invalid_parameter",
            IssueType::TimeoutConfiguration => "timeout_configuration",
            IssueType::BrokenConnection => "broken_connection",
            IssueType::UnknownError => "unknown_error",
        }
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// One diagnosed defect in a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Whether any repair for this issue exists at all
    pub fixable: bool,
    /// Whether the repair is safe to apply without human review
    pub auto_fix_safe: bool,
}

/// Full diagnostic report for one workflow, produced fresh per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDiagnostics {
    pub workflow_id: String,
    pub timestamp: DateTime<Utc>,
    pub issues: Vec<DiagnosticIssue>,
    /// 0-100 summary of the workflow's condition
    pub health_score: u32,
    pub fixable_issues_count: usize,
    pub auto_fix_safe_count: usize,
}

// ============================================================================
// Proposed Fixes
// ============================================================================

/// Mutation kinds the fix engine may propose.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FixAction {
    /// Clear a node's disabled flag
    EnableNode,
    /// Merge settings into a node's parameters
    UpdateSettings,
    /// Replace node fields wholesale
    UpdateNode,
}

impl FixAction {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            FixAction::EnableNode => "enable_node",
            FixAction::UpdateSettings => "update_settings",
            FixAction::UpdateNode => "update_node",
        }
    }
}

impl std::fmt::Display for FixAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A concrete repair proposal for one diagnosed issue.
///
/// Only created when the issue is fixable, marked auto-fix-safe, and the
/// target node type passes the safety classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedFix {
    pub issue_type: IssueType,
    pub node_id: String,
    pub node_name: String,
    pub action: FixAction,
    /// Patch fragment applied to the node
    pub changes: Value,
    /// 0-100 composite confidence for applying this fix unattended
    pub confidence_score: u32,
    pub reasoning: String,
}

// ============================================================================
// Confidence
// ============================================================================

/// The four weighted inputs behind a confidence score, each 0-100.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceFactors {
    pub autonomy_level: u32,
    pub action_risk: u32,
    pub historical_success: u32,
    pub contextual_relevance: u32,
}

/// Weighted composite estimating how safe an action is to take unattended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceScore {
    /// 0-100 composite
    pub score: u32,
    pub factors: ConfidenceFactors,
}

/// Running success counters for one action type.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ActionStats {
    pub success_count: u64,
    pub total_count: u64,
}

// ============================================================================
// Rollback
// ============================================================================

/// What kind of mutation a rollback point undoes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RollbackAction {
    /// Restore by re-issuing an update with the snapshot payload
    UpdateWorkflow,
    /// Restore by deleting the resource that was newly created
    CreateWorkflow,
}

impl RollbackAction {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackAction::UpdateWorkflow => "update_workflow",
            RollbackAction::CreateWorkflow => "create_workflow",
        }
    }
}

/// A retained pre-mutation snapshot plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackPoint {
    pub id: RollbackPointId,
    pub action: RollbackAction,
    pub resource_id: String,
    pub timestamp: DateTime<Utc>,
    /// Opaque pre-mutation payload
    pub snapshot: Value,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Outcome of a rollback attempt. Never an error - absence of the point and
/// restore failures are both reported as data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResult {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Autonomy
// ============================================================================

/// Global 0-3 setting controlling which actions proceed without confirmation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum AutonomyLevel {
    /// Dry runs only, no mutation
    Manual = 0,
    /// Mutations require explicit confirmation
    Assisted = 1,
    /// Safe mutations proceed unattended
    Supervised = 2,
    /// All allowlisted mutations proceed unattended (sandbox only)
    Autonomous = 3,
}

impl AutonomyLevel {
    /// Parse from the 0-3 wire representation.
    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            0 => Some(AutonomyLevel::Manual),
            1 => Some(AutonomyLevel::Assisted),
            2 => Some(AutonomyLevel::Supervised),
            3 => Some(AutonomyLevel::Autonomous),
            _ => None,
        }
    }

    /// The 0-3 wire representation.
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Confidence factor contributed by this level.
    pub fn confidence_factor(&self) -> u32 {
        match self {
            AutonomyLevel::Manual => 20,
            AutonomyLevel::Assisted => 40,
            AutonomyLevel::Supervised => 70,
            AutonomyLevel::Autonomous => 100,
        }
    }

    /// Whether a real (mutating) heal run is permitted at all.
    pub fn allows_mutation(&self) -> bool {
        *self >= AutonomyLevel::Assisted
    }

    /// Whether mutations proceed without explicit confirmation.
    pub fn skips_confirmation(&self) -> bool {
        *self >= AutonomyLevel::Supervised
    }
}

impl std::fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}
