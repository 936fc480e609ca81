//! Self-healing subsystem.
//!
//! The pipeline runs per workflow: diagnose against live state and recent
//! executions, propose bounded safe fixes, snapshot, apply, verify with a
//! test run, then commit or roll back. Guard rails sit around the whole
//! thing: an allowlist-based safety classifier, confidence scoring, a
//! per-workflow rate limiter with a sticky failure circuit, and retained
//! rollback points.
//!
//! All state is in-process and transient. Nothing survives a restart.

pub mod audit;
pub mod confidence;
pub mod diagnostics;
pub mod fixes;
pub mod orchestrator;
pub mod rate_limit;
pub mod retry;
pub mod rollback;
pub mod safety;
pub mod types;

pub use audit::{AuditLevel, AuditSink, TracingAuditSink};
pub use confidence::{ConfidenceEngine, ScoreContext};
pub use diagnostics::DiagnosticsEngine;
pub use fixes::FixEngine;
pub use orchestrator::{
    HealOutcome, HealReport, HealRequest, HealingStatus, SelfHealOrchestrator, Verification,
};
pub use rate_limit::{RateLimitDecision, RateLimiter, SweeperHandle};
pub use retry::{RetryError, RetryExecutor, Retryable};
pub use rollback::RollbackManager;
pub use types::{
    AutonomyLevel, DiagnosticIssue, FixAction, HealRunId, IssueType, ProposedFix, RollbackAction,
    RollbackPoint, RollbackPointId, RollbackResult, Severity, WorkflowDiagnostics,
};
