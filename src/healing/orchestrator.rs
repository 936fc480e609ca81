//! Self-heal orchestrator.
//!
//! Drives one workflow through the full remediation pipeline: rate-limit
//! gate, fresh diagnosis, fix proposal, confirmation gate, pre-mutation
//! snapshot, bounded apply, verification run, then commit or automatic
//! rollback. Every transition is audited under the run's correlation id.
//!
//! Rate-limit attempts and confidence history are recorded only when a run
//! actually mutates the workflow. Healthy workflows, dry runs, and runs
//! stopped at a gate never consume attempt budget.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use super::audit::{AuditLevel, AuditSink};
use super::confidence::ConfidenceEngine;
use super::diagnostics::DiagnosticsEngine;
use super::fixes::FixEngine;
use super::rate_limit::{RateLimitRecord, RateLimiter};
use super::rollback::RollbackManager;
use super::retry::RetryExecutor;
use super::types::{
    ActionStats, AutonomyLevel, HealRunId, ProposedFix, RollbackAction, RollbackPointId,
    WorkflowDiagnostics,
};
use crate::config::HealingConfig;
use crate::engine::types::Execution;
use crate::engine::{EngineClient, WorkflowDefinition};
use crate::error::{HealError, HealResult};

/// One heal invocation as received from the tool surface.
#[derive(Debug, Clone, Deserialize)]
pub struct HealRequest {
    pub workflow_id: String,
    /// Explicit operator confirmation for levels that require it.
    #[serde(default)]
    pub force: bool,
    /// Diagnose and propose without mutating anything.
    #[serde(default)]
    pub dry_run: bool,
    /// Optional tighter cap on fixes applied this run.
    #[serde(default)]
    pub max_fixes: Option<usize>,
    /// Operator override for the rate-limit gate.
    #[serde(default)]
    pub skip_rate_limit_check: bool,
}

/// Result of the post-apply verification run.
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub execution_id: Option<String>,
    pub status: String,
    pub passed: bool,
}

/// Terminal state of a heal run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HealOutcome {
    /// No fixable defects were found; nothing was touched.
    Healthy,
    /// A plan exists but the autonomy level requires confirmation.
    ConfirmationRequired { proposed_fixes: Vec<ProposedFix> },
    /// The plan that a real run would apply, with nothing mutated.
    DryRun { proposed_fixes: Vec<ProposedFix> },
    /// Fixes applied, pushed, and verified.
    Healed {
        applied_fixes: Vec<ProposedFix>,
        rollback_point_id: RollbackPointId,
        verification: Verification,
    },
    /// Verification failed and the workflow was restored from its snapshot.
    RolledBack {
        attempted_fixes: Vec<ProposedFix>,
        rollback_point_id: RollbackPointId,
        test_failure: String,
    },
}

/// Full report of one heal run.
#[derive(Debug, Clone, Serialize)]
pub struct HealReport {
    pub run_id: HealRunId,
    pub workflow_id: String,
    #[serde(flatten)]
    pub outcome: HealOutcome,
    pub diagnostics: WorkflowDiagnostics,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Point-in-time snapshot of the healing subsystem.
#[derive(Debug, Clone, Serialize)]
pub struct HealingStatus {
    pub autonomy_level: u8,
    pub sandbox_mode: bool,
    pub rollback_points_retained: usize,
    pub rate_limit_records: Vec<RateLimitRecord>,
    pub action_stats: HashMap<String, ActionStats>,
}

/// Coordinates the diagnosis-fix-verify-commit pipeline for one engine.
pub struct SelfHealOrchestrator {
    engine: Arc<dyn EngineClient>,
    diagnostics: DiagnosticsEngine,
    fixes: FixEngine,
    confidence: Arc<ConfidenceEngine>,
    rate_limiter: Arc<RateLimiter>,
    rollback: Arc<RollbackManager>,
    retry: RetryExecutor,
    audit: Arc<dyn AuditSink>,
    autonomy: RwLock<AutonomyLevel>,
    config: HealingConfig,
}

impl SelfHealOrchestrator {
    /// Wire the orchestrator from its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: Arc<dyn EngineClient>,
        confidence: Arc<ConfidenceEngine>,
        rate_limiter: Arc<RateLimiter>,
        rollback: Arc<RollbackManager>,
        retry: RetryExecutor,
        audit: Arc<dyn AuditSink>,
        config: HealingConfig,
    ) -> Self {
        let autonomy =
            AutonomyLevel::from_u8(config.default_autonomy).unwrap_or(AutonomyLevel::Assisted);
        Self {
            engine,
            diagnostics: DiagnosticsEngine::new(),
            fixes: FixEngine::new(Arc::clone(&confidence), config.default_node_timeout_ms),
            confidence,
            rate_limiter,
            rollback,
            retry,
            audit,
            autonomy: RwLock::new(autonomy),
            config,
        }
    }

    /// Run the full heal pipeline for one workflow.
    #[instrument(skip(self), fields(workflow_id = %request.workflow_id))]
    pub async fn heal(&self, request: HealRequest) -> HealResult<HealReport> {
        let run_id = HealRunId::new();
        let started_at = Utc::now();
        let autonomy = *self.autonomy.read().await;

        self.audit_event(
            AuditLevel::Info,
            "heal_started",
            &run_id,
            json_meta(&[
                ("workflow_id", json!(request.workflow_id)),
                ("dry_run", json!(request.dry_run)),
                ("autonomy_level", json!(autonomy.as_u8())),
            ]),
        );

        if !request.dry_run && !autonomy.allows_mutation() {
            self.audit_event(
                AuditLevel::Warning,
                "heal_rejected",
                &run_id,
                json_meta(&[("reason", json!("autonomy level forbids mutation"))]),
            );
            return Err(HealError::NotAllowed {
                reason: "autonomy level 0 permits dry runs only".to_string(),
            });
        }

        // Dry runs never record an attempt, but a blocked or capped
        // resource is denied even a dry run
        if !request.skip_rate_limit_check {
            let decision = self.rate_limiter.check_rate_limit(&request.workflow_id).await;
            if !decision.allowed {
                let reason = decision
                    .reason
                    .unwrap_or_else(|| "rate limited".to_string());
                self.audit_event(
                    AuditLevel::Warning,
                    "rate_limit_denied",
                    &run_id,
                    json_meta(&[
                        ("workflow_id", json!(request.workflow_id)),
                        ("reason", json!(reason)),
                        ("reset_at", json!(decision.reset_at)),
                    ]),
                );
                return Err(HealError::RateLimited { reason });
            }
        }

        let workflow = self.fetch_workflow(&request.workflow_id).await?;
        let executions = self.fetch_executions(&request.workflow_id).await?;
        let diagnostics = self.diagnostics.diagnose(&workflow, &executions);

        self.audit_event(
            AuditLevel::Info,
            "diagnosis_completed",
            &run_id,
            json_meta(&[
                ("issues", json!(diagnostics.issues.len())),
                ("health_score", json!(diagnostics.health_score)),
            ]),
        );

        let max_fixes = request
            .max_fixes
            .map(|m| m.min(self.config.max_fixes_per_run))
            .unwrap_or(self.config.max_fixes_per_run);

        let mut proposed = self
            .fixes
            .propose_fixes(&workflow, &diagnostics, autonomy)
            .await;
        proposed.truncate(max_fixes);

        if proposed.is_empty() {
            // Nothing applicable: terminal without touching budget or history
            info!(workflow_id = %request.workflow_id, "No applicable fixes, workflow left untouched");
            return Ok(self.report(run_id, request.workflow_id, HealOutcome::Healthy, diagnostics, started_at));
        }

        if request.dry_run {
            self.audit_event(
                AuditLevel::Info,
                "dry_run_completed",
                &run_id,
                json_meta(&[("proposed_fixes", json!(proposed.len()))]),
            );
            return Ok(self.report(
                run_id,
                request.workflow_id,
                HealOutcome::DryRun {
                    proposed_fixes: proposed,
                },
                diagnostics,
                started_at,
            ));
        }

        if !autonomy.skips_confirmation() && !request.force {
            self.audit_event(
                AuditLevel::Info,
                "confirmation_required",
                &run_id,
                json_meta(&[("proposed_fixes", json!(proposed.len()))]),
            );
            return Ok(self.report(
                run_id,
                request.workflow_id,
                HealOutcome::ConfirmationRequired {
                    proposed_fixes: proposed,
                },
                diagnostics,
                started_at,
            ));
        }

        self.apply_and_verify(run_id, request, workflow, diagnostics, proposed, started_at)
            .await
    }

    /// The mutating tail of the pipeline: snapshot, apply, push, verify,
    /// then commit or roll back. Terminal outcomes here always record an
    /// attempt and per-action confidence history.
    async fn apply_and_verify(
        &self,
        run_id: HealRunId,
        request: HealRequest,
        workflow: WorkflowDefinition,
        diagnostics: WorkflowDiagnostics,
        fixes: Vec<ProposedFix>,
        started_at: DateTime<Utc>,
    ) -> HealResult<HealReport> {
        let workflow_id = request.workflow_id.clone();

        let snapshot = serde_json::to_value(&workflow).map_err(|e| HealError::Internal {
            message: format!("Failed to snapshot workflow: {}", e),
        })?;
        let rollback_id = self
            .rollback
            .create_rollback_point(
                RollbackAction::UpdateWorkflow,
                &workflow_id,
                snapshot,
                HashMap::from([("heal_run".to_string(), run_id.to_string())]),
            )
            .await;

        self.audit_event(
            AuditLevel::Info,
            "snapshot_created",
            &run_id,
            json_meta(&[("rollback_point_id", json!(rollback_id.to_string()))]),
        );

        let patched = self.fixes.apply_fixes(&workflow, &fixes);

        let push = self
            .retry
            .execute("update_workflow", || async {
                self.engine.update_workflow(&patched).await
            })
            .await;

        if let Err(e) = push {
            self.record_run_outcome(&workflow_id, &fixes, false).await;
            self.audit_event(
                AuditLevel::Error,
                "heal_failed",
                &run_id,
                json_meta(&[("stage", json!("push")), ("error", json!(e.to_string()))]),
            );
            return Err(e.into());
        }

        self.audit_event(
            AuditLevel::Info,
            "fixes_pushed",
            &run_id,
            json_meta(&[("applied_fixes", json!(fixes.len()))]),
        );

        match self.verify(&workflow_id).await {
            Ok(verification) => {
                self.record_run_outcome(&workflow_id, &fixes, true).await;
                self.audit_event(
                    AuditLevel::Info,
                    "heal_committed",
                    &run_id,
                    json_meta(&[
                        ("execution_id", json!(verification.execution_id)),
                        ("status", json!(verification.status)),
                    ]),
                );
                Ok(self.report(
                    run_id,
                    workflow_id,
                    HealOutcome::Healed {
                        applied_fixes: fixes,
                        rollback_point_id: rollback_id,
                        verification,
                    },
                    diagnostics,
                    started_at,
                ))
            }
            Err(test_failure) => {
                let test_failure = test_failure.to_string();
                warn!(
                    workflow_id = %workflow_id,
                    error = %test_failure,
                    "Verification failed, rolling back"
                );
                self.record_run_outcome(&workflow_id, &fixes, false).await;

                let restore = self.rollback.rollback(&rollback_id).await;
                if restore.success {
                    self.audit_event(
                        AuditLevel::Warning,
                        "heal_rolled_back",
                        &run_id,
                        json_meta(&[("test_failure", json!(test_failure))]),
                    );
                    Ok(self.report(
                        run_id,
                        workflow_id,
                        HealOutcome::RolledBack {
                            attempted_fixes: fixes,
                            rollback_point_id: rollback_id,
                            test_failure,
                        },
                        diagnostics,
                        started_at,
                    ))
                } else {
                    let rollback_error = restore
                        .error
                        .unwrap_or_else(|| "unknown rollback error".to_string());
                    self.audit_event(
                        AuditLevel::Error,
                        "rollback_failed",
                        &run_id,
                        json_meta(&[
                            ("test_failure", json!(test_failure)),
                            ("rollback_error", json!(rollback_error)),
                        ]),
                    );
                    Err(HealError::RollbackFailure {
                        test_failure,
                        rollback_error,
                    })
                }
            }
        }
    }

    /// Trigger a test run, wait, then read the newest execution back.
    ///
    /// Only an execution that explicitly reports failure fails verification;
    /// an execution still in flight after the wait is not held against the
    /// fix.
    async fn verify(&self, workflow_id: &str) -> HealResult<Verification> {
        let handle = self
            .retry
            .execute("trigger_workflow", || async {
                self.engine.trigger_workflow(workflow_id, None).await
            })
            .await
            .map_err(HealError::from)?;

        tokio::time::sleep(std::time::Duration::from_millis(
            self.config.verification_wait_ms,
        ))
        .await;

        let executions = self.fetch_executions(workflow_id).await?;
        let execution = executions
            .iter()
            .find(|e| e.id == handle.execution_id)
            .or_else(|| executions.first());

        let Some(execution) = execution else {
            return Ok(Verification {
                execution_id: Some(handle.execution_id),
                status: "pending".to_string(),
                passed: true,
            });
        };

        if execution.failed() {
            let node = execution
                .failing_node_name()
                .unwrap_or_else(|| "unknown node".to_string());
            return Err(HealError::TestFailure {
                message: format!(
                    "Execution {} failed at node '{}'",
                    execution.id, node
                ),
            });
        }

        Ok(Verification {
            execution_id: Some(execution.id.clone()),
            status: execution.status.clone(),
            passed: true,
        })
    }

    /// Diagnose a workflow without entering the heal pipeline.
    pub async fn diagnose(&self, workflow_id: &str) -> HealResult<WorkflowDiagnostics> {
        let workflow = self.fetch_workflow(workflow_id).await?;
        let executions = self.fetch_executions(workflow_id).await?;
        Ok(self.diagnostics.diagnose(&workflow, &executions))
    }

    /// Change the global autonomy level. Level 3 is refused outside a
    /// sandbox, as is any change the caller marks sandbox-only.
    pub async fn set_autonomy(
        &self,
        level: u8,
        reason: Option<&str>,
        sandbox_only: bool,
    ) -> HealResult<AutonomyLevel> {
        let parsed = AutonomyLevel::from_u8(level).ok_or_else(|| HealError::Validation {
            field: "level".to_string(),
            reason: format!("autonomy level must be 0-3, got {}", level),
        })?;

        if sandbox_only && !self.config.sandbox_mode {
            return Err(HealError::NotAllowed {
                reason: "change is marked sandbox-only and this process is not sandboxed"
                    .to_string(),
            });
        }

        if parsed == AutonomyLevel::Autonomous && !self.config.sandbox_mode {
            return Err(HealError::NotAllowed {
                reason: "autonomy level 3 requires sandbox mode".to_string(),
            });
        }

        let previous = {
            let mut autonomy = self.autonomy.write().await;
            let previous = *autonomy;
            *autonomy = parsed;
            previous
        };

        self.audit_event(
            AuditLevel::Info,
            "autonomy_changed",
            &HealRunId::new(),
            json_meta(&[
                ("previous", json!(previous.as_u8())),
                ("current", json!(parsed.as_u8())),
                ("reason", json!(reason)),
            ]),
        );
        Ok(parsed)
    }

    /// Current autonomy level.
    pub async fn autonomy(&self) -> AutonomyLevel {
        *self.autonomy.read().await
    }

    /// Snapshot the subsystem's operational state.
    pub async fn status(&self) -> HealingStatus {
        HealingStatus {
            autonomy_level: self.autonomy.read().await.as_u8(),
            sandbox_mode: self.config.sandbox_mode,
            rollback_points_retained: self.rollback.list_rollback_points().await.len(),
            rate_limit_records: self.rate_limiter.records().await,
            action_stats: self.confidence.all_stats().await,
        }
    }

    /// The rollback manager, for the tool surface.
    pub fn rollback_manager(&self) -> &Arc<RollbackManager> {
        &self.rollback
    }

    async fn fetch_workflow(&self, workflow_id: &str) -> HealResult<WorkflowDefinition> {
        // Always bypass the cache: healing decisions need current state
        self.retry
            .execute("get_workflow", || async {
                self.engine.get_workflow(workflow_id, true).await
            })
            .await
            .map_err(HealError::from)
    }

    async fn fetch_executions(&self, workflow_id: &str) -> HealResult<Vec<Execution>> {
        self.retry
            .execute("list_executions", || async {
                self.engine
                    .list_executions(workflow_id, self.config.execution_history_limit)
                    .await
            })
            .await
            .map_err(HealError::from)
    }

    async fn record_run_outcome(&self, workflow_id: &str, fixes: &[ProposedFix], success: bool) {
        self.rate_limiter.record_attempt(workflow_id, success).await;
        for fix in fixes {
            self.confidence
                .record_action_result(fix.action.as_str(), success)
                .await;
        }
    }

    fn report(
        &self,
        run_id: HealRunId,
        workflow_id: String,
        outcome: HealOutcome,
        diagnostics: WorkflowDiagnostics,
        started_at: DateTime<Utc>,
    ) -> HealReport {
        HealReport {
            run_id,
            workflow_id,
            outcome,
            diagnostics,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn audit_event(&self, level: AuditLevel, event: &str, run_id: &HealRunId, metadata: HashMap<String, Value>) {
        self.audit.record(level, event, &run_id.to_string(), metadata);
    }
}

fn json_meta(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
