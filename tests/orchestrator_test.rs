//! End-to-end tests for the heal pipeline against a scripted engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use mcp_workflow_healer::config::{
    Config, EngineConfig, HealingConfig, LogFormat, LoggingConfig, RequestConfig,
};
use mcp_workflow_healer::engine::{
    ConnectionTarget, EngineClient, Execution, ExecutionError, ExecutionHandle, NodeConnections,
    WorkflowDefinition, WorkflowNode,
};
use mcp_workflow_healer::error::{EngineResult, HealError};
use mcp_workflow_healer::healing::orchestrator::{HealOutcome, HealRequest};
use mcp_workflow_healer::healing::{
    ConfidenceEngine, RateLimiter, RetryExecutor, RollbackManager, SelfHealOrchestrator,
    TracingAuditSink,
};
use mcp_workflow_healer::server::{handle_tool_call, AppState};

/// Engine stub driven by the test: serves a workflow, accepts updates, and
/// reports a scripted verification execution after the first trigger.
struct ScriptedEngine {
    workflow: Mutex<WorkflowDefinition>,
    /// When false, updates are acknowledged but the served workflow keeps
    /// its original defects, so every heal run finds work to do.
    persist_updates: bool,
    verification_fails: bool,
    update_calls: AtomicU32,
    trigger_calls: AtomicU32,
}

impl ScriptedEngine {
    fn new(workflow: WorkflowDefinition) -> Self {
        Self {
            workflow: Mutex::new(workflow),
            persist_updates: true,
            verification_fails: false,
            update_calls: AtomicU32::new(0),
            trigger_calls: AtomicU32::new(0),
        }
    }

    fn failing_verification(workflow: WorkflowDefinition) -> Self {
        Self {
            verification_fails: true,
            ..Self::new(workflow)
        }
    }

    fn always_broken(workflow: WorkflowDefinition) -> Self {
        Self {
            persist_updates: false,
            ..Self::new(workflow)
        }
    }
}

#[async_trait]
impl EngineClient for ScriptedEngine {
    async fn get_workflow(&self, _id: &str, _force_refresh: bool) -> EngineResult<WorkflowDefinition> {
        Ok(self.workflow.lock().await.clone())
    }

    async fn update_workflow(
        &self,
        workflow: &WorkflowDefinition,
    ) -> EngineResult<WorkflowDefinition> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.persist_updates {
            *self.workflow.lock().await = workflow.clone();
        }
        Ok(workflow.clone())
    }

    async fn delete_workflow(&self, _id: &str) -> EngineResult<()> {
        Ok(())
    }

    async fn list_executions(&self, workflow_id: &str, _limit: u32) -> EngineResult<Vec<Execution>> {
        // No history before the verification trigger
        if self.trigger_calls.load(Ordering::SeqCst) == 0 {
            return Ok(vec![]);
        }

        let execution = if self.verification_fails {
            Execution {
                id: "exec-1".to_string(),
                workflow_id: workflow_id.to_string(),
                finished: true,
                status: "error".to_string(),
                started_at: None,
                stopped_at: None,
                error: Some(ExecutionError {
                    message: "Node crashed".to_string(),
                    node_name: Some("Transform".to_string()),
                }),
            }
        } else {
            Execution {
                id: "exec-1".to_string(),
                workflow_id: workflow_id.to_string(),
                finished: true,
                status: "success".to_string(),
                started_at: None,
                stopped_at: None,
                error: None,
            }
        };
        Ok(vec![execution])
    }

    async fn trigger_workflow(
        &self,
        _id: &str,
        _payload: Option<Value>,
    ) -> EngineResult<ExecutionHandle> {
        self.trigger_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutionHandle {
            execution_id: "exec-1".to_string(),
            status: "running".to_string(),
        })
    }

    async fn stop_execution(&self, _execution_id: &str) -> EngineResult<()> {
        Ok(())
    }
}

fn node(id: &str, name: &str, node_type: &str, disabled: bool) -> WorkflowNode {
    WorkflowNode {
        id: id.to_string(),
        name: name.to_string(),
        node_type: node_type.to_string(),
        disabled,
        parameters: json!({}),
        credentials: None,
    }
}

/// A workflow with exactly one disabled node and no other defects.
fn workflow_with_disabled_node() -> WorkflowDefinition {
    let mut connections = HashMap::new();
    connections.insert(
        "Trigger".to_string(),
        NodeConnections {
            main: vec![vec![ConnectionTarget {
                node: "Transform".to_string(),
                connection_type: "main".to_string(),
                index: 0,
            }]],
        },
    );

    WorkflowDefinition {
        id: "wf-1".to_string(),
        name: "Order sync".to_string(),
        active: true,
        nodes: vec![
            node("n1", "Trigger", "n8n-nodes-base.webhook", false),
            node("n2", "Transform", "n8n-nodes-base.set", true),
        ],
        connections,
        settings: None,
    }
}

fn healthy_workflow() -> WorkflowDefinition {
    let mut wf = workflow_with_disabled_node();
    wf.nodes[1].disabled = false;
    wf
}

fn test_config(default_autonomy: u8) -> HealingConfig {
    HealingConfig {
        verification_wait_ms: 1,
        default_autonomy,
        ..HealingConfig::default()
    }
}

fn build_orchestrator(
    engine: Arc<ScriptedEngine>,
    config: HealingConfig,
) -> SelfHealOrchestrator {
    let retry = RetryExecutor::new(&RequestConfig {
        initial_delay_ms: 1,
        max_delay_ms: 2,
        ..RequestConfig::default()
    });
    let rollback = Arc::new(RollbackManager::new(
        Arc::clone(&engine) as Arc<dyn EngineClient>,
        retry.clone(),
        config.rollback_capacity,
    ));
    SelfHealOrchestrator::new(
        engine,
        Arc::new(ConfidenceEngine::new()),
        Arc::new(RateLimiter::new(&config)),
        rollback,
        retry,
        Arc::new(TracingAuditSink::new()),
        config,
    )
}

fn heal_request(dry_run: bool) -> HealRequest {
    HealRequest {
        workflow_id: "wf-1".to_string(),
        force: false,
        dry_run,
        max_fixes: None,
        skip_rate_limit_check: false,
    }
}

#[tokio::test]
async fn heal_enables_disabled_node_and_verifies() {
    let engine = Arc::new(ScriptedEngine::new(workflow_with_disabled_node()));
    let orchestrator = build_orchestrator(Arc::clone(&engine), test_config(2));

    let report = orchestrator.heal(heal_request(false)).await.unwrap();

    match report.outcome {
        HealOutcome::Healed {
            applied_fixes,
            verification,
            ..
        } => {
            assert_eq!(applied_fixes.len(), 1);
            assert_eq!(applied_fixes[0].node_id, "n2");
            assert!(verification.passed);
        }
        other => panic!("expected Healed, got {:?}", other),
    }

    // One push, no restore
    assert_eq!(engine.update_calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.trigger_calls.load(Ordering::SeqCst), 1);
    assert!(!engine.workflow.lock().await.nodes[1].disabled);
}

#[tokio::test]
async fn healthy_workflow_is_left_untouched() {
    let engine = Arc::new(ScriptedEngine::new(healthy_workflow()));
    let orchestrator = build_orchestrator(Arc::clone(&engine), test_config(2));

    let report = orchestrator.heal(heal_request(false)).await.unwrap();

    assert!(matches!(report.outcome, HealOutcome::Healthy));
    assert_eq!(engine.update_calls.load(Ordering::SeqCst), 0);
    assert_eq!(engine.trigger_calls.load(Ordering::SeqCst), 0);

    // A healthy run consumes no attempt budget
    let status = orchestrator.status().await;
    assert!(status.rate_limit_records.is_empty());
}

#[tokio::test]
async fn dry_run_proposes_without_mutating() {
    let engine = Arc::new(ScriptedEngine::new(workflow_with_disabled_node()));
    let orchestrator = build_orchestrator(Arc::clone(&engine), test_config(2));

    let report = orchestrator.heal(heal_request(true)).await.unwrap();

    match report.outcome {
        HealOutcome::DryRun { proposed_fixes } => {
            assert_eq!(proposed_fixes.len(), 1);
            assert_eq!(proposed_fixes[0].node_name, "Transform");
        }
        other => panic!("expected DryRun, got {:?}", other),
    }

    assert_eq!(engine.update_calls.load(Ordering::SeqCst), 0);
    assert!(engine.workflow.lock().await.nodes[1].disabled);

    let status = orchestrator.status().await;
    assert!(status.rate_limit_records.is_empty());
}

#[tokio::test]
async fn failed_verification_rolls_back() {
    let engine = Arc::new(ScriptedEngine::failing_verification(
        workflow_with_disabled_node(),
    ));
    let orchestrator = build_orchestrator(Arc::clone(&engine), test_config(2));

    let report = orchestrator.heal(heal_request(false)).await.unwrap();

    match report.outcome {
        HealOutcome::RolledBack {
            attempted_fixes,
            test_failure,
            ..
        } => {
            assert_eq!(attempted_fixes.len(), 1);
            assert!(test_failure.contains("Transform"));
        }
        other => panic!("expected RolledBack, got {:?}", other),
    }

    // Push plus restore
    assert_eq!(engine.update_calls.load(Ordering::SeqCst), 2);
    // The restore re-installed the pre-mutation snapshot
    assert!(engine.workflow.lock().await.nodes[1].disabled);
}

#[tokio::test]
async fn two_consecutive_failures_trip_the_circuit() {
    let engine = Arc::new(ScriptedEngine::failing_verification(
        workflow_with_disabled_node(),
    ));
    let orchestrator = build_orchestrator(Arc::clone(&engine), test_config(2));

    for _ in 0..2 {
        let report = orchestrator.heal(heal_request(false)).await.unwrap();
        assert!(matches!(report.outcome, HealOutcome::RolledBack { .. }));
    }

    let err = orchestrator.heal(heal_request(false)).await.unwrap_err();
    match err {
        HealError::RateLimited { reason } => {
            assert!(
                reason.contains("2 consecutive failures"),
                "unexpected reason: {}",
                reason
            );
        }
        other => panic!("expected RateLimited, got {:?}", other),
    }
}

#[tokio::test]
async fn blocked_workflow_is_denied_dry_runs_too() {
    let engine = Arc::new(ScriptedEngine::failing_verification(
        workflow_with_disabled_node(),
    ));
    let orchestrator = build_orchestrator(Arc::clone(&engine), test_config(2));

    for _ in 0..2 {
        orchestrator.heal(heal_request(false)).await.unwrap();
    }

    // The gate applies before the dry-run short circuit
    let err = orchestrator.heal(heal_request(true)).await.unwrap_err();
    assert!(matches!(err, HealError::RateLimited { .. }));

    // Dry runs still never consume budget: the two recorded attempts are
    // the real runs above
    let status = orchestrator.status().await;
    assert_eq!(status.rate_limit_records[0].attempts.len(), 2);
}

#[tokio::test]
async fn window_cap_denies_after_three_attempts() {
    // Updates never persist, so each run finds the same defect and succeeds
    let engine = Arc::new(ScriptedEngine::always_broken(workflow_with_disabled_node()));
    let orchestrator = build_orchestrator(Arc::clone(&engine), test_config(2));

    for _ in 0..3 {
        let report = orchestrator.heal(heal_request(false)).await.unwrap();
        assert!(matches!(report.outcome, HealOutcome::Healed { .. }));
    }

    let err = orchestrator.heal(heal_request(false)).await.unwrap_err();
    match err {
        HealError::RateLimited { reason } => {
            assert!(
                reason.contains("3 attempts per hour"),
                "unexpected reason: {}",
                reason
            );
        }
        other => panic!("expected RateLimited, got {:?}", other),
    }
}

#[tokio::test]
async fn rate_limit_gate_can_be_skipped_by_operator() {
    let engine = Arc::new(ScriptedEngine::always_broken(workflow_with_disabled_node()));
    let orchestrator = build_orchestrator(Arc::clone(&engine), test_config(2));

    for _ in 0..3 {
        orchestrator.heal(heal_request(false)).await.unwrap();
    }

    let request = HealRequest {
        skip_rate_limit_check: true,
        ..heal_request(false)
    };
    let report = orchestrator.heal(request).await.unwrap();
    assert!(matches!(report.outcome, HealOutcome::Healed { .. }));
}

#[tokio::test]
async fn manual_autonomy_rejects_real_runs_but_allows_dry_runs() {
    let engine = Arc::new(ScriptedEngine::new(workflow_with_disabled_node()));
    let orchestrator = build_orchestrator(Arc::clone(&engine), test_config(0));

    let err = orchestrator.heal(heal_request(false)).await.unwrap_err();
    assert!(matches!(err, HealError::NotAllowed { .. }));

    let report = orchestrator.heal(heal_request(true)).await.unwrap();
    assert!(matches!(report.outcome, HealOutcome::DryRun { .. }));
}

#[tokio::test]
async fn assisted_autonomy_requires_confirmation() {
    let engine = Arc::new(ScriptedEngine::new(workflow_with_disabled_node()));
    let orchestrator = build_orchestrator(Arc::clone(&engine), test_config(1));

    let report = orchestrator.heal(heal_request(false)).await.unwrap();
    match report.outcome {
        HealOutcome::ConfirmationRequired { proposed_fixes } => {
            assert_eq!(proposed_fixes.len(), 1);
        }
        other => panic!("expected ConfirmationRequired, got {:?}", other),
    }
    assert_eq!(engine.update_calls.load(Ordering::SeqCst), 0);

    let confirmed = HealRequest {
        force: true,
        ..heal_request(false)
    };
    let report = orchestrator.heal(confirmed).await.unwrap();
    assert!(matches!(report.outcome, HealOutcome::Healed { .. }));
}

#[tokio::test]
async fn autonomy_three_requires_sandbox() {
    let engine = Arc::new(ScriptedEngine::new(healthy_workflow()));
    let orchestrator = build_orchestrator(engine, test_config(1));

    let err = orchestrator.set_autonomy(3, None, false).await.unwrap_err();
    assert!(matches!(err, HealError::NotAllowed { .. }));

    let err = orchestrator.set_autonomy(7, None, false).await.unwrap_err();
    assert!(matches!(err, HealError::Validation { .. }));

    let level = orchestrator
        .set_autonomy(2, Some("scheduled maintenance window"), false)
        .await
        .unwrap();
    assert_eq!(level.as_u8(), 2);
    assert_eq!(orchestrator.autonomy().await.as_u8(), 2);
}

#[tokio::test]
async fn sandbox_only_change_refused_outside_sandbox() {
    let engine = Arc::new(ScriptedEngine::new(healthy_workflow()));
    let orchestrator = build_orchestrator(engine, test_config(1));

    let err = orchestrator.set_autonomy(2, None, true).await.unwrap_err();
    assert!(matches!(err, HealError::NotAllowed { .. }));
    // The refused change left the level alone
    assert_eq!(orchestrator.autonomy().await.as_u8(), 1);
}

#[tokio::test]
async fn sandbox_mode_allows_full_autonomy() {
    let engine = Arc::new(ScriptedEngine::new(healthy_workflow()));
    let config = HealingConfig {
        sandbox_mode: true,
        ..test_config(1)
    };
    let orchestrator = build_orchestrator(engine, config);

    let level = orchestrator
        .set_autonomy(3, Some("chaos drill"), true)
        .await
        .unwrap();
    assert_eq!(level.as_u8(), 3);
}

#[tokio::test]
async fn successful_run_records_confidence_history() {
    let engine = Arc::new(ScriptedEngine::new(workflow_with_disabled_node()));
    let orchestrator = build_orchestrator(engine, test_config(2));

    orchestrator.heal(heal_request(false)).await.unwrap();

    let status = orchestrator.status().await;
    let stats = status
        .action_stats
        .get("enable_node")
        .expect("enable_node stats recorded");
    assert_eq!(stats.total_count, 1);
    assert_eq!(stats.success_count, 1);
    assert_eq!(status.rollback_points_retained, 1);
}

fn app_state(engine: Arc<ScriptedEngine>, default_autonomy: u8) -> Arc<AppState> {
    let config = Config {
        engine: EngineConfig {
            base_url: "http://localhost:5678".to_string(),
            api_key: "test-key".to_string(),
        },
        request: RequestConfig {
            initial_delay_ms: 1,
            max_delay_ms: 2,
            ..RequestConfig::default()
        },
        healing: test_config(default_autonomy),
        logging: LoggingConfig {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        },
    };
    Arc::new(AppState::new(config, engine))
}

#[tokio::test]
async fn rolled_back_tool_call_carries_the_error_flag() {
    let engine = Arc::new(ScriptedEngine::failing_verification(
        workflow_with_disabled_node(),
    ));
    let state = app_state(engine, 2);

    let response = handle_tool_call(
        &state,
        "self_heal_workflow",
        Some(json!({ "workflow_id": "wf-1" })),
    )
    .await
    .unwrap();

    // The run is reported as a failure while keeping the full report
    assert!(response.is_error);
    assert_eq!(response.payload["outcome"], json!("rolled_back"));
    assert!(response.payload["test_failure"]
        .as_str()
        .unwrap()
        .contains("Transform"));
}

#[tokio::test]
async fn healed_tool_call_is_not_flagged_as_error() {
    let engine = Arc::new(ScriptedEngine::new(workflow_with_disabled_node()));
    let state = app_state(engine, 2);

    let response = handle_tool_call(
        &state,
        "self_heal_workflow",
        Some(json!({ "workflow_id": "wf-1" })),
    )
    .await
    .unwrap();

    assert!(!response.is_error);
    assert_eq!(response.payload["outcome"], json!("healed"));
}

#[tokio::test]
async fn diagnose_reports_without_mutation() {
    let engine = Arc::new(ScriptedEngine::new(workflow_with_disabled_node()));
    let orchestrator = build_orchestrator(Arc::clone(&engine), test_config(2));

    let diagnostics = orchestrator.diagnose("wf-1").await.unwrap();
    assert_eq!(diagnostics.health_score, 95);
    assert_eq!(diagnostics.fixable_issues_count, 1);
    assert_eq!(engine.update_calls.load(Ordering::SeqCst), 0);
}
