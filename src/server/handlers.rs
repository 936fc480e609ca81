use serde_json::Value;
use tracing::info;

use super::SharedState;
use crate::error::{McpError, McpResult};
use crate::healing::orchestrator::{HealOutcome, HealRequest};
use crate::healing::RollbackPointId;

/// Payload of a completed tool call plus whether it reports a failure.
///
/// Some operations finish cleanly at the protocol level while still
/// describing a failed outcome (a heal run that had to be rolled back);
/// the flag lets the transport mark those as errors without discarding
/// the structured report.
#[derive(Debug)]
pub struct ToolResponse {
    /// Structured result serialized into the tool result content.
    pub payload: Value,
    /// Whether the payload describes a failed operation.
    pub is_error: bool,
}

impl ToolResponse {
    fn ok(payload: Value) -> Self {
        Self {
            payload,
            is_error: false,
        }
    }

    fn failure(payload: Value) -> Self {
        Self {
            payload,
            is_error: true,
        }
    }
}

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<ToolResponse> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        "self_heal_workflow" => handle_self_heal(state, arguments).await,
        "diagnose_workflow" => handle_diagnose(state, arguments).await.map(ToolResponse::ok),
        "set_autonomy" => handle_set_autonomy(state, arguments)
            .await
            .map(ToolResponse::ok),
        "healing_status" => handle_healing_status(state).await.map(ToolResponse::ok),
        "list_rollback_points" => handle_list_rollback_points(state)
            .await
            .map(ToolResponse::ok),
        "rollback_workflow" => handle_rollback_workflow(state, arguments)
            .await
            .map(ToolResponse::ok),
        "unblock_workflow" => handle_unblock_workflow(state, arguments)
            .await
            .map(ToolResponse::ok),
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

/// Handle self_heal_workflow tool call
async fn handle_self_heal(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<ToolResponse> {
    let request: HealRequest = parse_arguments("self_heal_workflow", arguments)?;

    let report = state
        .orchestrator
        .heal(request)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    // A rolled-back run keeps its full report but counts as a failure
    let rolled_back = matches!(report.outcome, HealOutcome::RolledBack { .. });
    let payload = serde_json::to_value(report).map_err(McpError::Json)?;

    Ok(if rolled_back {
        ToolResponse::failure(payload)
    } else {
        ToolResponse::ok(payload)
    })
}

/// Handle diagnose_workflow tool call
async fn handle_diagnose(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(serde::Deserialize)]
    struct DiagnoseParams {
        workflow_id: String,
    }

    let params: DiagnoseParams = parse_arguments("diagnose_workflow", arguments)?;

    let diagnostics = state
        .orchestrator
        .diagnose(&params.workflow_id)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    serde_json::to_value(diagnostics).map_err(McpError::Json)
}

/// Handle set_autonomy tool call
async fn handle_set_autonomy(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    #[derive(serde::Deserialize)]
    struct AutonomyParams {
        level: u8,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        sandbox_only: bool,
    }

    let params: AutonomyParams = parse_arguments("set_autonomy", arguments)?;

    let level = state
        .orchestrator
        .set_autonomy(params.level, params.reason.as_deref(), params.sandbox_only)
        .await
        .map_err(|e| McpError::ExecutionFailed {
            message: e.to_string(),
        })?;

    Ok(serde_json::json!({
        "autonomy_level": level.as_u8(),
        "description": match level.as_u8() {
            0 => "dry runs only",
            1 => "mutations require confirmation",
            2 => "safe mutations proceed unattended",
            _ => "full autonomy (sandbox)",
        }
    }))
}

/// Handle healing_status tool call
async fn handle_healing_status(state: &SharedState) -> McpResult<Value> {
    let status = state.orchestrator.status().await;
    serde_json::to_value(status).map_err(McpError::Json)
}

/// Handle list_rollback_points tool call
async fn handle_list_rollback_points(state: &SharedState) -> McpResult<Value> {
    let points = state
        .orchestrator
        .rollback_manager()
        .list_rollback_points()
        .await;

    // Snapshots are omitted from the listing; they can be large
    let summaries: Vec<Value> = points
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id.to_string(),
                "action": p.action.as_str(),
                "resource_id": p.resource_id,
                "timestamp": p.timestamp,
                "metadata": p.metadata,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "count": summaries.len(),
        "rollback_points": summaries,
    }))
}

/// Handle rollback_workflow tool call
async fn handle_rollback_workflow(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    #[derive(serde::Deserialize)]
    struct RollbackParams {
        rollback_point_id: String,
    }

    let params: RollbackParams = parse_arguments("rollback_workflow", arguments)?;
    let id = RollbackPointId(params.rollback_point_id);

    // Failures come back as data with a success flag, never as an error
    let result = state.orchestrator.rollback_manager().rollback(&id).await;
    serde_json::to_value(result).map_err(McpError::Json)
}

/// Handle unblock_workflow tool call
async fn handle_unblock_workflow(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    #[derive(serde::Deserialize)]
    struct UnblockParams {
        workflow_id: String,
    }

    let params: UnblockParams = parse_arguments("unblock_workflow", arguments)?;
    let unblocked = state.rate_limiter.unblock(&params.workflow_id).await;

    Ok(serde_json::json!({
        "workflow_id": params.workflow_id,
        "unblocked": unblocked,
    }))
}

// ============================================================================
// Helper functions
// ============================================================================

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}
