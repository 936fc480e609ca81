//! Rollback point store and restore dispatch.
//!
//! Keeps a bounded, keyed set of opaque pre-mutation snapshots. Restores go
//! back through the engine client wrapped by the retry executor; a rollback
//! is deleted on successful restore and retained on failure so an operator
//! can retry manually. Lookup misses and restore failures are reported as
//! data, never as panics or propagated errors.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::retry::RetryExecutor;
use super::types::{RollbackAction, RollbackPoint, RollbackPointId, RollbackResult};
use crate::engine::{EngineClient, WorkflowDefinition};

/// Bounded keyed store of rollback points plus the restore routines.
pub struct RollbackManager {
    engine: Arc<dyn EngineClient>,
    retry: RetryExecutor,
    capacity: usize,
    points: RwLock<HashMap<RollbackPointId, RollbackPoint>>,
}

impl RollbackManager {
    /// Create a manager restoring through the given engine client.
    pub fn new(engine: Arc<dyn EngineClient>, retry: RetryExecutor, capacity: usize) -> Self {
        Self {
            engine,
            retry,
            capacity,
            points: RwLock::new(HashMap::new()),
        }
    }

    /// Store a pre-mutation snapshot, evicting the oldest points if the
    /// store exceeds capacity.
    pub async fn create_rollback_point(
        &self,
        action: RollbackAction,
        resource_id: &str,
        snapshot: Value,
        metadata: HashMap<String, String>,
    ) -> RollbackPointId {
        let id = RollbackPointId::new();
        let point = RollbackPoint {
            id: id.clone(),
            action,
            resource_id: resource_id.to_string(),
            timestamp: Utc::now(),
            snapshot,
            metadata,
        };

        let mut points = self.points.write().await;
        points.insert(id.clone(), point);

        while points.len() > self.capacity {
            let oldest = points
                .values()
                .min_by_key(|p| p.timestamp)
                .map(|p| p.id.clone());
            match oldest {
                Some(old_id) => {
                    points.remove(&old_id);
                    info!(rollback_id = %old_id, "Evicted oldest rollback point");
                }
                None => break,
            }
        }

        info!(
            rollback_id = %id,
            resource_id = resource_id,
            action = action.as_str(),
            "Created rollback point"
        );

        id
    }

    /// Execute a rollback. Absent ids and restore failures both come back
    /// as unsuccessful results.
    pub async fn rollback(&self, id: &RollbackPointId) -> RollbackResult {
        let point = match self.points.read().await.get(id).cloned() {
            Some(p) => p,
            None => {
                return RollbackResult {
                    success: false,
                    timestamp: Utc::now(),
                    error: Some(format!("Rollback point not found: {}", id)),
                };
            }
        };

        let restore = match point.action {
            RollbackAction::UpdateWorkflow => self.restore_update(&point).await,
            RollbackAction::CreateWorkflow => self.restore_create(&point).await,
        };

        match restore {
            Ok(()) => {
                self.points.write().await.remove(id);
                info!(
                    rollback_id = %id,
                    resource_id = %point.resource_id,
                    "Rollback succeeded, point deleted"
                );
                RollbackResult {
                    success: true,
                    timestamp: Utc::now(),
                    error: None,
                }
            }
            Err(message) => {
                // Point retained for a manual retry
                warn!(
                    rollback_id = %id,
                    resource_id = %point.resource_id,
                    error = %message,
                    "Rollback failed, point retained"
                );
                RollbackResult {
                    success: false,
                    timestamp: Utc::now(),
                    error: Some(message),
                }
            }
        }
    }

    /// Look up a rollback point by id.
    pub async fn get_rollback_point(&self, id: &RollbackPointId) -> Option<RollbackPoint> {
        self.points.read().await.get(id).cloned()
    }

    /// All retained rollback points, newest first.
    pub async fn list_rollback_points(&self) -> Vec<RollbackPoint> {
        let mut points: Vec<RollbackPoint> = self.points.read().await.values().cloned().collect();
        points.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        points
    }

    /// Delete a rollback point manually.
    pub async fn delete_rollback_point(&self, id: &RollbackPointId) -> bool {
        self.points.write().await.remove(id).is_some()
    }

    /// Re-issue an update with the snapshot payload.
    async fn restore_update(&self, point: &RollbackPoint) -> Result<(), String> {
        let workflow: WorkflowDefinition = serde_json::from_value(point.snapshot.clone())
            .map_err(|e| format!("Snapshot is not a workflow definition: {}", e))?;

        self.retry
            .execute("rollback_update_workflow", || async {
                self.engine.update_workflow(&workflow).await
            })
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// Delete a resource that was newly created by the rolled-back action.
    async fn restore_create(&self, point: &RollbackPoint) -> Result<(), String> {
        self.retry
            .execute("rollback_delete_workflow", || async {
                self.engine.delete_workflow(&point.resource_id).await
            })
            .await
            .map_err(|e| e.to_string())
    }
}
