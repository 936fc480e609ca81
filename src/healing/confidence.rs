//! Confidence scoring engine.
//!
//! Produces a weighted 0-100 composite estimating how safe a proposed action
//! is to take unattended, from four factors:
//!
//! - **Autonomy** (weight 0.30): the current autonomy level
//! - **Action risk** (weight 0.25): inverse of a static risk-class table
//! - **Historical success** (weight 0.25): per-action-type running counters
//! - **Contextual relevance** (weight 0.20): bonuses for a concrete target
//!   and supporting metadata
//!
//! Scoring never fails; unknown action types fall back to neutral risk.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use super::types::{ActionStats, AutonomyLevel, ConfidenceFactors, ConfidenceScore};

const WEIGHT_AUTONOMY: f64 = 0.30;
const WEIGHT_RISK: f64 = 0.25;
const WEIGHT_HISTORY: f64 = 0.25;
const WEIGHT_CONTEXT: f64 = 0.20;

/// Historical factor when no samples exist yet.
const NEUTRAL_HISTORY: u32 = 60;
/// Risk factor for action types missing from the table.
const NEUTRAL_RISK: u32 = 60;

/// Supporting context supplied with a scoring request.
#[derive(Debug, Clone, Default)]
pub struct ScoreContext {
    /// Concrete resource the action targets, if known.
    pub target_resource: Option<String>,
    /// Arbitrary supporting metadata.
    pub metadata: HashMap<String, String>,
}

/// Inverse risk lookup: safer action classes score higher.
fn action_risk_factor(action: &str) -> u32 {
    match action {
        // low risk
        "enable_node" | "trigger_workflow" | "diagnose_workflow" => 100,
        // medium risk
        "update_settings" | "update_node" | "rollback_workflow" => 70,
        // high risk
        "update_workflow" | "stop_execution" => 40,
        // critical risk
        "delete_workflow" => 20,
        _ => NEUTRAL_RISK,
    }
}

/// Computes confidence scores and tracks per-action-type outcomes.
pub struct ConfidenceEngine {
    history: RwLock<HashMap<String, ActionStats>>,
}

impl ConfidenceEngine {
    /// Create a new engine with empty history.
    pub fn new() -> Self {
        Self {
            history: RwLock::new(HashMap::new()),
        }
    }

    /// Compute the composite confidence score for an action.
    pub async fn calculate_score(
        &self,
        action: &str,
        autonomy: AutonomyLevel,
        context: Option<&ScoreContext>,
    ) -> ConfidenceScore {
        let autonomy_level = autonomy.confidence_factor();
        let action_risk = action_risk_factor(action);
        let historical_success = self.historical_factor(action).await;
        let contextual_relevance = contextual_factor(context);

        let raw = WEIGHT_AUTONOMY * autonomy_level as f64
            + WEIGHT_RISK * action_risk as f64
            + WEIGHT_HISTORY * historical_success as f64
            + WEIGHT_CONTEXT * contextual_relevance as f64;

        let score = (raw.round() as i64).clamp(0, 100) as u32;

        debug!(
            action = action,
            score = score,
            autonomy = autonomy_level,
            risk = action_risk,
            history = historical_success,
            context = contextual_relevance,
            "Calculated confidence score"
        );

        ConfidenceScore {
            score,
            factors: ConfidenceFactors {
                autonomy_level,
                action_risk,
                historical_success,
                contextual_relevance,
            },
        }
    }

    /// Record the terminal outcome of a scored action.
    ///
    /// Must be called exactly once per terminal outcome.
    pub async fn record_action_result(&self, action: &str, success: bool) {
        let mut history = self.history.write().await;
        let stats = history.entry(action.to_string()).or_default();
        stats.total_count += 1;
        if success {
            stats.success_count += 1;
        }
        debug!(
            action = action,
            success = success,
            successes = stats.success_count,
            total = stats.total_count,
            "Recorded action result"
        );
    }

    /// Get the running counters for one action type.
    pub async fn get_action_stats(&self, action: &str) -> ActionStats {
        self.history
            .read()
            .await
            .get(action)
            .copied()
            .unwrap_or_default()
    }

    /// Snapshot of all tracked action counters.
    pub async fn all_stats(&self) -> HashMap<String, ActionStats> {
        self.history.read().await.clone()
    }

    async fn historical_factor(&self, action: &str) -> u32 {
        let history = self.history.read().await;
        match history.get(action) {
            Some(stats) if stats.total_count > 0 => {
                let rate = stats.success_count as f64 / stats.total_count as f64;
                (rate * 100.0).round() as u32
            }
            _ => NEUTRAL_HISTORY,
        }
    }
}

impl Default for ConfidenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn contextual_factor(context: Option<&ScoreContext>) -> u32 {
    let mut factor = 50u32;
    if let Some(ctx) = context {
        if ctx.target_resource.is_some() {
            factor += 25;
        }
        if !ctx.metadata.is_empty() {
            factor += 25;
        }
    }
    factor.min(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with_target() -> ScoreContext {
        ScoreContext {
            target_resource: Some("wf-1".to_string()),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_score_in_range() {
        let engine = ConfidenceEngine::new();
        for action in ["enable_node", "delete_workflow", "totally_unknown"] {
            for level in 0..=3u8 {
                let autonomy = AutonomyLevel::from_u8(level).unwrap();
                let score = engine.calculate_score(action, autonomy, None).await;
                assert!(score.score <= 100);
            }
        }
    }

    #[tokio::test]
    async fn test_neutral_history_without_samples() {
        let engine = ConfidenceEngine::new();
        let score = engine
            .calculate_score("enable_node", AutonomyLevel::Assisted, None)
            .await;
        assert_eq!(score.factors.historical_success, 60);
    }

    #[tokio::test]
    async fn test_history_tracks_outcomes() {
        let engine = ConfidenceEngine::new();
        engine.record_action_result("enable_node", true).await;
        engine.record_action_result("enable_node", true).await;
        engine.record_action_result("enable_node", false).await;

        let stats = engine.get_action_stats("enable_node").await;
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.total_count, 3);

        let score = engine
            .calculate_score("enable_node", AutonomyLevel::Assisted, None)
            .await;
        assert_eq!(score.factors.historical_success, 67);
    }

    #[tokio::test]
    async fn test_score_increases_with_history() {
        let engine = ConfidenceEngine::new();
        let before = engine
            .calculate_score("enable_node", AutonomyLevel::Supervised, None)
            .await;

        // Perfect history beats the neutral 60
        for _ in 0..5 {
            engine.record_action_result("enable_node", true).await;
        }

        let after = engine
            .calculate_score("enable_node", AutonomyLevel::Supervised, None)
            .await;

        assert_eq!(after.factors.historical_success, 100);
        assert!(after.score > before.score);
    }

    #[tokio::test]
    async fn test_contextual_bonuses() {
        let engine = ConfidenceEngine::new();

        let bare = engine
            .calculate_score("enable_node", AutonomyLevel::Assisted, None)
            .await;
        assert_eq!(bare.factors.contextual_relevance, 50);

        let ctx = context_with_target();
        let with_target = engine
            .calculate_score("enable_node", AutonomyLevel::Assisted, Some(&ctx))
            .await;
        assert_eq!(with_target.factors.contextual_relevance, 75);

        let mut full = context_with_target();
        full.metadata
            .insert("issue".to_string(), "disabled_node".to_string());
        let with_both = engine
            .calculate_score("enable_node", AutonomyLevel::Assisted, Some(&full))
            .await;
        assert_eq!(with_both.factors.contextual_relevance, 100);
    }

    #[tokio::test]
    async fn test_unknown_action_neutral_risk() {
        let engine = ConfidenceEngine::new();
        let score = engine
            .calculate_score("mystery_action", AutonomyLevel::Assisted, None)
            .await;
        assert_eq!(score.factors.action_risk, 60);
    }

    #[tokio::test]
    async fn test_weighted_composite_value() {
        let engine = ConfidenceEngine::new();
        // autonomy 40, risk 100, history 60 (neutral), context 50
        let score = engine
            .calculate_score("enable_node", AutonomyLevel::Assisted, None)
            .await;
        let expected =
            (0.30 * 40.0 + 0.25 * 100.0 + 0.25 * 60.0 + 0.20 * 50.0_f64).round() as u32;
        assert_eq!(score.score, expected);
    }
}
