//! Server module for MCP protocol handling.
//!
//! Provides the stdio JSON-RPC server, tool routing, and the shared
//! application state that wires the healing subsystem together.

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::config::Config;
use crate::engine::EngineClient;
use crate::healing::{
    ConfidenceEngine, RateLimiter, RetryExecutor, RollbackManager, SelfHealOrchestrator,
    TracingAuditSink,
};

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Per-workflow rate limiter, shared with the orchestrator.
    pub rate_limiter: Arc<RateLimiter>,
    /// The healing pipeline.
    pub orchestrator: Arc<SelfHealOrchestrator>,
}

impl AppState {
    /// Wire the healing subsystem around an engine client.
    pub fn new(config: Config, engine: Arc<dyn EngineClient>) -> Self {
        let retry = RetryExecutor::new(&config.request);
        let confidence = Arc::new(ConfidenceEngine::new());
        let rate_limiter = Arc::new(RateLimiter::new(&config.healing));
        let rollback = Arc::new(RollbackManager::new(
            Arc::clone(&engine),
            retry.clone(),
            config.healing.rollback_capacity,
        ));

        let orchestrator = Arc::new(SelfHealOrchestrator::new(
            engine,
            confidence,
            Arc::clone(&rate_limiter),
            rollback,
            retry,
            Arc::new(TracingAuditSink::new()),
            config.healing.clone(),
        ));

        Self {
            config,
            rate_limiter,
            orchestrator,
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;
