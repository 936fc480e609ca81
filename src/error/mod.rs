use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Heal error: {0}")]
    Heal(#[from] HealError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Workflow engine API errors.
///
/// Retryability is decided from the structure of the error (status class,
/// transport failure kind), never from message text.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine unauthorized (401): {message}")]
    Unauthorized { message: String },

    #[error("Engine resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Engine rejected request: {message}")]
    Validation { message: String },

    #[error("Engine API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Engine request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Invalid engine response: {message}")]
    InvalidResponse { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EngineError {
    /// Whether a retry of the failed call could plausibly succeed.
    ///
    /// Timeouts, connection failures, and 5xx responses are transient;
    /// auth failures, missing resources, and validation rejections are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Timeout { .. } => true,
            EngineError::Api { status, .. } => *status >= 500,
            EngineError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            EngineError::Unauthorized { .. }
            | EngineError::NotFound { .. }
            | EngineError::Validation { .. }
            | EngineError::InvalidResponse { .. } => false,
        }
    }
}

/// Self-healing pipeline errors.
#[derive(Debug, Error)]
pub enum HealError {
    #[error("Action not allowed: {reason}")]
    NotAllowed { reason: String },

    #[error("Rate limited: {reason}")]
    RateLimited { reason: String },

    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Upstream call '{operation}' failed after {attempts} attempt(s): {source}")]
    Upstream {
        operation: String,
        attempts: u32,
        #[source]
        source: EngineError,
    },

    #[error("Verification test run failed: {message}")]
    TestFailure { message: String },

    #[error("Rollback failed: {rollback_error} (original test failure: {test_failure})")]
    RollbackFailure {
        test_failure: String,
        rollback_error: String,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<HealError> for McpError {
    fn from(err: HealError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Result type alias for healing operations
pub type HealResult<T> = Result<T, HealError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;
