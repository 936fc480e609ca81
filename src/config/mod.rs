use std::env;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub engine: EngineConfig,
    pub request: RequestConfig,
    pub healing: HealingConfig,
    pub logging: LoggingConfig,
}

/// Workflow engine API configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_url: String,
    pub api_key: String,
}

/// HTTP request and retry configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

/// Self-healing loop configuration
#[derive(Debug, Clone)]
pub struct HealingConfig {
    /// Maximum fixes applied in one heal run
    pub max_fixes_per_run: usize,
    /// Sliding window for the per-workflow attempt cap
    pub rate_limit_window_secs: u64,
    /// Maximum heal attempts per workflow within the window
    pub max_attempts_per_window: u32,
    /// Consecutive failures before the circuit blocks a workflow
    pub consecutive_failure_threshold: u32,
    /// Interval between stale-record sweeps
    pub sweep_interval_secs: u64,
    /// Rate-limit records idle longer than this are evicted
    pub record_ttl_secs: u64,
    /// Maximum retained rollback points
    pub rollback_capacity: usize,
    /// Timeout merged into HTTP nodes that lack one, in milliseconds
    pub default_node_timeout_ms: u64,
    /// Wait between pushing a fix and reading the verification execution
    pub verification_wait_ms: u64,
    /// Executions fetched per diagnosis
    pub execution_history_limit: u32,
    /// Autonomy level at process start (0-3)
    pub default_autonomy: u8,
    /// Whether this process runs in a sandbox (required for autonomy 3)
    pub sandbox_mode: bool,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let engine = EngineConfig {
            base_url: env::var("ENGINE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5678".to_string()),
            api_key: env::var("ENGINE_API_KEY").map_err(|_| AppError::Config {
                message: "ENGINE_API_KEY is required".to_string(),
            })?,
        };

        let request = RequestConfig {
            timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 30000),
            max_retries: env_parse("MAX_RETRIES", 3),
            initial_delay_ms: env_parse("RETRY_INITIAL_DELAY_MS", 1000),
            backoff_multiplier: env_parse("RETRY_BACKOFF_MULTIPLIER", 2.0),
            max_delay_ms: env_parse("RETRY_MAX_DELAY_MS", 10000),
        };

        let healing = HealingConfig {
            max_fixes_per_run: env_parse("HEAL_MAX_FIXES_PER_RUN", 5),
            rate_limit_window_secs: env_parse("HEAL_RATE_WINDOW_SECS", 3600),
            max_attempts_per_window: env_parse("HEAL_MAX_ATTEMPTS_PER_WINDOW", 3),
            consecutive_failure_threshold: env_parse("HEAL_FAILURE_THRESHOLD", 2),
            sweep_interval_secs: env_parse("HEAL_SWEEP_INTERVAL_SECS", 300),
            record_ttl_secs: env_parse("HEAL_RECORD_TTL_SECS", 86400),
            rollback_capacity: env_parse("HEAL_ROLLBACK_CAPACITY", 100),
            default_node_timeout_ms: env_parse("HEAL_DEFAULT_NODE_TIMEOUT_MS", 30000),
            verification_wait_ms: env_parse("HEAL_VERIFICATION_WAIT_MS", 2000),
            execution_history_limit: env_parse("HEAL_EXECUTION_HISTORY_LIMIT", 10),
            default_autonomy: env_parse("HEAL_DEFAULT_AUTONOMY", 1),
            sandbox_mode: env::var("HEAL_SANDBOX_MODE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Config {
            engine,
            request,
            healing,
            logging,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 10000,
        }
    }
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            max_fixes_per_run: 5,
            rate_limit_window_secs: 3600,
            max_attempts_per_window: 3,
            consecutive_failure_threshold: 2,
            sweep_interval_secs: 300,
            record_ttl_secs: 86400,
            rollback_capacity: 100,
            default_node_timeout_ms: 30000,
            verification_wait_ms: 2000,
            execution_history_limit: 10,
            default_autonomy: 1,
            sandbox_mode: false,
        }
    }
}
