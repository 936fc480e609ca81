//! Generic retry executor with exponential backoff.
//!
//! Sits beneath every upstream call, including the orchestrator's own.
//! Retryability is a property of the error type (the [`Retryable`] trait),
//! decided structurally - never by matching message text. Non-retryable
//! errors propagate immediately; retryable ones are absorbed up to the
//! attempt budget with exponentially growing, capped delays.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RequestConfig;
use crate::error::{EngineError, HealError};

/// Classification hook for errors passing through the executor.
pub trait Retryable {
    /// Whether retrying the failed operation could plausibly succeed.
    fn is_retryable(&self) -> bool;
}

impl Retryable for EngineError {
    fn is_retryable(&self) -> bool {
        EngineError::is_retryable(self)
    }
}

/// Terminal failure of a guarded call.
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Every attempt failed with a retryable error.
    #[error("Operation '{operation}' exhausted {attempts} attempt(s): {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: E,
    },

    /// A non-retryable error stopped the attempts early.
    #[error("Operation '{operation}' failed with non-retryable error: {source}")]
    Aborted {
        operation: String,
        #[source]
        source: E,
    },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The underlying cause, whichever way the attempts ended.
    pub fn into_source(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } => source,
            RetryError::Aborted { source, .. } => source,
        }
    }
}

impl From<RetryError<EngineError>> for HealError {
    fn from(err: RetryError<EngineError>) -> Self {
        match err {
            RetryError::Exhausted {
                operation,
                attempts,
                source,
            } => HealError::Upstream {
                operation,
                attempts,
                source,
            },
            RetryError::Aborted { operation, source } => HealError::Upstream {
                operation,
                attempts: 1,
                source,
            },
        }
    }
}

/// Exponential-backoff runner for upstream calls.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
    max_delay: Duration,
}

impl RetryExecutor {
    /// Create an executor from request configuration.
    pub fn new(config: &RequestConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Run `f` up to the attempt budget, sleeping between retries.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: &str,
        mut f: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::error::Error + 'static,
    {
        let mut delay = self.initial_delay;

        for attempt in 1..=self.max_attempts {
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            operation = operation,
                            attempt = attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        error = %e,
                        "Non-retryable error, giving up"
                    );
                    return Err(RetryError::Aborted {
                        operation: operation.to_string(),
                        source: e,
                    });
                }
                Err(e) => {
                    if attempt == self.max_attempts {
                        warn!(
                            operation = operation,
                            attempts = attempt,
                            error = %e,
                            "Attempt budget exhausted"
                        );
                        return Err(RetryError::Exhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            source: e,
                        });
                    }

                    warn!(
                        operation = operation,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after delay"
                    );
                    tokio::time::sleep(delay).await;
                    delay = Duration::from_secs_f64(
                        (delay.as_secs_f64() * self.backoff_multiplier)
                            .min(self.max_delay.as_secs_f64()),
                    );
                }
            }
        }

        unreachable!("retry loop always returns within the attempt budget")
    }

    /// Run the primary through [`RetryExecutor::execute`]; on its terminal
    /// failure, try the fallback once. A failing fallback surfaces the
    /// original primary error, which is the more diagnostic of the two.
    pub async fn execute_with_fallback<T, E, F, Fut, G, GFut>(
        &self,
        operation: &str,
        primary: F,
        fallback: Option<G>,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: Retryable + std::error::Error + 'static,
    {
        let primary_err = match self.execute(operation, primary).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let Some(fallback) = fallback else {
            return Err(primary_err);
        };

        debug!(operation = operation, "Primary failed, trying fallback");
        match fallback().await {
            Ok(value) => Ok(value),
            Err(fallback_err) => {
                warn!(
                    operation = operation,
                    fallback_error = %fallback_err,
                    "Fallback also failed, surfacing primary error"
                );
                Err(primary_err)
            }
        }
    }
}
