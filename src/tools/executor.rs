//! Tool executor - invokes actions and normalizes outcomes
//!
//! Every execution path ends in a well-formed `Observation`: timeouts,
//! cancellation, unknown tools, and tool failures all become `err_msg`
//! rather than errors propagated to the loop.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::{Action, Observation};
use crate::error::{Error, Result};
use crate::tools::ToolRegistry;
use serde_json::Value;

/// Configuration for tool execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Per-call timeout
    pub timeout: Duration,
    /// Retry attempts after the first failure (retryable errors only)
    pub max_retries: u32,
    /// Base delay for exponential back-off; doubles per attempt
    pub retry_backoff: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            timeout: Duration::from_secs(30),
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Executes actions against a tool registry
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    config: ExecutorConfig,
}

impl ToolExecutor {
    /// Create an executor over the given registry
    pub fn new(registry: Arc<ToolRegistry>, config: ExecutorConfig) -> Self {
        ToolExecutor { registry, config }
    }

    /// Execute one action and return its observation.
    ///
    /// Never returns an error: transport problems become `err_msg`.
    pub async fn execute(&self, token: &CancellationToken, action: &Action) -> Observation {
        let (result, latency_ms) = self.invoke_once(token, action).await;
        Self::into_observation(&action.name, result, latency_ms)
    }

    /// Execute with retries on retryable failures.
    ///
    /// Each attempt doubles the base delay (with jitter). Non-retryable
    /// failures and successes return immediately.
    pub async fn execute_with_retry(&self, token: &CancellationToken, action: &Action) -> Observation {
        let mut policy = ExponentialBackoff {
            initial_interval: self.config.retry_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt: u32 = 0;
        loop {
            let (result, latency_ms) = self.invoke_once(token, action).await;

            match &result {
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = policy.next_backoff().unwrap_or(self.config.retry_backoff);
                    warn!(
                        tool = %action.name,
                        attempt,
                        max = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "tool failed with retryable error, backing off"
                    );
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Observation::failure(&action.name, "canceled during back-off", latency_ms);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                _ => return Self::into_observation(&action.name, result, latency_ms),
            }
        }
    }

    async fn invoke_once(
        &self,
        token: &CancellationToken,
        action: &Action,
    ) -> (Result<HashMap<String, Value>>, u64) {
        let start = Instant::now();

        let invocation = self.registry.invoke(&action.name, action.args.clone());
        let result = tokio::select! {
            _ = token.cancelled() => {
                Err(Error::Canceled(format!("tool '{}' canceled", action.name)))
            }
            timed = tokio::time::timeout(self.config.timeout, invocation) => match timed {
                Ok(inner) => inner,
                Err(_) => Err(Error::Timeout(format!(
                    "tool '{}' timed out after {:?}",
                    action.name, self.config.timeout
                ))),
            },
        };

        (result, start.elapsed().as_millis() as u64)
    }

    fn into_observation(
        tool: &str,
        result: Result<HashMap<String, Value>>,
        latency_ms: u64,
    ) -> Observation {
        match result {
            Ok(output) => {
                debug!(tool, latency_ms, "tool succeeded");
                Observation::success(tool, output, latency_ms)
            }
            Err(e) => {
                debug!(tool, latency_ms, error = %e, "tool failed");
                Observation::failure(tool, e.to_string(), latency_ms)
            }
        }
    }
}
