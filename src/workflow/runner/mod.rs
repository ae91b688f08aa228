
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{RagError, Result, config::WorkflowConfig};

/// Executes named workflow steps.
///
/// A step's output is recorded once it succeeds, so the runner may skip it
/// when the same run is executed again. Steps must therefore be safe to run
/// more than once.
pub trait StepRunner: Send + Sync {
    fn run_step<T, F, Fut>(&self, name: &str, step: F) -> impl Future<Output = Result<T>> + Send
    where
        T: Serialize + DeserializeOwned + Send,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send;
}

/// How often a failing step is attempted again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first, at least one
    pub max_attempts: u32,
    /// Delay before the second attempt, doubled for each attempt after it
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    #[inline]
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            max_attempts: config.step_max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Delay before attempt number `attempt + 1`
    #[inline]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// In-process step runner holding the checkpoints of a single run
#[derive(Debug, Default)]
pub struct LocalRunner {
    policy: RetryPolicy,
    checkpoints: Mutex<HashMap<String, Value>>,
}

impl LocalRunner {
    #[inline]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            checkpoints: Mutex::new(HashMap::new()),
        }
    }

    /// Names of the steps that have completed in this run
    #[inline]
    pub fn completed_steps(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_checkpoints().keys().cloned().collect();
        names.sort();
        names
    }

    fn lock_checkpoints(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        self.checkpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn checkpoint(&self, name: &str) -> Option<Value> {
        self.lock_checkpoints().get(name).cloned()
    }

    fn record(&self, name: &str, output: Value) {
        self.lock_checkpoints().insert(name.to_string(), output);
    }
}

impl StepRunner for LocalRunner {
    fn run_step<T, F, Fut>(&self, name: &str, step: F) -> impl Future<Output = Result<T>> + Send
    where
        T: Serialize + DeserializeOwned + Send,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        async move {
            if let Some(saved) = self.checkpoint(name) {
                debug!("Step {} already completed, reusing its output", name);
                return serde_json::from_value(saved).map_err(|e| {
                    RagError::Other(anyhow::anyhow!(
                        "Corrupt checkpoint for step {}: {}",
                        name,
                        e
                    ))
                });
            }

            let mut attempt = 1;
            loop {
                debug!("Running step {} (attempt {})", name, attempt);
                match step().await {
                    Ok(output) => {
                        let saved = serde_json::to_value(&output).map_err(|e| {
                            RagError::Other(anyhow::anyhow!(
                                "Failed to checkpoint step {}: {}",
                                name,
                                e
                            ))
                        })?;
                        self.record(name, saved);
                        return Ok(output);
                    }
                    Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                        let delay = self.policy.delay_after(attempt);
                        warn!(
                            "Step {} failed on attempt {}, retrying in {:?}: {}",
                            name, attempt, delay, e
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) => {
                        warn!("Step {} failed: {}", name, e);
                        return Err(e);
                    }
                }
            }
        }
    }
}
