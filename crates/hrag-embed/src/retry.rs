use std::future::Future;
use std::time::Duration;
use tracing::warn;

use hrag_core::config::OrchestratorSettings;
use hrag_core::{Error, Result, ServiceError};

use crate::gate::CallGate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&OrchestratorSettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &OrchestratorSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            multiplier: 2.0,
        }
    }

    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Self::default() }
    }

    /// Delay before retry number `attempt` (1-based). A server supplied
    /// retry-after wins when it is longer than the computed backoff.
    pub fn backoff_for(&self, attempt: u32, err: &ServiceError) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exp);
        let computed = Duration::from_millis(millis.min(self.max_backoff.as_millis() as f64) as u64);
        match err {
            ServiceError::RateLimited { retry_after_secs } => computed.max(Duration::from_secs(*retry_after_secs)),
            _ => computed,
        }
    }
}

/// Run `op` through the gate, retrying transient failures with exponential
/// backoff. Each attempt holds its own permit; backoff sleeps do not.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, gate: &CallGate, operation: &str, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, ServiceError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let result = {
            let _permit = gate.acquire().await.map_err(|_| Error::Cancelled)?;
            op().await
        };
        match result {
            Ok(value) => return Ok(value),
            Err(ServiceError::Cancelled) => return Err(Error::Cancelled),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.backoff_for(attempt, &e);
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                tokio::select! {
                    biased;
                    _ = gate.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                return Err(Error::ExternalService { operation: operation.to_string(), attempts: attempt, source: e });
            }
        }
    }
}
