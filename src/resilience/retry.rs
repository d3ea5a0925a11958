use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{ConfigError, RetryExhausted};
use crate::observability::MetricsCollector;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of retries after the first attempt
    pub max_retries: u32,
    /// Delay slept after the first failed attempt
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each failed attempt
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    /// Total number of tries, the first attempt included
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_delay.is_zero() {
            return Err(ConfigError::invalid("initial_delay", "must be greater than zero"));
        }
        if !(self.backoff_factor >= 1.0) {
            return Err(ConfigError::invalid(
                "backoff_factor",
                format!("must be >= 1.0, got {}", self.backoff_factor),
            ));
        }
        Ok(())
    }

    /// Delay slept after the failed attempt with the given 0-based index
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempt.min(i32::MAX as u32) as i32);
        scale(self.initial_delay, factor)
    }
}

fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Error types that decide for themselves whether another attempt is worthwhile.
/// Every error is retryable unless the type says otherwise.
pub trait RetryableError: StdError {
    fn is_retryable(&self) -> bool {
        true
    }
}

/// Side-effect hook invoked before each backoff sleep with the 0-based failed attempt
pub type RetryHook = Arc<dyn Fn(u32, &(dyn StdError + 'static)) + Send + Sync>;

/// Runs an operation until it succeeds, hits a non-retryable error, or runs out of attempts.
///
/// The executor keeps no state between calls; attempt and delay counters live on the
/// stack of each `execute` call, so one executor can be shared freely across tasks.
#[derive(Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
    on_retry: Option<RetryHook>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            on_retry: None,
            metrics: None,
        }
    }

    pub fn on_retry<H>(mut self, hook: H) -> Self
    where
        H: Fn(u32, &(dyn StdError + 'static)) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Report total latency and exhaustion into a shared collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute with the error type's own retryability classification
    pub async fn execute<F, Fut, T, E>(&self, operation: &str, f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + From<RetryExhausted> + 'static,
    {
        self.execute_if(operation, |e: &E| e.is_retryable(), f).await
    }

    /// Execute, retrying only errors accepted by `is_retryable`
    pub async fn execute_if<F, Fut, T, E, P>(
        &self,
        operation: &str,
        is_retryable: P,
        mut f: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + From<RetryExhausted> + 'static,
        P: Fn(&E) -> bool,
    {
        let started = Instant::now();
        let outcome = self.run(operation, &is_retryable, &mut f).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_latency(operation, started.elapsed());
        }
        outcome
    }

    async fn run<F, Fut, T, E, P>(&self, operation: &str, is_retryable: &P, f: &mut F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + From<RetryExhausted> + 'static,
        P: Fn(&E) -> bool,
    {
        let total_attempts = self.config.total_attempts();
        let mut delay = self.config.initial_delay;
        let mut attempt: u32 = 0;

        loop {
            let err = match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(
                            function = operation,
                            attempt = attempt + 1,
                            total_attempts,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !is_retryable(&err) {
                debug!(
                    function = operation,
                    attempt = attempt + 1,
                    error = %err,
                    "Error is not retryable, aborting"
                );
                return Err(err);
            }

            if attempt >= self.config.max_retries {
                error!(
                    function = operation,
                    total_attempts,
                    error = %err,
                    "Operation failed after all retries"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_error("RetryExhausted");
                }
                return Err(E::from(RetryExhausted {
                    operation: operation.to_string(),
                    attempts: total_attempts,
                    last_error: err.to_string(),
                }));
            }

            warn!(
                function = operation,
                attempt = attempt + 1,
                max_retries = self.config.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Operation failed, retrying"
            );
            if let Some(hook) = &self.on_retry {
                (**hook)(attempt, &err);
            }

            // No lock is held here; the sleep suspends only this task
            sleep(delay).await;
            delay = scale(delay, self.config.backoff_factor);
            attempt += 1;
        }
    }
}

/// Retry an operation with exponential backoff
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation: &str,
    f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + From<RetryExhausted> + 'static,
{
    RetryExecutor::new(config.clone()).execute(operation, f).await
}
