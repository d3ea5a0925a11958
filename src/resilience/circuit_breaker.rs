use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::CircuitOpen;
use crate::observability::MetricsCollector;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed - normal operation
    Closed,
    /// Circuit is open - failing, reject requests immediately
    Open,
    /// Circuit is half-open - one trial request tests recovery
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(name)
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Counted failures before opening the circuit
    pub failure_threshold: u32,
    /// Time since the last failure before a trial request is admitted
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Error types that decide whether they count against the breaker.
/// Every error counts unless the type says otherwise.
pub trait BreakerFailure: StdError {
    fn counts_as_failure(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    trial_in_flight: bool,
    /// Bumped on every transition and on reset; a trial only decides the
    /// state for the generation it was admitted in
    generation: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            trial_in_flight: false,
            generation: 0,
        }
    }

    fn advance(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    /// A trial from an earlier generation is settled like any other call
    fn resolve(&self, admission: Admission) -> Admission {
        match admission {
            Admission::Trial { generation } if generation != self.generation => Admission::Normal,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial { generation: u64 },
}

#[derive(Debug)]
enum Transition {
    Opened { failure_count: u32 },
    HalfOpened,
    Recovered,
    Reopened,
}

/// Circuit breaker guarding one logical dependency
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    /// Create a new circuit breaker with custom configuration
    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            timeout_ms = config.timeout.as_millis() as u64,
            "Circuit breaker initialized"
        );
        Self {
            name,
            config,
            inner: Mutex::new(BreakerState::new()),
            metrics: None,
        }
    }

    /// Count rejections into a shared collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Get current failure count
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Reset circuit breaker to closed state
    pub fn reset(&self) {
        {
            let mut inner = self.inner.lock();
            let generation = inner.generation;
            *inner = BreakerState::new();
            inner.generation = generation;
            inner.advance();
        }
        info!(breaker = %self.name, "Circuit breaker manually reset");
    }

    /// Call through the breaker; errors count according to `BreakerFailure`
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: BreakerFailure + From<CircuitOpen>,
    {
        self.call_if(|e: &E| e.counts_as_failure(), f).await
    }

    /// Call through the breaker; only errors accepted by `is_expected` count as failures.
    /// Anything else is returned untouched and leaves the breaker state alone.
    pub async fn call_if<F, Fut, T, E, P>(&self, is_expected: P, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + From<CircuitOpen>,
        P: Fn(&E) -> bool,
    {
        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(open) => {
                warn!(
                    breaker = %self.name,
                    state = %self.state(),
                    retry_after_ms = open.retry_after.as_millis() as u64,
                    "Circuit breaker is OPEN, rejecting request"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_error("CircuitOpen");
                }
                return Err(E::from(open));
            }
        };

        let mut guard = TrialGuard {
            breaker: self,
            trial: match admission {
                Admission::Trial { generation } => Some(generation),
                Admission::Normal => None,
            },
        };
        let result = f().await;

        match &result {
            Ok(_) => {
                self.record_success(admission);
                guard.trial = None;
            }
            Err(e) if is_expected(e) => {
                self.record_failure(admission, e);
                guard.trial = None;
            }
            Err(e) => {
                debug!(breaker = %self.name, error = %e, "Error not counted by circuit breaker");
            }
        }
        result
    }

    /// State check and OPEN -> HALF_OPEN gating as one critical section
    fn admit(&self) -> Result<Admission, CircuitOpen> {
        let transition;
        let admission = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => return Ok(Admission::Normal),
                CircuitState::Open => {
                    let elapsed = inner
                        .last_failure_time
                        .map(|t| t.elapsed())
                        .unwrap_or(Duration::MAX);
                    if elapsed < self.config.timeout {
                        return Err(self.rejection(self.config.timeout - elapsed));
                    }
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    transition = Transition::HalfOpened;
                    Admission::Trial {
                        generation: inner.advance(),
                    }
                }
                CircuitState::HalfOpen => {
                    if inner.trial_in_flight {
                        return Err(self.rejection(Duration::ZERO));
                    }
                    inner.trial_in_flight = true;
                    return Ok(Admission::Trial {
                        generation: inner.generation,
                    });
                }
            }
        };
        self.log_transition(transition);
        Ok(admission)
    }

    fn record_success(&self, admission: Admission) {
        let transition = {
            let mut inner = self.inner.lock();
            match inner.resolve(admission) {
                Admission::Trial { .. } => {
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.trial_in_flight = false;
                    inner.advance();
                    Some(Transition::Recovered)
                }
                // Failures accumulate until the circuit trips; only recovery clears them
                Admission::Normal => None,
            }
        };
        if let Some(transition) = transition {
            self.log_transition(transition);
        }
    }

    fn record_failure(&self, admission: Admission, error: &dyn fmt::Display) {
        let (failure_count, transition) = {
            let mut inner = self.inner.lock();
            inner.failure_count = inner.failure_count.saturating_add(1);
            inner.last_failure_time = Some(Instant::now());

            let transition = match (inner.resolve(admission), inner.state) {
                (Admission::Trial { .. }, _) => {
                    inner.state = CircuitState::Open;
                    inner.trial_in_flight = false;
                    inner.advance();
                    Some(Transition::Reopened)
                }
                (Admission::Normal, CircuitState::Closed)
                    if inner.failure_count >= self.config.failure_threshold =>
                {
                    inner.state = CircuitState::Open;
                    inner.advance();
                    Some(Transition::Opened {
                        failure_count: inner.failure_count,
                    })
                }
                _ => None,
            };
            (inner.failure_count, transition)
        };

        warn!(
            breaker = %self.name,
            failure_count,
            threshold = self.config.failure_threshold,
            error = %error,
            "Circuit breaker registered failure"
        );
        if let Some(transition) = transition {
            self.log_transition(transition);
        }
    }

    fn rejection(&self, retry_after: Duration) -> CircuitOpen {
        CircuitOpen {
            breaker: self.name.clone(),
            retry_after,
        }
    }

    fn log_transition(&self, transition: Transition) {
        match transition {
            Transition::Opened { failure_count } => warn!(
                breaker = %self.name,
                failure_count,
                threshold = self.config.failure_threshold,
                from = %CircuitState::Closed,
                to = %CircuitState::Open,
                "Circuit breaker OPENED due to failures"
            ),
            Transition::HalfOpened => info!(
                breaker = %self.name,
                from = %CircuitState::Open,
                to = %CircuitState::HalfOpen,
                "Circuit breaker entering HALF_OPEN state"
            ),
            Transition::Recovered => info!(
                breaker = %self.name,
                from = %CircuitState::HalfOpen,
                to = %CircuitState::Closed,
                "Circuit breaker recovered, entering CLOSED state"
            ),
            Transition::Reopened => warn!(
                breaker = %self.name,
                from = %CircuitState::HalfOpen,
                to = %CircuitState::Open,
                "Circuit breaker trial failed, re-opening"
            ),
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &*self.inner.lock())
            .finish()
    }
}

/// Frees the HALF_OPEN trial slot if the trial future is dropped or ends in an
/// uncounted error, so the breaker cannot wedge with no trial ever admitted.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    /// Generation of the trial still holding the slot
    trial: Option<u64>,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if let Some(generation) = self.trial {
            let mut inner = self.breaker.inner.lock();
            if inner.generation == generation {
                inner.trial_in_flight = false;
            }
        }
    }
}
