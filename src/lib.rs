pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod observability;
pub mod resilience;
pub mod validation;

pub use cache::{CachePolicy, CallArgs, TtlCache};
pub use config::ToolkitConfig;
pub use error::{AppError, CacheError, CircuitOpen, ConfigError, RetryExhausted};
pub use observability::{track_node_execution, track_time, MetricsCollector, MetricsSnapshot};
pub use resilience::{
    retry_with_backoff, BreakerFailure, CircuitBreaker, CircuitBreakerConfig, CircuitState,
    RetryConfig, RetryExecutor, RetryableError,
};
