use std::time::Duration;

use thiserror::Error;

use crate::resilience::circuit_breaker::BreakerFailure;
use crate::resilience::retry::RetryableError;

/// Every configured attempt failed with a retryable error
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{operation} failed after {attempts} attempts: {last_error}")]
pub struct RetryExhausted {
    pub operation: String,
    pub attempts: u32,
    pub last_error: String,
}

/// The breaker rejected the call without invoking the operation
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Circuit breaker '{breaker}' is OPEN (retry after {retry_after:?})")]
pub struct CircuitOpen {
    pub breaker: String,
    pub retry_after: Duration,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cannot derive cache key from argument {argument}: {source}")]
    KeyDerivation {
        argument: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Application-level error taxonomy for the document QA pipeline
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Web search error: {0}")]
    WebSearch(String),

    #[error("Grading error: {0}")]
    Grading(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    RetryExhausted(#[from] RetryExhausted),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpen),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Category name used as the error-count key in metrics
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "ConfigurationError",
            AppError::Validation(_) => "ValidationError",
            AppError::Retrieval(_) => "RetrievalError",
            AppError::VectorStore(_) => "VectorStoreError",
            AppError::Generation(_) => "GenerationError",
            AppError::WebSearch(_) => "WebSearchError",
            AppError::Grading(_) => "GradingError",
            AppError::Cache(_) => "CacheError",
            AppError::RetryExhausted(_) => "RetryExhaustedError",
            AppError::CircuitOpen(_) => "CircuitOpenError",
            AppError::Internal(_) => "InternalError",
        }
    }

    /// Caller mistakes and the toolkit's own verdicts, as opposed to dependency failures
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppError::Configuration(_)
                | AppError::Validation(_)
                | AppError::Cache(_)
                | AppError::RetryExhausted(_)
                | AppError::CircuitOpen(_)
        )
    }
}

impl RetryableError for AppError {
    fn is_retryable(&self) -> bool {
        !self.is_terminal()
    }
}

impl BreakerFailure for AppError {
    fn counts_as_failure(&self) -> bool {
        match self {
            // An exhausted retry sequence is exactly the "logical call failed" signal
            AppError::RetryExhausted(_) => true,
            other => !other.is_terminal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_is_not_retryable() {
        let error = AppError::Validation("empty".to_string());
        assert!(!error.is_retryable());
        assert!(!error.counts_as_failure());
    }

    #[test]
    fn test_dependency_errors_are_retryable() {
        assert!(AppError::Retrieval("timeout".to_string()).is_retryable());
        assert!(AppError::Generation("overloaded".to_string()).is_retryable());
        assert!(AppError::Internal(anyhow::anyhow!("boom")).is_retryable());
    }

    #[test]
    fn test_retry_exhausted_trips_breaker_but_is_not_retried() {
        let error = AppError::from(RetryExhausted {
            operation: "retrieve".to_string(),
            attempts: 4,
            last_error: "timeout".to_string(),
        });
        assert!(!error.is_retryable());
        assert!(error.counts_as_failure());
    }

    #[test]
    fn test_circuit_open_does_not_count() {
        let error = AppError::from(CircuitOpen {
            breaker: "llm".to_string(),
            retry_after: Duration::from_secs(1),
        });
        assert!(!error.counts_as_failure());
        assert_eq!(error.category(), "CircuitOpenError");
    }

    #[test]
    fn test_retry_exhausted_message() {
        let error = RetryExhausted {
            operation: "embed".to_string(),
            attempts: 3,
            last_error: "connection reset".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "embed failed after 3 attempts: connection reset"
        );
    }
}
