use std::str::FromStr;
use std::time::Duration;

use crate::cache::CachePolicy;
use crate::error::ConfigError;
use crate::logging::LogFormat;
use crate::resilience::{CircuitBreakerConfig, RetryConfig};

const LOG_LEVELS: [&str; 5] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// Toolkit configuration, read from the environment by the composition root
#[derive(Debug, Clone)]
pub struct ToolkitConfig {
    pub max_retries: u32,
    /// Initial retry delay in seconds
    pub retry_delay: f64,
    pub backoff_factor: f64,
    pub enable_cache: bool,
    /// Cache TTL in seconds
    pub cache_ttl: u64,
    pub failure_threshold: u32,
    /// Circuit breaker timeout in seconds
    pub circuit_timeout: f64,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: 1.0,
            backoff_factor: 2.0,
            enable_cache: true,
            cache_ttl: 3600,
            failure_threshold: 5,
            circuit_timeout: 60.0,
            log_level: "INFO".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

/// Unset falls back to `default`; a value that is set but does not parse is an error
fn env_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::invalid(name, format!("cannot parse '{}'", raw.trim()))
        }),
        Err(_) => Ok(default),
    }
}

impl ToolkitConfig {
    /// Read from the environment, falling back to defaults for unset variables, then
    /// validate the whole configuration
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let log_format = match std::env::var("LOG_FORMAT") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.log_format,
        };

        let config = Self {
            max_retries: env_or("MAX_RETRIES", defaults.max_retries)?,
            retry_delay: env_or("RETRY_DELAY", defaults.retry_delay)?,
            backoff_factor: env_or("BACKOFF_FACTOR", defaults.backoff_factor)?,
            enable_cache: std::env::var("ENABLE_CACHE")
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.enable_cache),
            cache_ttl: env_or("CACHE_TTL", defaults.cache_ttl)?,
            failure_threshold: env_or("CIRCUIT_FAILURE_THRESHOLD", defaults.failure_threshold)?,
            circuit_timeout: env_or("CIRCUIT_TIMEOUT", defaults.circuit_timeout)?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
        };
        config.validate()
    }

    /// Check bounds and normalise the log level
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.max_retries == 0 || self.max_retries > 10 {
            return Err(ConfigError::invalid(
                "max_retries",
                format!("must be in 1..=10, got {}", self.max_retries),
            ));
        }
        if !(self.retry_delay.is_finite() && self.retry_delay > 0.0) {
            return Err(ConfigError::invalid(
                "retry_delay",
                format!("must be a positive number of seconds, got {}", self.retry_delay),
            ));
        }
        if self.cache_ttl == 0 {
            return Err(ConfigError::invalid("cache_ttl", "must be greater than zero"));
        }
        if self.failure_threshold == 0 {
            return Err(ConfigError::invalid("failure_threshold", "must be greater than zero"));
        }
        if !(self.circuit_timeout.is_finite() && self.circuit_timeout >= 0.0) {
            return Err(ConfigError::invalid(
                "circuit_timeout",
                format!("must be a non-negative number of seconds, got {}", self.circuit_timeout),
            ));
        }

        let level = self.log_level.trim().to_ascii_uppercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::invalid(
                "log_level",
                format!("must be one of {:?}, got '{}'", LOG_LEVELS, self.log_level),
            ));
        }
        self.log_level = level;

        self.retry_config().validate()?;
        Ok(self)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries)
            .with_initial_delay(Duration::try_from_secs_f64(self.retry_delay).unwrap_or_default())
            .with_backoff_factor(self.backoff_factor)
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            timeout: Duration::try_from_secs_f64(self.circuit_timeout).unwrap_or_default(),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy::new()
            .with_ttl(self.cache_ttl())
            .with_enabled(self.enable_cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    const VARS: [&str; 9] = [
        "MAX_RETRIES",
        "RETRY_DELAY",
        "BACKOFF_FACTOR",
        "ENABLE_CACHE",
        "CACHE_TTL",
        "CIRCUIT_FAILURE_THRESHOLD",
        "CIRCUIT_TIMEOUT",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    // Environment variables are process-wide; serialise the tests touching them
    static ENV_LOCK: Mutex<()> = parking_lot::const_mutex(());

    fn with_env<R>(vars: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
        let _guard = ENV_LOCK.lock();
        let saved: Vec<(&str, Option<String>)> =
            VARS.iter().map(|name| (*name, std::env::var(name).ok())).collect();

        for name in VARS {
            std::env::remove_var(name);
        }
        for (name, value) in vars {
            std::env::set_var(name, value);
        }

        let result = f();

        for (name, value) in saved {
            match value {
                Some(val) => std::env::set_var(name, val),
                None => std::env::remove_var(name),
            }
        }
        result
    }

    #[test]
    fn test_config_defaults() {
        let config = with_env(&[], ToolkitConfig::from_env).unwrap();

        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, 1.0);
        assert!(config.enable_cache);
        assert_eq!(config.cache_ttl, 3600);
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.log_level, "INFO");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_config_from_env() {
        let config = with_env(
            &[
                ("MAX_RETRIES", "5"),
                ("RETRY_DELAY", "0.25"),
                ("ENABLE_CACHE", "false"),
                ("CACHE_TTL", "120"),
                ("CIRCUIT_TIMEOUT", "2.5"),
                ("LOG_LEVEL", "debug"),
                ("LOG_FORMAT", "console"),
            ],
            ToolkitConfig::from_env,
        )
        .unwrap();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_config().initial_delay, Duration::from_millis(250));
        assert!(!config.enable_cache);
        assert!(!config.cache_policy().enabled);
        assert_eq!(config.cache_policy().ttl, Some(Duration::from_secs(120)));
        assert_eq!(config.circuit_breaker_config().timeout, Duration::from_millis(2500));
        assert_eq!(config.log_level, "DEBUG");
        assert_eq!(config.log_format, LogFormat::Console);
    }

    #[test]
    fn test_config_rejects_unparseable_numbers() {
        for (name, value) in [
            ("MAX_RETRIES", "lots"),
            ("RETRY_DELAY", "soon"),
            ("CACHE_TTL", "-5"),
        ] {
            let err = with_env(&[(name, value)], ToolkitConfig::from_env).unwrap_err();
            match err {
                ConfigError::Invalid { field, .. } => assert_eq!(field, name),
            }
        }
    }

    #[test]
    fn test_config_rejects_bad_log_format() {
        let result = with_env(&[("LOG_FORMAT", "xml")], ToolkitConfig::from_env);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_bounds() {
        let too_many = ToolkitConfig {
            max_retries: 11,
            ..Default::default()
        };
        assert!(too_many.validate().is_err());

        let zero_delay = ToolkitConfig {
            retry_delay: 0.0,
            ..Default::default()
        };
        assert!(zero_delay.validate().is_err());

        let slow_backoff = ToolkitConfig {
            backoff_factor: 0.5,
            ..Default::default()
        };
        assert!(slow_backoff.validate().is_err());

        let bad_level = ToolkitConfig {
            log_level: "VERBOSE".to_string(),
            ..Default::default()
        };
        assert!(bad_level.validate().is_err());

        let zero_ttl = ToolkitConfig {
            cache_ttl: 0,
            ..Default::default()
        };
        assert!(zero_ttl.validate().is_err());
    }
}
