use std::time::Duration;

/// How the `cached` combinator treats one wrapped operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Per-operation TTL; `None` falls back to the cache's default TTL
    pub ttl: Option<Duration>,
    /// When false the operation is always invoked and the cache is never touched
    pub enabled: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: None,
            enabled: true,
        }
    }
}

impl CachePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Set a TTL for this operation's entries
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Enable or disable caching
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_policy_default() {
        let policy = CachePolicy::default();
        assert_eq!(policy.ttl, None);
        assert!(policy.enabled);
    }

    #[test]
    fn test_cache_policy_builder() {
        let policy = CachePolicy::new()
            .with_ttl(Duration::from_secs(60))
            .with_enabled(false);

        assert_eq!(policy.ttl, Some(Duration::from_secs(60)));
        assert!(!policy.enabled);
        assert!(!CachePolicy::disabled().enabled);
    }
}
