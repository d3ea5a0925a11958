use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use rag_resilience::validation::{validate_documents, validate_question};
use rag_resilience::{
    logging, track_node_execution, AppError, CachePolicy, CallArgs, CircuitBreaker,
    MetricsCollector, RetryExecutor, TtlCache, ToolkitConfig,
};

struct Pipeline {
    metrics: Arc<MetricsCollector>,
    cache: Arc<TtlCache<Vec<String>>>,
    policy: CachePolicy,
    breaker: CircuitBreaker,
    retry: RetryExecutor,
    backend_calls: AtomicU32,
}

impl Pipeline {
    fn new(config: &ToolkitConfig) -> Self {
        let metrics = Arc::new(MetricsCollector::new());
        Self {
            cache: Arc::new(TtlCache::new(config.cache_ttl()).with_metrics(Arc::clone(&metrics))),
            policy: config.cache_policy(),
            breaker: CircuitBreaker::with_config("retriever", config.circuit_breaker_config())
                .with_metrics(Arc::clone(&metrics)),
            retry: RetryExecutor::new(config.retry_config()).with_metrics(Arc::clone(&metrics)),
            backend_calls: AtomicU32::new(0),
            metrics,
        }
    }

    /// Simulated retriever that times out on its first two calls
    async fn search_backend(&self, question: &str) -> Result<Vec<String>, AppError> {
        let call = self.backend_calls.fetch_add(1, Ordering::SeqCst);
        if call < 2 {
            return Err(AppError::Retrieval("vector store timed out".to_string()));
        }
        Ok(vec![
            format!("doc-1 about '{}'", question),
            format!("doc-2 about '{}'", question),
        ])
    }

    async fn retrieve(&self, raw_question: &str) -> Result<Vec<String>, AppError> {
        let question = validate_question(raw_question)?;
        let args = CallArgs::new().arg(&question)?;

        let documents = track_node_execution(&self.metrics, "retrieve", || {
            self.cache.cached("retrieve", &args, &self.policy, || {
                self.breaker.call(|| {
                    self.retry
                        .execute("retrieve", || self.search_backend(&question))
                })
            })
        })
        .await?;

        Ok(validate_documents(documents))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ToolkitConfig::from_env().context("Invalid configuration")?;
    logging::init(&config.log_level, config.log_format)
        .context("Failed to initialise logging")?;

    let pipeline = Pipeline::new(&config);
    let _cleanup = pipeline.cache.spawn_cleanup(Duration::from_secs(60));

    let questions = [
        "What does a circuit breaker protect?",
        "What does a circuit breaker protect?",
        "<script>alert('hi')</script>",
    ];

    for question in questions {
        let outcome = pipeline.retrieve(question).await;
        pipeline.metrics.increment_request(outcome.is_ok());
        match outcome {
            Ok(documents) => info!(count = documents.len(), "Retrieved documents"),
            Err(e) => {
                pipeline.metrics.record_error(e.category());
                warn!(error = %e, category = e.category(), "Request failed");
            }
        }
    }

    info!(
        breaker_state = %pipeline.breaker.state(),
        cache_entries = pipeline.cache.len(),
        backend_calls = pipeline.backend_calls.load(Ordering::SeqCst),
        "Demo finished"
    );

    let snapshot = pipeline.metrics.get_metrics();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
