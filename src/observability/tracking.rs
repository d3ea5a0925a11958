use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use tracing::{debug, error, info};

use super::metrics::MetricsCollector;

/// Run `f`, recording its wall-clock duration under `operation` whatever the outcome
pub async fn track_time<F, Fut, T, E>(metrics: &MetricsCollector, operation: &str, f: F) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let result = f().await;
    let duration = started.elapsed();

    metrics.record_latency(operation, duration);
    debug!(
        operation,
        duration_ms = duration.as_millis() as u64,
        success = result.is_ok(),
        "Operation completed"
    );
    result
}

/// Run `f` as a named pipeline node: logs start and completion and records the
/// duration with its success/failure split. Errors are returned unchanged.
pub async fn track_node_execution<F, Fut, T, E>(
    metrics: &MetricsCollector,
    node: &str,
    f: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    info!(node, "Node started");
    let started = Instant::now();
    let result = f().await;
    let duration = started.elapsed();

    if let Err(e) = &result {
        error!(node, error = %e, "Node failed");
    }
    metrics.record_node_execution(node, duration, result.is_ok());
    info!(
        node,
        duration_ms = duration.as_millis() as u64,
        success = result.is_ok(),
        "Node completed"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_track_time_records_latency() {
        let metrics = MetricsCollector::new();

        let result = track_time(&metrics, "split_documents", || async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok::<_, String>("done")
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        let snapshot = metrics.get_metrics();
        let stats = &snapshot.latency["split_documents"];
        assert_eq!(stats.count, 1);
        assert!(stats.min >= 0.03);
    }

    #[tokio::test]
    async fn test_track_time_records_failures_too() {
        let metrics = MetricsCollector::new();

        let result: Result<(), String> =
            track_time(&metrics, "load", || async { Err("unreachable host".to_string()) }).await;

        assert_eq!(result.unwrap_err(), "unreachable host");
        assert_eq!(metrics.get_metrics().latency["load"].count, 1);
    }

    #[tokio::test]
    async fn test_track_node_execution_success_and_failure() {
        let metrics = MetricsCollector::new();

        let ok = track_node_execution(&metrics, "grade_documents", || async {
            Ok::<_, String>(3)
        })
        .await;
        assert_eq!(ok.unwrap(), 3);

        let err: Result<u32, String> = track_node_execution(&metrics, "grade_documents", || async {
            Err("grader unavailable".to_string())
        })
        .await;
        assert_eq!(err.unwrap_err(), "grader unavailable");

        let snapshot = metrics.get_metrics();
        let node = &snapshot.nodes["grade_documents"];
        assert_eq!(node.count, 2);
        assert_eq!(node.success, 1);
        assert_eq!(node.failure, 1);
    }
}
