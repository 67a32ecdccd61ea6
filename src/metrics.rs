//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Change detection per stream
//! - Deduplication within a cycle
//! - Bulk publishing
//! - Source reconnects and retries
//! - Watermark progress
//! - Cycle duration and outcome
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `sync_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! No recorder is installed by the library; embedders pick an exporter.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record rows returned by a detect query.
pub fn record_rows_detected(stream: &str, count: usize) {
    counter!("sync_rows_detected_total", "stream" => stream.to_string()).increment(count as u64);
}

/// Record film ids a stream claimed, and how many were already claimed this cycle.
pub fn record_films_claimed(stream: &str, claimed: usize, duplicates: usize) {
    counter!("sync_films_claimed_total", "stream" => stream.to_string()).increment(claimed as u64);
    if duplicates > 0 {
        counter!("sync_films_deduplicated_total", "stream" => stream.to_string())
            .increment(duplicates as u64);
    }
}

/// Record a bulk request that the index accepted.
pub fn record_batch_published(stream: &str, documents: usize, duration: Duration) {
    counter!("sync_batches_published_total", "stream" => stream.to_string()).increment(1);
    counter!("sync_documents_published_total", "stream" => stream.to_string())
        .increment(documents as u64);
    histogram!("sync_publish_duration_seconds", "stream" => stream.to_string())
        .record(duration.as_secs_f64());
    histogram!("sync_batch_size", "stream" => stream.to_string()).record(documents as f64);
}

/// Record a bulk request with item failures or a rejected status.
pub fn record_publish_failure(stream: &str, outcome: &str, failed_items: usize) {
    counter!(
        "sync_publish_failures_total",
        "stream" => stream.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    if failed_items > 0 {
        counter!("sync_failed_items_total", "stream" => stream.to_string())
            .increment(failed_items as u64);
    }
}

/// Record a transient failure that will be retried.
pub fn record_retry(operation: &str, error_type: &str) {
    counter!(
        "sync_retries_total",
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record a retry loop that ran out of guarded attempts.
pub fn record_retries_exhausted(operation: &str) {
    counter!("sync_retries_exhausted_total", "operation" => operation.to_string()).increment(1);
}

/// Record a source (re)connection attempt.
pub fn record_reconnect(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("sync_source_reconnects_total", "status" => status).increment(1);
}

/// Record a watermark that was persisted.
pub fn record_watermark(key: &str, watermark: DateTime<Utc>) {
    gauge!("sync_watermark_timestamp_seconds", "key" => key.to_string())
        .set(watermark.timestamp_micros() as f64 / 1_000_000.0);
}

/// Record how far a watermark trails wall-clock time.
pub fn record_watermark_lag(key: &str, lag: Duration) {
    gauge!("sync_watermark_lag_seconds", "key" => key.to_string()).set(lag.as_secs_f64());
}

/// Record a completed (or aborted) cycle.
pub fn record_cycle(duration: Duration, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("sync_cycles_total", "outcome" => outcome).increment(1);
    histogram!("sync_cycle_duration_seconds").record(duration.as_secs_f64());
}

/// Record documents sent in one cycle.
pub fn record_cycle_documents(documents: usize) {
    gauge!("sync_cycle_documents").set(documents as f64);
}

/// Record an error by type, labelled by stream.
pub fn record_error(stream: &str, error_type: &str) {
    counter!(
        "sync_errors_total",
        "stream" => stream.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record the synchronizer's current phase.
pub fn record_phase(phase: &str) {
    gauge!("sync_phase", "phase" => phase.to_string()).set(1.0);
}
