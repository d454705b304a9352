//! Query and dispatch metrics.
//!
//! Recorded through the `metrics` facade. Nothing is exported unless the
//! embedding application installs a recorder.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Metric names.
pub mod names {
    pub const QUERIES_STARTED_TOTAL: &str = "muster_queries_started_total";
    pub const QUERIES_COMPLETED_TOTAL: &str = "muster_queries_completed_total";
    pub const QUERIES_FAILED_TOTAL: &str = "muster_queries_failed_total";
    pub const FOLLOWUP_REQUESTS_TOTAL: &str = "muster_followup_requests_total";
    pub const EVENTS_DISPATCHED_TOTAL: &str = "muster_events_dispatched_total";
    pub const QUERY_LATENCY_SECONDS: &str = "muster_query_latency_seconds";
    pub const CACHED_GUILDS: &str = "muster_cached_guilds";
}

/// Register metric descriptions with the installed recorder.
pub fn describe() {
    metrics::describe_counter!(names::QUERIES_STARTED_TOTAL, "Total number of queries begun");
    metrics::describe_counter!(
        names::QUERIES_COMPLETED_TOTAL,
        "Total number of queries resolved with a result"
    );
    metrics::describe_counter!(
        names::QUERIES_FAILED_TOTAL,
        "Total number of queries that failed, by reason"
    );
    metrics::describe_counter!(
        names::FOLLOWUP_REQUESTS_TOTAL,
        "Total number of follow-up range requests sent"
    );
    metrics::describe_counter!(
        names::EVENTS_DISPATCHED_TOTAL,
        "Total number of gateway events dispatched on the bus"
    );
    metrics::describe_histogram!(
        names::QUERY_LATENCY_SECONDS,
        "Time from query start to resolution in seconds"
    );
    metrics::describe_gauge!(names::CACHED_GUILDS, "Current number of cached guilds");
}

/// Record a query start.
pub fn record_started(kind: &str) {
    counter!(names::QUERIES_STARTED_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// Record a successful resolution.
pub fn record_completed(kind: &str, elapsed: Duration) {
    counter!(names::QUERIES_COMPLETED_TOTAL, "kind" => kind.to_string()).increment(1);
    histogram!(names::QUERY_LATENCY_SECONDS, "kind" => kind.to_string())
        .record(elapsed.as_secs_f64());
}

/// Record a failed query.
pub fn record_failed(kind: &str, reason: &str) {
    counter!(
        names::QUERIES_FAILED_TOTAL,
        "kind" => kind.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a follow-up request.
pub fn record_followup() {
    counter!(names::FOLLOWUP_REQUESTS_TOTAL).increment(1);
}

/// Record a bus dispatch.
pub fn record_dispatch(event: &str) {
    counter!(names::EVENTS_DISPATCHED_TOTAL, "event" => event.to_string()).increment(1);
}

/// Update the cached guild count.
pub fn set_cached_guilds(count: usize) {
    gauge!(names::CACHED_GUILDS).set(count as f64);
}
