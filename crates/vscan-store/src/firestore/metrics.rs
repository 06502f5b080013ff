//! Firestore request metrics.

use metrics::{counter, histogram};

pub mod names {
    /// Requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "vscan_firestore_requests_total";

    /// Retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "vscan_firestore_retries_total";

    /// Request latency by operation.
    pub const LATENCY_SECONDS: &str = "vscan_firestore_latency_seconds";

    /// Documents returned by list calls.
    pub const LIST_DOCUMENTS_RETURNED_TOTAL: &str = "vscan_firestore_list_documents_returned_total";
}

/// Record metrics for a completed Firestore request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}

pub fn record_listed(collection: &str, returned: u64) {
    counter!(
        names::LIST_DOCUMENTS_RETURNED_TOTAL,
        "collection" => collection.to_string()
    )
    .increment(returned);
}
