use std::sync::Arc;

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec,
};

use storage_core::{MetricsCollector, SharedMetrics};

lazy_static! {
    static ref STORAGE_OPERATIONS: IntCounterVec = register_int_counter_vec!(
        "storage_operations_total",
        "Storage operations by kind",
        &["operation"]
    )
    .unwrap();
    static ref STORAGE_ERRORS: IntCounter = register_int_counter!(
        "storage_errors_total",
        "Failed calls to the storage backend"
    )
    .unwrap();
    static ref BYTES_SENT: IntCounter = register_int_counter!(
        "storage_bytes_sent_total",
        "Bytes streamed to clients"
    )
    .unwrap();
    static ref BYTES_RECEIVED: IntCounter = register_int_counter!(
        "storage_bytes_received_total",
        "Bytes uploaded by clients"
    )
    .unwrap();
    static ref HTTP_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "HTTP UI requests by method and status",
        &["method", "status"]
    )
    .unwrap();
}

/// Prometheus backed collector registered in the default registry.
#[derive(Debug, Clone, Default)]
pub struct PrometheusMetrics;

impl PrometheusMetrics {
    pub fn shared() -> SharedMetrics {
        SharedMetrics::new(Arc::new(Self))
    }

    pub fn record_request(method: &str, status: u16) {
        HTTP_REQUESTS
            .with_label_values(&[method, &status.to_string()])
            .inc();
    }

    fn operation(name: &str) {
        STORAGE_OPERATIONS.with_label_values(&[name]).inc();
    }
}

impl MetricsCollector for PrometheusMetrics {
    fn page_fetched(&self) {
        Self::operation("list_page");
    }

    fn entry_uploaded(&self) {
        Self::operation("upload");
    }

    fn entry_deleted(&self) {
        Self::operation("delete");
    }

    fn download_started(&self) {
        Self::operation("download");
    }

    fn store_error(&self) {
        STORAGE_ERRORS.inc();
    }

    fn bytes_sent(&self, amount: usize) {
        BYTES_SENT.inc_by(amount as u64);
    }

    fn bytes_received(&self, amount: u64) {
        BYTES_RECEIVED.inc_by(amount);
    }
}
