use std::sync::Arc;

/// Shared metrics collector interface
///
/// This is a trait object that allows applications to plug in their own
/// metrics implementations (Prometheus, StatsD, etc.)
pub trait MetricsCollector: Send + Sync {
    fn page_fetched(&self);
    fn entry_uploaded(&self);
    fn entry_deleted(&self);
    fn download_started(&self);
    fn store_error(&self);
    fn bytes_sent(&self, amount: usize);
    fn bytes_received(&self, amount: u64);
}

/// No-op metrics collector (default)
#[derive(Debug, Clone, Default)]
pub struct NoOpMetrics;

impl MetricsCollector for NoOpMetrics {
    fn page_fetched(&self) {}
    fn entry_uploaded(&self) {}
    fn entry_deleted(&self) {}
    fn download_started(&self) {}
    fn store_error(&self) {}
    fn bytes_sent(&self, _amount: usize) {}
    fn bytes_received(&self, _amount: u64) {}
}

/// Shared reference to metrics collector
#[derive(Clone)]
pub struct SharedMetrics(Arc<dyn MetricsCollector>);

impl SharedMetrics {
    pub fn new(collector: Arc<dyn MetricsCollector>) -> Self {
        Self(collector)
    }

    pub fn page_fetched(&self) {
        self.0.page_fetched();
    }

    pub fn entry_uploaded(&self) {
        self.0.entry_uploaded();
    }

    pub fn entry_deleted(&self) {
        self.0.entry_deleted();
    }

    pub fn download_started(&self) {
        self.0.download_started();
    }

    pub fn store_error(&self) {
        self.0.store_error();
    }

    pub fn bytes_sent(&self, amount: usize) {
        self.0.bytes_sent(amount);
    }

    pub fn bytes_received(&self, amount: u64) {
        self.0.bytes_received(amount);
    }

    /// Records a failed remote call; absence is not a store failure.
    pub(crate) fn observe<T>(&self, result: &crate::Result<T>) {
        if let Err(err) = result {
            if !err.is_not_found() && !matches!(err, crate::StorageError::InvalidName(_)) {
                self.store_error();
            }
        }
    }
}

impl Default for SharedMetrics {
    fn default() -> Self {
        Self(Arc::new(NoOpMetrics))
    }
}

impl std::fmt::Debug for SharedMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedMetrics")
    }
}
