use std::sync::Mutex;

/// Per-batch unit counters, shared by every worker in a preparation run.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    pub prepared: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_prepared(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.prepared += 1;
        }
    }

    pub fn record_skipped(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.skipped += 1;
        }
    }

    pub fn record_failed(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.failed += 1;
        }
    }

    pub fn snapshot(&self) -> Metrics {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            Metrics::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
