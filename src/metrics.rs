use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::info;
use once_cell::sync::Lazy;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::error::ErrorKind;

/// Runtime metrics for the quote worker.
///
/// Purpose:
/// - Track cycle throughput (started / published / failed)
/// - Track failures per error kind
/// - Track publisher acquire / release balance
///
/// Design:
/// - Lock-free (Atomics)
/// - Safe in async + multithreaded contexts
#[derive(Default)]
pub struct RuntimeMetrics {
    pub cycles_started: AtomicUsize,
    pub quotes_published: AtomicUsize,
    pub cycle_failures: AtomicUsize,

    // Failures by kind
    pub connect_errors: AtomicUsize,
    pub serialize_errors: AtomicUsize,
    pub send_errors: AtomicUsize,

    // Publisher handles
    pub publishers_acquired: AtomicUsize,
    pub publishers_released: AtomicUsize,
}

impl RuntimeMetrics {
    pub fn record_failure(&self, kind: ErrorKind) {
        self.cycle_failures.fetch_add(1, Ordering::Relaxed);
        let counter = match kind {
            ErrorKind::Connect => &self.connect_errors,
            ErrorKind::Serialize => &self.serialize_errors,
            ErrorKind::Send => &self.send_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// One-line summary used by the reporter.
    pub fn summary(&self) -> String {
        format!(
            "[METRICS] cycles={} published={} failed={} connect_err={} serialize_err={} send_err={} acquired={} released={}",
            self.cycles_started.load(Ordering::Relaxed),
            self.quotes_published.load(Ordering::Relaxed),
            self.cycle_failures.load(Ordering::Relaxed),
            self.connect_errors.load(Ordering::Relaxed),
            self.serialize_errors.load(Ordering::Relaxed),
            self.send_errors.load(Ordering::Relaxed),
            self.publishers_acquired.load(Ordering::Relaxed),
            self.publishers_released.load(Ordering::Relaxed),
        )
    }
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));

/// Logs `metrics.summary()` every `period` until `shutdown` fires.
pub async fn report_loop(metrics: Arc<RuntimeMetrics>, period: Duration, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(period) => info!("{}", metrics.summary()),
        }
    }
}
