//! Metrics Module
//!
//! Counters for the proxy's request paths and store outcomes plus a summary of
//! scheduler lag samples. Served as JSON and logged periodically.

use crate::shutdown::ShutdownSignal;
use crate::{ProxyError, Result};
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Summary of lag samples in milliseconds
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct LagSummary {
    pub samples: u64,
    pub last_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
}

/// Point-in-time view of every counter
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub uptime_seconds: u64,
    pub requests: u64,
    pub pass: u64,
    pub busy: u64,
    pub error: u64,
    pub store: u64,
    pub store_skipped: u64,
    pub store_failure: u64,
    pub lag: LagSummary,
}

#[derive(Debug)]
pub struct MetricsManager {
    start_time: Instant,
    requests: AtomicU64,
    pass: AtomicU64,
    busy: AtomicU64,
    error: AtomicU64,
    store: AtomicU64,
    store_skipped: AtomicU64,
    store_failure: AtomicU64,
    lag_samples: AtomicU64,
    // Microseconds
    lag_last: AtomicU64,
    lag_max: AtomicU64,
    lag_total: AtomicU64,
}

impl Default for MetricsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsManager {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            requests: AtomicU64::new(0),
            pass: AtomicU64::new(0),
            busy: AtomicU64::new(0),
            error: AtomicU64::new(0),
            store: AtomicU64::new(0),
            store_skipped: AtomicU64::new(0),
            store_failure: AtomicU64::new(0),
            lag_samples: AtomicU64::new(0),
            lag_last: AtomicU64::new(0),
            lag_max: AtomicU64::new(0),
            lag_total: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pass(&self) {
        self.pass.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_busy(&self) {
        self.busy.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store(&self) {
        self.store.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skip(&self) {
        self.store_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_failure(&self) {
        self.store_failure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lag(&self, lag: Duration) {
        let micros = lag.as_micros().min(u64::MAX as u128) as u64;
        self.lag_samples.fetch_add(1, Ordering::Relaxed);
        self.lag_last.store(micros, Ordering::Relaxed);
        self.lag_max.fetch_max(micros, Ordering::Relaxed);
        self.lag_total.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.lag_samples.load(Ordering::Relaxed);
        let to_ms = |micros: u64| micros as f64 / 1000.0;
        let mean_ms = if samples == 0 {
            0.0
        } else {
            to_ms(self.lag_total.load(Ordering::Relaxed)) / samples as f64
        };

        MetricsSnapshot {
            timestamp: chrono::Utc::now(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            requests: self.requests.load(Ordering::Relaxed),
            pass: self.pass.load(Ordering::Relaxed),
            busy: self.busy.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
            store: self.store.load(Ordering::Relaxed),
            store_skipped: self.store_skipped.load(Ordering::Relaxed),
            store_failure: self.store_failure.load(Ordering::Relaxed),
            lag: LagSummary {
                samples,
                last_ms: to_ms(self.lag_last.load(Ordering::Relaxed)),
                max_ms: to_ms(self.lag_max.load(Ordering::Relaxed)),
                mean_ms,
            },
        }
    }

    /// Serve the current snapshot as JSON
    pub async fn handle_metrics_request<B>(&self, _req: Request<B>) -> Result<Response<String>> {
        let body = serde_json::to_string_pretty(&self.snapshot()).map_err(|e| {
            ProxyError::SerializationError(format!("Failed to serialize metrics: {}", e))
        })?;

        Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "application/json")
            .body(body)
            .map_err(|e| ProxyError::HttpError(format!("Failed to build metrics response: {}", e)))
    }

    /// Log a one-line summary every `interval` until shutdown
    pub fn start_periodic_logging(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: ShutdownSignal,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let s = self.snapshot();
                        info!(
                            "metrics: requests={} pass={} busy={} error={} store={} store_skipped={} store_failure={} lag_mean_ms={:.1} lag_max_ms={:.1}",
                            s.requests, s.pass, s.busy, s.error, s.store, s.store_skipped,
                            s.store_failure, s.lag.mean_ms, s.lag.max_ms
                        );
                    }
                    _ = shutdown.wait_for_shutdown() => {
                        debug!("Metrics logger stopping");
                        break;
                    }
                }
            }
        })
    }
}
