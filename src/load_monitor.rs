//! Load Monitor Module
//!
//! Measures how late the runtime wakes a timer. A smoothed lag above the threshold
//! means the process is saturated and reports itself busy.

use crate::metrics::MetricsManager;
use crate::shutdown::ShutdownSignal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Weight of the newest sample in the smoothed lag
const SMOOTHING: f64 = 1.0 / 3.0;

#[derive(Debug)]
pub struct LoadMonitor {
    threshold: Duration,
    interval: Duration,
    smoothed_lag_micros: AtomicU64,
    metrics: Option<Arc<MetricsManager>>,
}

impl LoadMonitor {
    pub fn new(threshold: Duration, interval: Duration) -> Self {
        Self {
            threshold,
            interval,
            smoothed_lag_micros: AtomicU64::new(0),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsManager>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn lag(&self) -> Duration {
        Duration::from_micros(self.smoothed_lag_micros.load(Ordering::Relaxed))
    }

    pub fn is_busy(&self) -> bool {
        self.lag() > self.threshold
    }

    /// Fold one lag measurement into the smoothed value
    pub fn record_sample(&self, lag: Duration) {
        let sample = lag.as_micros().min(u64::MAX as u128) as f64;
        let previous = self.smoothed_lag_micros.load(Ordering::Relaxed) as f64;
        let smoothed = previous + (sample - previous) * SMOOTHING;
        self.smoothed_lag_micros
            .store(smoothed.round() as u64, Ordering::Relaxed);

        if let Some(metrics) = &self.metrics {
            metrics.record_lag(lag);
        }
    }

    /// Sample lag every interval until shutdown
    pub fn start(self: Arc<Self>, mut shutdown: ShutdownSignal) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            debug!(
                "Load monitor started (interval: {:?}, threshold: {:?})",
                self.interval, self.threshold
            );

            loop {
                let expected = Instant::now() + self.interval;
                tokio::select! {
                    _ = tokio::time::sleep_until(expected) => {
                        let lag = Instant::now().saturating_duration_since(expected);
                        let was_busy = self.is_busy();
                        self.record_sample(lag);
                        if self.is_busy() && !was_busy {
                            warn!("Server is busy: smoothed lag {:?}", self.lag());
                        }
                    }
                    _ = shutdown.wait_for_shutdown() => {
                        debug!("Load monitor stopping");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_monitor_is_not_busy() {
        let monitor = LoadMonitor::new(Duration::from_millis(70), Duration::from_secs(1));
        assert!(!monitor.is_busy());
        assert_eq!(monitor.lag(), Duration::ZERO);
    }

    #[test]
    fn test_smoothing_requires_sustained_lag() {
        let monitor = LoadMonitor::new(Duration::from_millis(70), Duration::from_secs(1));

        // One spike is damped below the threshold
        monitor.record_sample(Duration::from_millis(150));
        assert_eq!(monitor.lag(), Duration::from_millis(50));
        assert!(!monitor.is_busy());

        // Sustained lag crosses it
        monitor.record_sample(Duration::from_millis(150));
        monitor.record_sample(Duration::from_millis(150));
        assert!(monitor.is_busy());

        // And recovery brings it back down
        for _ in 0..10 {
            monitor.record_sample(Duration::ZERO);
        }
        assert!(!monitor.is_busy());
    }

    #[test]
    fn test_samples_are_recorded_in_metrics() {
        let metrics = Arc::new(MetricsManager::new());
        let monitor = LoadMonitor::new(Duration::from_millis(70), Duration::from_secs(1))
            .with_metrics(Arc::clone(&metrics));
        monitor.record_sample(Duration::from_millis(5));
        assert_eq!(metrics.snapshot().lag.samples, 1);
    }
}
