//! Graceful Shutdown Module
//!
//! Handles SIGINT/SIGTERM, tells every accept loop and background task to stop, and
//! gives in-flight requests a bounded window to drain.

use crate::{ProxyError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Shutdown coordinator for graceful system shutdown
pub struct ShutdownCoordinator {
    shutdown_sender: broadcast::Sender<()>,
    shutdown_timeout: Duration,
    /// Requests currently being served, drained before shutdown completes
    in_flight: Option<Arc<AtomicUsize>>,
}

impl ShutdownCoordinator {
    pub fn new(shutdown_timeout: Duration) -> Self {
        let (shutdown_sender, _) = broadcast::channel(16);

        Self {
            shutdown_sender,
            shutdown_timeout,
            in_flight: None,
        }
    }

    /// Set the in-flight request counter to drain on shutdown
    pub fn set_in_flight_counter(&mut self, in_flight: Arc<AtomicUsize>) {
        self.in_flight = Some(in_flight);
    }

    /// Get shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_sender.subscribe()
    }

    pub fn signal(&self) -> ShutdownSignal {
        ShutdownSignal::new(self.subscribe())
    }

    /// Wait for SIGINT or SIGTERM, then shut down
    pub async fn listen_for_shutdown(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        let mut sigint =
            signal::unix::signal(signal::unix::SignalKind::interrupt()).map_err(|e| {
                ProxyError::SystemError(format!("Failed to create SIGINT handler: {}", e))
            })?;

        let mut sigterm =
            signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
                ProxyError::SystemError(format!("Failed to create SIGTERM handler: {}", e))
            })?;

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
        }

        self.initiate_shutdown().await
    }

    /// Broadcast shutdown and wait for in-flight requests to finish
    pub async fn initiate_shutdown(&self) -> Result<()> {
        info!("Initiating graceful shutdown sequence");

        if let Err(e) = self.shutdown_sender.send(()) {
            // No receivers left is normal late in shutdown
            debug!("Shutdown signal not sent (no active receivers): {}", e);
        }

        let Some(in_flight) = &self.in_flight else {
            return Ok(());
        };

        match timeout(self.shutdown_timeout, drain(in_flight)).await {
            Ok(()) => {
                info!("Graceful shutdown completed successfully");
                Ok(())
            }
            Err(_) => {
                error!(
                    "Graceful shutdown timed out after {:?} with {} requests in flight",
                    self.shutdown_timeout,
                    in_flight.load(Ordering::Relaxed)
                );
                Err(ProxyError::TimeoutError(
                    "Graceful shutdown timeout".to_string(),
                ))
            }
        }
    }
}

async fn drain(in_flight: &AtomicUsize) {
    loop {
        let remaining = in_flight.load(Ordering::Relaxed);
        if remaining == 0 {
            return;
        }
        debug!("Waiting for {} in-flight requests", remaining);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Shutdown signal wrapper for components
pub struct ShutdownSignal {
    receiver: broadcast::Receiver<()>,
    shutdown_requested: bool,
}

impl ShutdownSignal {
    pub fn new(receiver: broadcast::Receiver<()>) -> Self {
        Self {
            receiver,
            shutdown_requested: false,
        }
    }

    /// Check if shutdown has been requested (non-blocking)
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Wait for shutdown signal. A closed or lagged channel counts as shutdown.
    pub async fn wait_for_shutdown(&mut self) {
        match self.receiver.recv().await {
            Ok(()) => {}
            Err(broadcast::error::RecvError::Closed) => {
                warn!("Shutdown channel closed, treating as shutdown");
            }
            Err(broadcast::error::RecvError::Lagged(_)) => {}
        }
        self.shutdown_requested = true;
    }
}
