//! Purge Module
//!
//! Empties the object store (or everything under a key prefix) by alternating a
//! listing call with one bulk delete per page. An empty page always ends the run,
//! whatever marker accompanies it. A non-empty page without a next marker ends it
//! once that page is deleted. Strictly sequential; the first failing call stops
//! the run.

use crate::s3_client::ObjectStore;
use crate::{ProxyError, PurgeFailure};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Shared view of how many keys a running purge has deleted so far
#[derive(Debug, Clone, Default)]
pub struct PurgeProgress {
    deleted: Arc<AtomicU64>,
}

impl PurgeProgress {
    pub fn deleted(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }

    fn set(&self, deleted: u64) {
        self.deleted.store(deleted, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeState {
    Listing,
    Done,
}

#[derive(Debug, Default)]
struct PurgeCursor {
    prefix: Option<String>,
    marker: Option<String>,
    deleted: u64,
}

pub struct PurgeJob {
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
    progress: PurgeProgress,
}

impl PurgeJob {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: Option<String>) -> Self {
        Self {
            store,
            prefix: prefix.filter(|p| !p.is_empty()),
            progress: PurgeProgress::default(),
        }
    }

    pub fn progress(&self) -> PurgeProgress {
        self.progress.clone()
    }

    /// Delete every key under the prefix. Returns the number of keys deleted, or the
    /// partial count together with the error that stopped the run.
    pub async fn run(&self) -> Result<u64, PurgeFailure> {
        let mut cursor = PurgeCursor {
            prefix: self.prefix.clone(),
            ..PurgeCursor::default()
        };

        let mut state = PurgeState::Listing;
        while state == PurgeState::Listing {
            state = self
                .step(&mut cursor)
                .await
                .map_err(|source| PurgeFailure {
                    deleted: cursor.deleted,
                    source,
                })?;
        }

        info!("Purge complete: {} keys deleted", cursor.deleted);
        Ok(cursor.deleted)
    }

    /// `run`, logging the running total every `interval` until it finishes
    pub async fn run_with_progress(&self, interval: Duration) -> Result<u64, PurgeFailure> {
        let run = self.run();
        tokio::pin!(run);

        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                result = &mut run => return result,
                _ = ticker.tick() => {
                    info!("Purge in progress: {} keys deleted", self.progress.deleted());
                }
            }
        }
    }

    async fn step(&self, cursor: &mut PurgeCursor) -> Result<PurgeState, ProxyError> {
        let page = self
            .store
            .list(cursor.prefix.as_deref(), cursor.marker.as_deref())
            .await?;

        if page.keys.is_empty() {
            debug!("Listing returned no keys, purge finished");
            return Ok(PurgeState::Done);
        }

        self.store.delete_many(&page.keys).await?;
        cursor.deleted += page.keys.len() as u64;
        self.progress.set(cursor.deleted);
        debug!(
            "Deleted page of {} keys ({} total)",
            page.keys.len(),
            cursor.deleted
        );

        match page.next_marker {
            Some(marker) => {
                cursor.marker = Some(marker);
                Ok(PurgeState::Listing)
            }
            None => Ok(PurgeState::Done),
        }
    }
}
