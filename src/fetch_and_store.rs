//! Fetch-and-Store Module
//!
//! Fetches a resource from its origin, hands the buffered response straight back to
//! the caller, and writes it behind to the object store when the cacheability rules
//! allow. The caller never waits on, or hears about, the store write.

use crate::cache_policy::{apply_default_cache_control, evaluate, CacheDecision, SkipReason};
use crate::config::Config;
use crate::headers::{store_headers, upstream_headers, StoreObjectOptions};
use crate::metrics::MetricsManager;
use crate::origin_client::{FetchResponse, OriginFetcher};
use crate::s3_client::ObjectStore;
use crate::{ProxyError, Result};
use bytes::Bytes;
use hyper::header::HeaderValue;
use hyper::{HeaderMap, StatusCode};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One fetch: the origin base URL, the path that is both fetched and used as the
/// store key, and the client's request headers.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub origin: String,
    pub target_key: String,
    pub headers: HeaderMap,
}

impl FetchRequest {
    pub fn new(origin: impl Into<String>, target_key: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            origin: origin.into(),
            target_key: target_key.into(),
            headers,
        }
    }

    /// Upstream URL: origin base followed by the target key
    pub fn url(&self) -> String {
        format!("{}{}", self.origin.trim_end_matches('/'), self.target_key)
    }
}

/// What happened to the write-behind for one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored { key: String, bytes: usize },
    Skipped { key: String, reason: SkipReason },
    Failed { key: String, error: String },
}

impl StoreOutcome {
    pub fn key(&self) -> &str {
        match self {
            StoreOutcome::Stored { key, .. }
            | StoreOutcome::Skipped { key, .. }
            | StoreOutcome::Failed { key, .. } => key,
        }
    }
}

/// Store-side settings, fixed at construction
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub cache_everything: bool,
    pub default_cache_control: HeaderValue,
    pub object: StoreObjectOptions,
    pub key_prefix: Option<String>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            cache_everything: false,
            default_cache_control: HeaderValue::from_static(
                crate::cache_policy::DEFAULT_CACHE_CONTROL,
            ),
            object: StoreObjectOptions::default(),
            key_prefix: None,
        }
    }
}

impl StoreOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        let default_cache_control = HeaderValue::from_str(&config.cache.default_cache_control)
            .map_err(|e| {
                ProxyError::ConfigError(format!(
                    "Invalid default_cache_control '{}': {}",
                    config.cache.default_cache_control, e
                ))
            })?;

        Ok(Self {
            cache_everything: config.cache.cache_everything,
            default_cache_control,
            object: StoreObjectOptions::new(&config.store.acl, &config.store.storage_class)?,
            key_prefix: config
                .store
                .key_prefix
                .clone()
                .filter(|prefix| !prefix.is_empty()),
        })
    }

    /// Object key for a target key
    pub fn store_key(&self, target_key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}{}", prefix.trim_end_matches('/'), target_key),
            None => target_key.to_string(),
        }
    }
}

pub struct FetchAndStore {
    origin: Arc<dyn OriginFetcher>,
    store: Arc<dyn ObjectStore>,
    options: Arc<StoreOptions>,
    metrics: Option<Arc<MetricsManager>>,
    outcomes: Option<mpsc::UnboundedSender<StoreOutcome>>,
}

impl FetchAndStore {
    pub fn new(
        origin: Arc<dyn OriginFetcher>,
        store: Arc<dyn ObjectStore>,
        options: StoreOptions,
    ) -> Self {
        Self {
            origin,
            store,
            options: Arc::new(options),
            metrics: None,
            outcomes: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsManager>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Report every store outcome on `sender`
    pub fn with_outcome_channel(mut self, sender: mpsc::UnboundedSender<StoreOutcome>) -> Self {
        self.outcomes = Some(sender);
        self
    }

    /// Fetch `request` from its origin and return the response, whatever its status.
    ///
    /// Only a transport failure is an error, and then nothing is stored. Otherwise
    /// a background task decides whether to store the response and performs at
    /// most one write.
    pub async fn fetch_and_store(&self, request: FetchRequest) -> Result<FetchResponse> {
        let url = request.url();
        let response = self
            .origin
            .fetch(&url, upstream_headers(&request.headers))
            .await
            .map_err(|e| match e {
                ProxyError::UpstreamUnavailable(_) => e,
                other => ProxyError::UpstreamUnavailable(other.to_string()),
            })?;

        // The response is complete before the task is spawned; on a multi-threaded
        // runtime the write may start before the caller resumes, but it never
        // blocks or alters what the caller receives.
        self.spawn_store(
            request.target_key,
            response.status,
            response.headers.clone(),
            response.body.clone(),
        );

        Ok(response)
    }

    fn spawn_store(&self, target_key: String, status: StatusCode, headers: HeaderMap, body: Bytes) {
        let store = Arc::clone(&self.store);
        let options = Arc::clone(&self.options);
        let metrics = self.metrics.clone();
        let outcomes = self.outcomes.clone();

        tokio::spawn(async move {
            let outcome = write_behind(store.as_ref(), &options, target_key, status, headers, body).await;

            if let Some(metrics) = &metrics {
                match &outcome {
                    StoreOutcome::Stored { .. } => metrics.record_store(),
                    StoreOutcome::Skipped { .. } => metrics.record_skip(),
                    StoreOutcome::Failed { .. } => metrics.record_store_failure(),
                }
            }

            if let Some(outcomes) = outcomes {
                // Receiver may be gone; the outcome is already logged
                let _ = outcomes.send(outcome);
            }
        });
    }
}

async fn write_behind(
    store: &dyn ObjectStore,
    options: &StoreOptions,
    target_key: String,
    status: StatusCode,
    mut headers: HeaderMap,
    body: Bytes,
) -> StoreOutcome {
    apply_default_cache_control(
        &mut headers,
        options.cache_everything,
        &options.default_cache_control,
    );

    if let CacheDecision::Skip(reason) =
        evaluate(&target_key, status, &headers, options.cache_everything)
    {
        debug!("Not storing {}: {}", target_key, reason);
        return StoreOutcome::Skipped {
            key: target_key,
            reason,
        };
    }

    let key = options.store_key(&target_key);
    let metadata = match store_headers(&headers, &body, &options.object) {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!("Failed to build store headers for {}: {}", key, e);
            return StoreOutcome::Failed {
                key,
                error: e.to_string(),
            };
        }
    };

    let bytes = body.len();
    match store.put(&key, body, metadata).await {
        Ok(()) => {
            debug!("Stored {} ({} bytes)", key, bytes);
            StoreOutcome::Stored { key, bytes }
        }
        Err(e) => {
            warn!("Store write failed for {}: {}", key, e);
            StoreOutcome::Failed {
                key,
                error: e.to_string(),
            }
        }
    }
}
