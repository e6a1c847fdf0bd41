//! Siphon - caching reverse proxy with write-behind to S3
//!
//! Requests are answered from the origin while eligible responses are written to an
//! S3 bucket in the background, so a CDN or static host in front of the bucket can
//! serve repeat traffic. A companion purge job empties the bucket.

pub mod cache_policy;
pub mod config;
pub mod connection_pool;
pub mod content_hash;
pub mod error;
pub mod fetch_and_store;
pub mod headers;
pub mod http_proxy;
pub mod https_connector;
pub mod load_monitor;
pub mod logging;
pub mod metrics;
pub mod origin_client;
pub mod purge;
pub mod s3_client;
pub mod shutdown;
pub mod sigv4;

pub use error::{ProxyError, PurgeFailure, Result};
