//! Header Projection Module
//!
//! Two independent allow-lists. Nothing is ever copied wholesale between the
//! client, the origin, and the object store.

use crate::content_hash::{content_md5_for, CONTENT_MD5};
use crate::{ProxyError, Result};
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, CONNECTION, CONTENT_TYPE, HOST,
    PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, REFERER, TE, TRAILER, TRANSFER_ENCODING, UPGRADE,
    USER_AGENT,
};

pub const X_AMZ_ACL: HeaderName = HeaderName::from_static("x-amz-acl");
pub const X_AMZ_STORAGE_CLASS: HeaderName = HeaderName::from_static("x-amz-storage-class");
pub const SURROGATE_CONTROL: HeaderName = HeaderName::from_static("surrogate-control");
pub const SURROGATE_KEY: HeaderName = HeaderName::from_static("surrogate-key");
pub const META_SURROGATE_CONTROL: HeaderName =
    HeaderName::from_static("x-amz-meta-surrogate-control");
pub const META_SURROGATE_KEY: HeaderName = HeaderName::from_static("x-amz-meta-surrogate-key");

/// Fixed per-object store settings applied to every write
#[derive(Debug, Clone)]
pub struct StoreObjectOptions {
    pub acl: HeaderValue,
    pub storage_class: HeaderValue,
}

impl StoreObjectOptions {
    pub fn new(acl: &str, storage_class: &str) -> Result<Self> {
        let parse = |name: &str, value: &str| {
            HeaderValue::from_str(value).map_err(|e| {
                ProxyError::ConfigError(format!("Invalid {} '{}': {}", name, value, e))
            })
        };
        Ok(Self {
            acl: parse("acl", acl)?,
            storage_class: parse("storage_class", storage_class)?,
        })
    }
}

impl Default for StoreObjectOptions {
    fn default() -> Self {
        Self {
            acl: HeaderValue::from_static("public-read"),
            storage_class: HeaderValue::from_static("REDUCED_REDUNDANCY"),
        }
    }
}

/// Headers forwarded from the client to the origin: User-Agent and Referer only.
/// Cookies, credentials and hop-by-hop headers never reach the origin.
pub fn upstream_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in [USER_AGENT, REFERER] {
        if let Some(value) = inbound.get(&name) {
            headers.insert(name, value.clone());
        }
    }
    headers
}

const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

/// Remove connection-scoped headers, including any named by `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }

    for name in [
        CONNECTION,
        KEEP_ALIVE,
        PROXY_AUTHENTICATE,
        PROXY_AUTHORIZATION,
        TE,
        TRAILER,
        TRANSFER_ENCODING,
        UPGRADE,
    ] {
        headers.remove(name);
    }
}

/// Headers for a pass-through request: everything except hop-by-hop and Host
pub fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(HOST);
    headers
}

/// Metadata headers for an object written to the store.
///
/// `origin_headers` must already carry any synthesized Cache-Control.
pub fn store_headers(
    origin_headers: &HeaderMap,
    body: &[u8],
    options: &StoreObjectOptions,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(X_AMZ_ACL, options.acl.clone());
    headers.insert(X_AMZ_STORAGE_CLASS, options.storage_class.clone());

    if let Some(content_type) = origin_headers.get(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, content_type.clone());
    }

    headers.insert(CONTENT_MD5, content_md5_for(origin_headers, body)?);

    if let Some(cache_control) = origin_headers.get(CACHE_CONTROL) {
        headers.insert(CACHE_CONTROL, cache_control.clone());
    }

    // Surrogate hints ride along as user metadata for the CDN in front of the bucket
    if let Some(value) = origin_headers.get(SURROGATE_CONTROL) {
        headers.insert(META_SURROGATE_CONTROL, value.clone());
    }
    if let Some(value) = origin_headers.get(SURROGATE_KEY) {
        headers.insert(META_SURROGATE_KEY, value.clone());
    }

    Ok(headers)
}
