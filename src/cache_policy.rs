//! Cacheability Policy Module
//!
//! Decides whether an origin response may be written to the object store.
//! The rules are deliberately narrow: only a 200 is ever stored, and the only
//! Cache-Control directive inspected is the literal `max-age=0`, which origins
//! use to flag content they consider corrupt or invalid.

use hyper::header::{HeaderMap, HeaderValue, CACHE_CONTROL};
use hyper::StatusCode;
use std::fmt;

/// Cache-Control synthesized when forced caching meets a response without one
pub const DEFAULT_CACHE_CONTROL: &str = "public,max-age=300";

/// Why a response was not written to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Target key has a query string, is the root path, or ends with '/'
    UnstorableKey,
    /// Origin answered with something other than 200
    Status(StatusCode),
    /// Cache-Control contains `max-age=0`
    MaxAgeZero,
    /// No Cache-Control and forced caching is off
    NoCacheControl,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnstorableKey => write!(f, "unstorable key"),
            SkipReason::Status(status) => write!(f, "status {}", status.as_u16()),
            SkipReason::MaxAgeZero => write!(f, "cache-control max-age=0"),
            SkipReason::NoCacheControl => write!(f, "no cache-control"),
        }
    }
}

/// Outcome of the store eligibility check for one response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    Store,
    Skip(SkipReason),
}

impl CacheDecision {
    pub fn is_store(&self) -> bool {
        matches!(self, CacheDecision::Store)
    }
}

/// Whether a response may be stored.
///
/// False unless the status is 200. With `force_cache_everything` any 200 is
/// cacheable; otherwise a Cache-Control header must be present and must not
/// contain `max-age=0`.
pub fn is_cacheable(status: StatusCode, headers: &HeaderMap, force_cache_everything: bool) -> bool {
    cacheability(status, headers, force_cache_everything).is_none()
}

fn cacheability(
    status: StatusCode,
    headers: &HeaderMap,
    force_cache_everything: bool,
) -> Option<SkipReason> {
    if status != StatusCode::OK {
        return Some(SkipReason::Status(status));
    }

    if force_cache_everything {
        return None;
    }

    match headers.get(CACHE_CONTROL) {
        None => Some(SkipReason::NoCacheControl),
        Some(value) if contains_max_age_zero(value) => Some(SkipReason::MaxAgeZero),
        Some(_) => None,
    }
}

fn contains_max_age_zero(value: &HeaderValue) -> bool {
    // Non-UTF-8 bytes can still carry the directive, so search the raw bytes
    value
        .as_bytes()
        .windows(b"max-age=0".len())
        .any(|window| window == b"max-age=0")
}

/// Keys with a query component, the root path, and directory-style paths are
/// never written to the store.
pub fn is_storable_key(target_key: &str) -> bool {
    !(target_key.contains('?') || target_key == "/" || target_key.ends_with('/'))
}

/// Insert `default` as Cache-Control when forced caching is on and the origin
/// sent none, so forced entries always carry a finite lifetime.
pub fn apply_default_cache_control(
    headers: &mut HeaderMap,
    force_cache_everything: bool,
    default: &HeaderValue,
) {
    if force_cache_everything && !headers.contains_key(CACHE_CONTROL) {
        headers.insert(CACHE_CONTROL, default.clone());
    }
}

/// Full eligibility check: key rule first, then the response policy.
pub fn evaluate(
    target_key: &str,
    status: StatusCode,
    headers: &HeaderMap,
    force_cache_everything: bool,
) -> CacheDecision {
    if !is_storable_key(target_key) {
        return CacheDecision::Skip(SkipReason::UnstorableKey);
    }

    match cacheability(status, headers, force_cache_everything) {
        None => CacheDecision::Store,
        Some(reason) => CacheDecision::Skip(reason),
    }
}
