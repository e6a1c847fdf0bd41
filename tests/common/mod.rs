//! In-memory stand-ins for the origin and the object store

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use hyper::{HeaderMap, StatusCode};
use siphon::origin_client::{FetchResponse, OriginFetcher};
use siphon::s3_client::{ListPage, ObjectStore};
use siphon::{ProxyError, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Origin that answers every fetch with one canned response, or fails
pub struct FakeOrigin {
    response: Option<FetchResponse>,
    pub requests: Mutex<Vec<(String, HeaderMap)>>,
}

impl FakeOrigin {
    pub fn responding(status: StatusCode, headers: HeaderMap, body: &'static str) -> Self {
        Self {
            response: Some(FetchResponse {
                status,
                headers,
                body: Bytes::from_static(body.as_bytes()),
            }),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            response: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl OriginFetcher for FakeOrigin {
    async fn fetch(&self, url: &str, headers: HeaderMap) -> Result<FetchResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), headers));
        self.response
            .clone()
            .ok_or_else(|| ProxyError::UpstreamUnavailable("connection refused".to_string()))
    }
}

/// A stored object as the store received it
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub headers: HeaderMap,
}

/// Sorted in-memory bucket with S3-like marker pagination
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    page_size: usize,
    pub puts: AtomicUsize,
    pub lists: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_puts: AtomicBool,
    /// Fail the nth delete call (0-based)
    pub fail_delete_at: Mutex<Option<usize>>,
}

impl MemoryStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size,
            puts: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            fail_puts: AtomicBool::new(false),
            fail_delete_at: Mutex::new(None),
        }
    }

    pub fn with_keys(page_size: usize, keys: &[&str]) -> Self {
        let store = Self::new(page_size);
        {
            let mut objects = store.objects.lock().unwrap();
            for key in keys {
                objects.insert(
                    key.to_string(),
                    StoredObject {
                        body: Bytes::new(),
                        headers: HeaderMap::new(),
                    },
                );
            }
        }
        store
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, body: Bytes, headers: HeaderMap) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(ProxyError::StoreError("SlowDown".to_string()));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), StoredObject { body, headers });
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>, marker: Option<&str>) -> Result<ListPage> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().unwrap();

        let mut matching = objects
            .keys()
            .filter(|key| marker.map_or(true, |m| key.as_str() > m))
            .filter(|key| prefix.map_or(true, |p| key.starts_with(p)));

        let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let more = matching.next().is_some();

        Ok(ListPage {
            next_marker: if more { keys.last().cloned() } else { None },
            keys,
        })
    }

    async fn delete_many(&self, keys: &[String]) -> Result<()> {
        let call = self.deletes.fetch_add(1, Ordering::SeqCst);
        if *self.fail_delete_at.lock().unwrap() == Some(call) {
            return Err(ProxyError::StoreError("InternalError".to_string()));
        }
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }
}
