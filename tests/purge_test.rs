//! Purge job against a paginating in-memory store

mod common;

use async_trait::async_trait;
use bytes::Bytes;
use common::MemoryStore;
use hyper::HeaderMap;
use siphon::purge::PurgeJob;
use siphon::s3_client::{ListPage, ObjectStore};
use siphon::{ProxyError, Result};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Holds the second listing call until released, so a run can be observed mid-way
struct GatedStore {
    inner: MemoryStore,
    paused: Notify,
    release: Notify,
}

impl GatedStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            paused: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl ObjectStore for GatedStore {
    async fn put(&self, key: &str, body: Bytes, headers: HeaderMap) -> Result<()> {
        self.inner.put(key, body, headers).await
    }

    async fn list(&self, prefix: Option<&str>, marker: Option<&str>) -> Result<ListPage> {
        if self.inner.lists.load(Ordering::SeqCst) == 1 {
            self.paused.notify_one();
            self.release.notified().await;
        }
        self.inner.list(prefix, marker).await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<()> {
        self.inner.delete_many(keys).await
    }
}

#[tokio::test]
async fn test_two_pages_two_lists_two_deletes() {
    let store = Arc::new(MemoryStore::with_keys(2, &["a", "b", "c"]));
    let job = PurgeJob::new(store.clone(), None);

    assert_eq!(job.run().await.unwrap(), 3);
    assert_eq!(store.lists.load(Ordering::SeqCst), 2);
    assert_eq!(store.deletes.load(Ordering::SeqCst), 2);
    assert!(store.keys().is_empty());

    // A second run over the now empty store
    let again = PurgeJob::new(store.clone(), None);
    assert_eq!(again.run().await.unwrap(), 0);
    assert_eq!(store.lists.load(Ordering::SeqCst), 3);
    assert_eq!(store.deletes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_empty_store_one_list_no_deletes() {
    let store = Arc::new(MemoryStore::new(1000));
    let job = PurgeJob::new(store.clone(), None);

    assert_eq!(job.run().await.unwrap(), 0);
    assert_eq!(store.lists.load(Ordering::SeqCst), 1);
    assert_eq!(store.deletes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_prefix_limits_deletion() {
    let store = Arc::new(MemoryStore::with_keys(
        2,
        &["osm/1", "osm/2", "osm/3", "sat/1", "sat/2"],
    ));
    let job = PurgeJob::new(store.clone(), Some("osm/".to_string()));

    assert_eq!(job.run().await.unwrap(), 3);
    assert_eq!(store.keys(), vec!["sat/1", "sat/2"]);
}

#[tokio::test]
async fn test_delete_failure_aborts_with_partial_count() {
    let store = Arc::new(MemoryStore::with_keys(2, &["a", "b", "c", "d", "e"]));
    *store.fail_delete_at.lock().unwrap() = Some(1);
    let job = PurgeJob::new(store.clone(), None);
    let progress = job.progress();

    let failure = job.run().await.unwrap_err();
    assert_eq!(failure.deleted, 2);
    assert!(matches!(failure.source, ProxyError::StoreError(_)));
    assert_eq!(progress.deleted(), 2);
    assert_eq!(store.keys(), vec!["c", "d", "e"]);
    assert!(failure.to_string().contains("after deleting 2 keys"));
}

#[tokio::test]
async fn test_many_pages() {
    let keys: Vec<String> = (0..2500).map(|i| format!("tiles/{:05}.png", i)).collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let store = Arc::new(MemoryStore::with_keys(1000, &key_refs));

    let job = PurgeJob::new(store.clone(), None);
    assert_eq!(job.run().await.unwrap(), 2500);
    assert_eq!(store.lists.load(Ordering::SeqCst), 3);
    assert_eq!(store.deletes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_progress_visible_while_run_is_pending() {
    let store = Arc::new(GatedStore::new(MemoryStore::with_keys(2, &["a", "b", "c"])));
    let job = Arc::new(PurgeJob::new(store.clone(), None));
    let progress = job.progress();

    let running = {
        let job = Arc::clone(&job);
        tokio::spawn(async move { job.run_with_progress(Duration::from_secs(5)).await })
    };

    // First page deleted, second listing held
    tokio::time::timeout(Duration::from_secs(5), store.paused.notified())
        .await
        .expect("purge never reached the second listing");
    assert_eq!(progress.deleted(), 2);
    assert!(!running.is_finished());
    assert_eq!(store.inner.keys(), vec!["c"]);

    store.release.notify_one();
    let deleted = running.await.unwrap().unwrap();
    assert_eq!(deleted, 3);
    assert_eq!(progress.deleted(), 3);
}
