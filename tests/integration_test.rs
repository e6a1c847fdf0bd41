//! End-to-end tests: client -> proxy -> origin, with write-behind to a mock S3

use hyper::header::{HeaderMap, CONTENT_TYPE};
use hyper::StatusCode;
use siphon::config::{ConnectionPoolConfig, StoreConfig};
use siphon::fetch_and_store::{FetchAndStore, StoreOptions, StoreOutcome};
use siphon::http_proxy::{HttpProxy, RouteTable};
use siphon::metrics::MetricsManager;
use siphon::origin_client::{OriginClient, OriginFetcher};
use siphon::s3_client::S3Client;
use siphon::shutdown::ShutdownCoordinator;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestProxy {
    base_url: String,
    client: OriginClient,
    metrics: Arc<MetricsManager>,
    outcomes: mpsc::UnboundedReceiver<StoreOutcome>,
    coordinator: ShutdownCoordinator,
}

impl TestProxy {
    async fn start(origin: &MockServer, s3: &MockServer) -> Self {
        let pool = ConnectionPoolConfig::default();
        let store_config = StoreConfig {
            endpoint: s3.uri(),
            bucket: "test".to_string(),
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            ..StoreConfig::default()
        };

        let origin_client = Arc::new(OriginClient::new(&pool, Duration::from_secs(5)).unwrap());
        let store = Arc::new(S3Client::new(&store_config, &pool).unwrap());
        let metrics = Arc::new(MetricsManager::new());
        let (tx, outcomes) = mpsc::unbounded_channel();

        let options = StoreOptions {
            cache_everything: true,
            ..StoreOptions::default()
        };
        let fetcher = Arc::new(
            FetchAndStore::new(origin_client.clone(), store, options)
                .with_metrics(metrics.clone())
                .with_outcome_channel(tx),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let proxy = Arc::new(HttpProxy::new(
            addr,
            RouteTable::new(origin.uri(), &BTreeMap::new()),
            fetcher,
            origin_client,
            metrics.clone(),
        ));

        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        let signal = coordinator.signal();
        tokio::spawn(async move {
            proxy.serve(listener, signal).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            client: OriginClient::new(&pool, Duration::from_secs(5)).unwrap(),
            metrics,
            outcomes,
            coordinator,
        }
    }

    async fn get(&self, target: &str) -> siphon::origin_client::FetchResponse {
        self.client
            .fetch(&format!("{}{}", self.base_url, target), HeaderMap::new())
            .await
            .unwrap()
    }

    async fn next_outcome(&mut self) -> StoreOutcome {
        tokio::time::timeout(Duration::from_secs(5), self.outcomes.recv())
            .await
            .expect("store outcome not reported")
            .expect("outcome channel closed")
    }
}

#[tokio::test]
async fn test_get_resource_served_and_written_behind() {
    let origin = MockServer::start().await;
    let s3 = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/resource"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/plain")
                .set_body_string("ok"),
        )
        .expect(1)
        .mount(&origin)
        .await;

    Mock::given(method("PUT"))
        .and(path("/test/resource"))
        .and(header("x-amz-acl", "public-read"))
        .and(header("cache-control", "public,max-age=300"))
        .and(header("content-md5", "REvLOj/Pg4kpbElGfyfh1g=="))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&s3)
        .await;

    let mut proxy = TestProxy::start(&origin, &s3).await;

    let response = proxy.get("/resource").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers.get(CONTENT_TYPE).unwrap(), "text/plain");
    assert_eq!(&response.body[..], b"ok");

    assert_eq!(
        proxy.next_outcome().await,
        StoreOutcome::Stored {
            key: "/resource".to_string(),
            bytes: 2
        }
    );

    let puts = s3.received_requests().await.unwrap();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].body, b"ok");
    assert_eq!(proxy.metrics.snapshot().store, 1);
}

#[tokio::test]
async fn test_origin_error_becomes_unavailable_and_is_not_stored() {
    let origin = MockServer::start().await;
    let s3 = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&origin)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&s3)
        .await;

    let mut proxy = TestProxy::start(&origin, &s3).await;

    let response = proxy.get("/resource").await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.body.is_empty());

    assert!(matches!(
        proxy.next_outcome().await,
        StoreOutcome::Skipped { .. }
    ));
    assert!(s3.received_requests().await.unwrap().is_empty());
    assert_eq!(proxy.metrics.snapshot().error, 1);
}

#[tokio::test]
async fn test_origin_not_found_passes_through_empty() {
    let origin = MockServer::start().await;
    let s3 = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("missing page"))
        .mount(&origin)
        .await;

    let mut proxy = TestProxy::start(&origin, &s3).await;

    let response = proxy.get("/missing.png").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body.is_empty());

    proxy.next_outcome().await;
    assert!(s3.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_favicon_answered_locally() {
    let origin = MockServer::start().await;
    let s3 = MockServer::start().await;

    let proxy = TestProxy::start(&origin, &s3).await;

    let response = proxy.get("/favicon.ico").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(origin.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_query_request_passes_through_without_store() {
    let origin = MockServer::start().await;
    let s3 = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "tiles"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-origin", "yes")
                .set_body_string("results"),
        )
        .expect(1)
        .mount(&origin)
        .await;

    let proxy = TestProxy::start(&origin, &s3).await;

    let response = proxy.get("/search?q=tiles").await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.headers.get("x-origin").unwrap(), "yes");
    assert_eq!(&response.body[..], b"results");

    assert!(s3.received_requests().await.unwrap().is_empty());
    assert_eq!(proxy.metrics.snapshot().pass, 1);
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let origin = MockServer::start().await;
    let s3 = MockServer::start().await;
    let proxy = TestProxy::start(&origin, &s3).await;

    proxy.coordinator.initiate_shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = proxy
        .client
        .fetch(&format!("{}/resource", proxy.base_url), HeaderMap::new())
        .await;
    assert!(err.is_err());
}
