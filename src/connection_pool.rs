//! Connection Pool Module
//!
//! Keep-alive HTTP client shared by every request to one upstream (the origin or the
//! object store). hyper-util owns the idle connection pool; a semaphore caps how many
//! requests may be in flight at once, so the pool can never grow without bound.

use crate::config::ConnectionPoolConfig;
use crate::https_connector::{native_tls_connector, ProxyConnector};
use crate::{ProxyError, Result};
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Incoming;
use hyper::{HeaderMap, Request, Response, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Request body type accepted by the pooled client
pub type OutboundBody = BoxBody<Bytes, hyper::Error>;

/// Wrap a fully buffered body for sending
pub fn full_body(body: impl Into<Bytes>) -> OutboundBody {
    Full::new(body.into())
        .map_err(|never| match never {})
        .boxed()
}

/// An upstream response with its body read to the end
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct PooledClient {
    name: &'static str,
    client: Client<ProxyConnector, OutboundBody>,
    permits: Arc<Semaphore>,
    max_connections: usize,
    request_timeout: Duration,
}

impl PooledClient {
    pub fn new(
        name: &'static str,
        config: &ConnectionPoolConfig,
        request_timeout: Duration,
    ) -> Result<Self> {
        config.validate().map_err(ProxyError::ConfigError)?;

        let connector = ProxyConnector::new(native_tls_connector()?, config.connect_timeout);

        debug!(
            "Creating {} client (max_connections: {}, idle_timeout: {}s, max_idle_per_host: {})",
            name,
            config.max_connections,
            config.idle_timeout.as_secs(),
            config.max_idle_per_host
        );

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.idle_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build(connector);

        Ok(Self {
            name,
            client,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
            request_timeout,
        })
    }

    /// Requests currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.max_connections - self.permits.available_permits()
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| ProxyError::SystemError(format!("{} client closed: {}", self.name, e)))
    }

    async fn dispatch(&self, request: Request<OutboundBody>) -> Result<Response<Incoming>> {
        self.client.request(request).await.map_err(|e| {
            ProxyError::ConnectionError(format!("{} request failed: {}", self.name, e))
        })
    }

    /// Send a request and read the whole response body.
    ///
    /// The request timeout covers connecting, the response head and the body.
    pub async fn send(&self, request: Request<OutboundBody>) -> Result<BufferedResponse> {
        let _permit = self.acquire().await?;
        let uri = request.uri().clone();

        let exchange = async {
            let response = self.dispatch(request).await?;
            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| {
                    ProxyError::ConnectionError(format!(
                        "Failed to read {} response body: {}",
                        self.name, e
                    ))
                })?
                .to_bytes();

            Ok(BufferedResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        };

        tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| {
                ProxyError::TimeoutError(format!(
                    "{} request to {} timed out after {:?}",
                    self.name, uri, self.request_timeout
                ))
            })?
    }

    /// Send a request and return the response with its body still streaming.
    ///
    /// The slot is released when the returned body is dropped. Only the response
    /// head is subject to the request timeout.
    pub async fn send_streaming(
        &self,
        request: Request<OutboundBody>,
    ) -> Result<Response<OutboundBody>> {
        let permit = self.acquire().await?;
        let uri = request.uri().clone();

        let response = tokio::time::timeout(self.request_timeout, self.dispatch(request))
            .await
            .map_err(|_| {
                ProxyError::TimeoutError(format!(
                    "{} request to {} timed out after {:?}",
                    self.name, uri, self.request_timeout
                ))
            })??;

        Ok(response.map(move |body| {
            body.map_frame(move |frame| {
                let _slot = &permit;
                frame
            })
            .boxed()
        }))
    }
}
