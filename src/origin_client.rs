//! Origin Client Module
//!
//! Transport to the upstream origin: buffered GETs for the fetch-and-store path and
//! streaming forwarding for pass-through requests.

use crate::config::ConnectionPoolConfig;
use crate::connection_pool::{full_body, OutboundBody, PooledClient};
use crate::{ProxyError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use hyper::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use std::time::Duration;
use tracing::debug;

/// An origin response with the body fully buffered
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Whole-body GET against an origin
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    /// Fetch `url` with exactly `headers`. Any HTTP status is a successful fetch;
    /// only transport failures are errors.
    async fn fetch(&self, url: &str, headers: HeaderMap) -> Result<FetchResponse>;
}

pub struct OriginClient {
    client: PooledClient,
}

fn parse_url(url: &str) -> Result<Uri> {
    url.parse::<Uri>()
        .map_err(|e| ProxyError::InvalidRequest(format!("Invalid origin URL '{}': {}", url, e)))
}

impl OriginClient {
    pub fn new(pool: &ConnectionPoolConfig, request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: PooledClient::new("origin", pool, request_timeout)?,
        })
    }

    /// Stream a request through to `url` and return the origin's response unbuffered
    pub async fn forward(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: OutboundBody,
    ) -> Result<Response<OutboundBody>> {
        let mut request = Request::builder()
            .method(method)
            .uri(parse_url(url)?)
            .body(body)?;
        *request.headers_mut() = headers;

        self.client
            .send_streaming(request)
            .await
            .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))
    }
}

#[async_trait]
impl OriginFetcher for OriginClient {
    async fn fetch(&self, url: &str, headers: HeaderMap) -> Result<FetchResponse> {
        let mut request = Request::get(parse_url(url)?).body(full_body(Bytes::new()))?;
        *request.headers_mut() = headers;

        let response = self
            .client
            .send(request)
            .await
            .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))?;

        debug!(
            "Origin responded: url={}, status={}, bytes={}",
            url,
            response.status.as_u16(),
            response.body.len()
        );

        Ok(FetchResponse {
            status: response.status,
            headers: response.headers,
            body: response.body,
        })
    }
}
