//! HTTP Proxy Module
//!
//! Inbound HTTP/1.1 server. Routes each request to an origin, streams uncacheable
//! requests straight through, and answers everything else via fetch-and-store.

use crate::config::OriginConfig;
use crate::connection_pool::{full_body, OutboundBody};
use crate::fetch_and_store::{FetchAndStore, FetchRequest};
use crate::headers::{forwarded_headers, strip_hop_by_hop};
use crate::load_monitor::LoadMonitor;
use crate::metrics::MetricsManager;
use crate::origin_client::OriginClient;
use crate::shutdown::ShutdownSignal;
use crate::Result;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::CONTENT_LENGTH;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Path prefix to origin mapping. The longest matching prefix wins; paths matching
/// no prefix go to the default origin.
#[derive(Debug, Clone)]
pub struct RouteTable {
    default_origin: String,
    // Longest prefix first
    routes: Vec<(String, String)>,
}

impl RouteTable {
    pub fn new(default_origin: impl Into<String>, routes: &BTreeMap<String, String>) -> Self {
        let mut routes: Vec<(String, String)> = routes
            .iter()
            .map(|(prefix, origin)| (prefix.clone(), origin.clone()))
            .collect();
        routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            default_origin: default_origin.into(),
            routes,
        }
    }

    pub fn from_config(config: &OriginConfig) -> Self {
        Self::new(config.url.clone(), &config.routes)
    }

    /// Origin base URL serving `path`. A prefix only matches whole path segments.
    pub fn resolve(&self, path: &str) -> &str {
        self.routes
            .iter()
            .find(|(prefix, _)| prefix_matches(prefix, path))
            .map(|(_, origin)| origin.as_str())
            .unwrap_or(&self.default_origin)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || prefix.ends_with('/') || rest.starts_with('/'),
        None => false,
    }
}

/// Decrements the in-flight count when the request finishes
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// HTTP proxy server
pub struct HttpProxy {
    listen_addr: SocketAddr,
    routes: Arc<RouteTable>,
    fetcher: Arc<FetchAndStore>,
    origin: Arc<OriginClient>,
    load_monitor: Option<Arc<LoadMonitor>>,
    metrics: Arc<MetricsManager>,
    in_flight: Arc<AtomicUsize>,
}

impl HttpProxy {
    pub fn new(
        listen_addr: SocketAddr,
        routes: RouteTable,
        fetcher: Arc<FetchAndStore>,
        origin: Arc<OriginClient>,
        metrics: Arc<MetricsManager>,
    ) -> Self {
        Self {
            listen_addr,
            routes: Arc::new(routes),
            fetcher,
            origin,
            load_monitor: None,
            metrics,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_load_monitor(&mut self, load_monitor: Arc<LoadMonitor>) {
        self.load_monitor = Some(load_monitor);
    }

    /// Requests currently being handled
    pub fn in_flight_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.in_flight)
    }

    /// Bind the configured address and serve until shutdown
    pub async fn start(self: Arc<Self>, shutdown_signal: ShutdownSignal) -> Result<()> {
        let listener = TcpListener::bind(self.listen_addr).await?;
        info!("HTTP proxy listening on {}", self.listen_addr);
        self.serve(listener, shutdown_signal).await
    }

    /// Accept connections on `listener` until shutdown
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown_signal: ShutdownSignal,
    ) -> Result<()> {
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            debug!("HTTP connection from {}", addr);

                            if let Err(e) = stream.set_nodelay(true) {
                                warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                            }

                            let proxy = Arc::clone(&self);
                            tokio::spawn(async move {
                                proxy.serve_connection(stream, addr).await;
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept HTTP connection: {}", e);
                        }
                    }
                }
                _ = shutdown_signal.wait_for_shutdown() => {
                    info!("HTTP proxy received shutdown signal, stopping accept loop");
                    break;
                }
            }
        }

        info!("HTTP proxy stopped accepting connections");
        Ok(())
    }

    async fn serve_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req| {
            let proxy = Arc::clone(&self);
            async move { proxy.handle_request(req).await }
        });

        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
            if err.is_incomplete_message() || err.is_canceled() {
                debug!("Client disconnected from {}: {}", addr, err);
            } else {
                error!("Error serving HTTP connection from {}: {}", addr, err);
            }
        }
    }

    /// Handle a single HTTP request
    pub async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> std::result::Result<Response<OutboundBody>, Infallible> {
        let _guard = InFlightGuard::new(&self.in_flight);
        self.metrics.record_request();

        let path = req.uri().path().to_string();
        if path == "/favicon.ico" {
            return Ok(empty_response(StatusCode::NOT_FOUND));
        }

        if let Some(monitor) = &self.load_monitor {
            if monitor.is_busy() {
                // Counted, never rejected
                self.metrics.record_busy();
            }
        }

        let origin = self.routes.resolve(&path).to_string();

        if path == "/" || req.uri().query().is_some() {
            self.metrics.record_pass();
            return Ok(self.pass_through(req, &origin).await);
        }

        let request = FetchRequest::new(origin, path, req.headers().clone());
        let target = request.target_key.clone();

        let response = match self.fetcher.fetch_and_store(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Fetch failed for {}: {}", target, e);
                self.metrics.record_error();
                return Ok(empty_response(StatusCode::SERVICE_UNAVAILABLE));
            }
        };

        match response.status {
            StatusCode::OK => {
                let mut headers = response.headers;
                strip_hop_by_hop(&mut headers);
                headers.remove(CONTENT_LENGTH);

                let mut reply = Response::new(full_body(response.body));
                *reply.headers_mut() = headers;
                Ok(reply)
            }
            StatusCode::NOT_FOUND => Ok(empty_response(StatusCode::NOT_FOUND)),
            status => {
                debug!("Origin returned {} for {}", status.as_u16(), target);
                self.metrics.record_error();
                Ok(empty_response(StatusCode::SERVICE_UNAVAILABLE))
            }
        }
    }

    async fn pass_through(&self, req: Request<Incoming>, origin: &str) -> Response<OutboundBody> {
        let (parts, body) = req.into_parts();
        let target = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", origin.trim_end_matches('/'), target);

        match self
            .origin
            .forward(
                parts.method,
                &url,
                forwarded_headers(&parts.headers),
                body.boxed(),
            )
            .await
        {
            Ok(mut response) => {
                strip_hop_by_hop(response.headers_mut());
                response
            }
            Err(e) => {
                warn!("Pass-through to {} failed: {}", url, e);
                self.metrics.record_error();
                empty_response(StatusCode::SERVICE_UNAVAILABLE)
            }
        }
    }
}

fn empty_response(status: StatusCode) -> Response<OutboundBody> {
    let mut response = Response::new(full_body(bytes::Bytes::new()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        let mut routes = BTreeMap::new();
        routes.insert("/tiles".to_string(), "http://tiles.internal".to_string());
        routes.insert("/tiles/osm".to_string(), "http://osm.internal".to_string());
        routes.insert("/static/".to_string(), "http://static.internal".to_string());
        RouteTable::new("http://default.internal", &routes)
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = table();
        assert_eq!(table.resolve("/tiles/osm/1/2/3.png"), "http://osm.internal");
        assert_eq!(table.resolve("/tiles/other/1.png"), "http://tiles.internal");
        assert_eq!(table.resolve("/tiles"), "http://tiles.internal");
    }

    #[test]
    fn test_prefix_matches_whole_segments() {
        let table = table();
        assert_eq!(table.resolve("/tilesets/1.png"), "http://default.internal");
        assert_eq!(table.resolve("/static/app.js"), "http://static.internal");
    }

    #[test]
    fn test_unmatched_goes_to_default() {
        let table = table();
        assert_eq!(table.resolve("/"), "http://default.internal");
        assert_eq!(table.resolve("/other"), "http://default.internal");
        assert_eq!(table.len(), 3);

        let empty = RouteTable::new("http://only.internal", &BTreeMap::new());
        assert!(empty.is_empty());
        assert_eq!(empty.resolve("/tiles/1"), "http://only.internal");
    }
}
