//! HTTP/HTTPS Connector for Hyper Connection Pooling
//!
//! Origins and S3-compatible endpoints may be plain HTTP (local MinIO, internal tile
//! servers) or HTTPS, so the connector picks the transport from the URI scheme and
//! hands hyper's pooled client either a raw TCP stream or a rustls stream.

use crate::{ProxyError, Result};
use hyper::Uri;
use hyper_util::client::legacy::connect::{Connected, Connection};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};
use tower::Service;
use tracing::{debug, warn};

/// A connection to an origin or store endpoint, with or without TLS
pub enum MaybeHttpsStream {
    Http(TcpStream),
    Https(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for MaybeHttpsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeHttpsStream::Http(s) => Pin::new(s).poll_read(cx, buf),
            MaybeHttpsStream::Https(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeHttpsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            MaybeHttpsStream::Http(s) => Pin::new(s).poll_write(cx, buf),
            MaybeHttpsStream::Https(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeHttpsStream::Http(s) => Pin::new(s).poll_flush(cx),
            MaybeHttpsStream::Https(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            MaybeHttpsStream::Http(s) => Pin::new(s).poll_shutdown(cx),
            MaybeHttpsStream::Https(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

impl Connection for MaybeHttpsStream {
    fn connected(&self) -> Connected {
        Connected::new()
    }
}

/// Build a rustls connector trusting the platform's root certificates
pub fn native_tls_connector() -> Result<TlsConnector> {
    let mut root_store = rustls::RootCertStore::empty();

    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            let (added, ignored) = root_store.add_parsable_certificates(certs);
            debug!("Loaded {} native root certificates ({} ignored)", added, ignored);
        }
        Err(e) => {
            // Plain-HTTP deployments still work; HTTPS handshakes will fail loudly
            warn!("Failed to load native root certificates: {}", e);
        }
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let tls_config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ProxyError::TlsError(format!("Failed to configure TLS: {}", e)))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(tls_config)))
}

/// Connector implementing the tower::Service trait required by hyper's pooled client
#[derive(Clone)]
pub struct ProxyConnector {
    tls_connector: TlsConnector,
    connect_timeout: Duration,
}

impl ProxyConnector {
    pub fn new(tls_connector: TlsConnector, connect_timeout: Duration) -> Self {
        Self {
            tls_connector,
            connect_timeout,
        }
    }
}

impl Service<Uri> for ProxyConnector {
    type Response = TokioIo<MaybeHttpsStream>;
    type Error = ProxyError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let tls_connector = self.tls_connector.clone();
        let connect_timeout = self.connect_timeout;

        Box::pin(async move {
            let host = uri
                .host()
                .ok_or_else(|| ProxyError::ConfigError(format!("No host in URI: {}", uri)))?
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_string();

            let is_https = match uri.scheme_str() {
                Some("https") => true,
                Some("http") | None => false,
                Some(other) => {
                    return Err(ProxyError::ConfigError(format!(
                        "Unsupported scheme '{}' in {}",
                        other, uri
                    )))
                }
            };
            let port = uri.port_u16().unwrap_or(if is_https { 443 } else { 80 });

            let tcp = tokio::time::timeout(connect_timeout, TcpStream::connect((host.as_str(), port)))
                .await
                .map_err(|_| {
                    ProxyError::TimeoutError(format!(
                        "Connect to {}:{} timed out after {:?}",
                        host, port, connect_timeout
                    ))
                })?
                .map_err(|e| {
                    ProxyError::ConnectionError(format!(
                        "Failed to connect to {}:{}: {}",
                        host, port, e
                    ))
                })?;

            if let Err(e) = tcp.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY for {}:{}: {}", host, port, e);
            }

            if !is_https {
                debug!("TCP connection established to {}:{}", host, port);
                return Ok(TokioIo::new(MaybeHttpsStream::Http(tcp)));
            }

            let server_name = ServerName::try_from(host.clone()).map_err(|e| {
                ProxyError::TlsError(format!("Invalid server name '{}': {}", host, e))
            })?;

            let tls = tls_connector.connect(server_name, tcp).await.map_err(|e| {
                warn!("TLS handshake failed to {}:{}: {}", host, port, e);
                ProxyError::TlsError(format!("TLS handshake failed to {}:{}: {}", host, port, e))
            })?;

            debug!("TLS connection established to {}:{}", host, port);
            Ok(TokioIo::new(MaybeHttpsStream::Https(Box::new(tls))))
        })
    }
}
