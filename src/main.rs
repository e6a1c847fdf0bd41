use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use siphon::{
    config::Config,
    fetch_and_store::{FetchAndStore, StoreOptions},
    http_proxy::{HttpProxy, RouteTable},
    load_monitor::LoadMonitor,
    logging::LoggerManager,
    metrics::MetricsManager,
    origin_client::OriginClient,
    s3_client::S3Client,
    shutdown::{ShutdownCoordinator, ShutdownSignal},
    ProxyError, Result,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Start metrics HTTP server
async fn start_metrics_server(
    addr: SocketAddr,
    metrics_manager: Arc<MetricsManager>,
    mut shutdown_signal: ShutdownSignal,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ProxyError::IoError(format!("Failed to bind metrics server: {}", e)))?;

    info!("Metrics server listening on {}", addr);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (stream, _) = accept_result.map_err(|e| {
                    ProxyError::IoError(format!("Failed to accept connection: {}", e))
                })?;

                let io = TokioIo::new(stream);
                let metrics_manager_clone = metrics_manager.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let metrics_manager = metrics_manager_clone.clone();
                        async move { metrics_manager.handle_metrics_request(req).await }
                    });

                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        error!("Error serving metrics connection: {}", e);
                    }
                });
            }
            _ = shutdown_signal.wait_for_shutdown() => {
                info!("Metrics server received shutdown signal");
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    let logger = LoggerManager::for_local_host(config.logging.clone());
    logger.initialize("siphon.log")?;

    info!(
        "Starting siphon v{} (built: {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIMESTAMP")
    );
    info!("HTTP port: {}", config.server.http_port);
    config.log_summary();

    let mut shutdown_coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);

    let metrics_manager = Arc::new(MetricsManager::new());

    let origin_client = Arc::new(OriginClient::new(
        &config.connection_pool,
        config.origin.request_timeout,
    )?);
    let s3_client = Arc::new(S3Client::new(&config.store, &config.connection_pool)?);

    let fetcher = FetchAndStore::new(
        origin_client.clone(),
        s3_client,
        StoreOptions::from_config(&config)?,
    )
    .with_metrics(metrics_manager.clone());

    let load_monitor = Arc::new(
        LoadMonitor::new(
            config.server.busy_lag_threshold,
            config.server.lag_sample_interval,
        )
        .with_metrics(metrics_manager.clone()),
    );
    let _load_monitor_task = load_monitor.clone().start(shutdown_coordinator.signal());

    // Bind to [::] for IPv6 dual-stack (accepts both IPv4 and IPv6)
    let http_addr = SocketAddr::from(([0, 0, 0, 0, 0, 0, 0, 0], config.server.http_port));
    let mut http_proxy = HttpProxy::new(
        http_addr,
        RouteTable::from_config(&config.origin),
        Arc::new(fetcher),
        origin_client,
        metrics_manager.clone(),
    );
    http_proxy.set_load_monitor(load_monitor);
    shutdown_coordinator.set_in_flight_counter(http_proxy.in_flight_counter());
    let http_proxy = Arc::new(http_proxy);

    let _metrics_tasks = if config.metrics.enabled {
        let log_task = metrics_manager
            .clone()
            .start_periodic_logging(config.metrics.log_interval, shutdown_coordinator.signal());

        let server_task = config.metrics.port.map(|port| {
            info!("Starting metrics server on port {}", port);
            let metrics_addr = SocketAddr::from(([0, 0, 0, 0, 0, 0, 0, 0], port));
            let metrics_manager_clone = metrics_manager.clone();
            let metrics_shutdown = shutdown_coordinator.signal();

            tokio::spawn(async move {
                if let Err(e) =
                    start_metrics_server(metrics_addr, metrics_manager_clone, metrics_shutdown)
                        .await
                {
                    error!("Metrics server failed: {}", e);
                }
            })
        });

        Some((log_task, server_task))
    } else {
        info!("Metrics disabled");
        None
    };

    let http_shutdown = shutdown_coordinator.signal();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_proxy.start(http_shutdown).await {
            error!("HTTP proxy failed: {}", e);
        }
    });

    let shutdown_task = tokio::spawn(async move {
        if let Err(e) = shutdown_coordinator.listen_for_shutdown().await {
            error!("Shutdown coordinator failed: {}", e);
        }
    });

    shutdown_task.await.ok();
    info!("Shutdown coordinator completed, waiting for server tasks");

    let _ = tokio::time::timeout(Duration::from_secs(1), http_task).await;

    info!("siphon shutdown complete");
    Ok(())
}
