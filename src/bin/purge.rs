//! Deletes every cached object (optionally only those under `--prefix`) from the
//! configured bucket, then prints how many keys were removed.

use siphon::{
    config::Config, logging::LoggerManager, purge::PurgeJob, s3_client::S3Client, Result,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

async fn run() -> Result<bool> {
    let config = Config::load_purge()?;

    let logger = LoggerManager::for_local_host(config.logging.clone());
    logger.initialize("siphon-purge.log")?;

    info!(
        "Starting siphon-purge v{} (built: {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIMESTAMP")
    );
    info!(
        "Purging {}/{} (prefix: {})",
        config.store.endpoint,
        config.store.bucket,
        config.purge.prefix.as_deref().unwrap_or("<none>")
    );

    let store = S3Client::new(&config.store, &config.connection_pool)?
        .with_max_keys(config.purge.page_size);
    let job = PurgeJob::new(Arc::new(store), config.purge.prefix.clone());

    match job.run_with_progress(config.purge.progress_interval).await {
        Ok(deleted) => {
            println!("Deleted {} keys.", deleted);
            Ok(true)
        }
        Err(failure) => {
            println!("Deleted {} keys.", failure.deleted);
            error!("{}", failure);
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("siphon-purge: {}", e);
            ExitCode::FAILURE
        }
    }
}
