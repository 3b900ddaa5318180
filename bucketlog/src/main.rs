//! bucketlog binary entry point.

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use bucketlog::server::{CliArgs, Mode, QueryServer};
use bucketlog::{Config, IngestPipeline, client, load_config};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();

    if let Some(Mode::Admin { command, addr }) = &args.mode {
        match client::send_message(addr, command.token()).await {
            Ok(()) => tracing::info!("Sent {} to {}", command, addr),
            Err(e) => {
                tracing::error!("Failed to send {} to {}: {}", command, addr, e);
                std::process::exit(1);
            }
        }
        return;
    }

    let mut config = match &args.config {
        Some(path) => load_config(path).unwrap_or_else(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }),
        None => {
            tracing::info!("No configuration file provided, using defaults");
            Config::default()
        }
    };
    args.apply(&mut config);
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Opening bucket store with config: {:?}", config.storage);
    let pipeline = IngestPipeline::start(&config).await.unwrap_or_else(|e| {
        tracing::error!("Failed to start ingestion pipeline: {}", e);
        std::process::exit(1);
    });

    let stop = pipeline.cancellation_token();
    tokio::spawn(cancel_on_signal(stop.clone()));

    let server = QueryServer::new(
        pipeline.query_engine(),
        pipeline.metrics().clone(),
        config.http.clone(),
        config.bucket_width_secs,
        stop.clone(),
    );
    if let Err(e) = server.run().await {
        tracing::error!("HTTP server failed: {}", e);
        pipeline.shutdown();
    }

    match pipeline.wait().await {
        Ok(stats) => tracing::info!(
            "Stopped after appending {} records ({} snapshots, {} errors)",
            stats.records_appended,
            stats.snapshots,
            stats.errors
        ),
        Err(e) => {
            tracing::error!("Pipeline did not stop cleanly: {}", e);
            std::process::exit(1);
        }
    }
}

/// Cancels `stop` on SIGTERM or SIGINT (Ctrl+C).
async fn cancel_on_signal(stop: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
        _ = stop.cancelled() => return,
    }
    stop.cancel();
}
