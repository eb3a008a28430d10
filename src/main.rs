use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ratekeeper::cli::{self, ApplicationOptions};
use ratekeeper::config::RatekeeperConfig;
use ratekeeper::http::api_key_of;
use ratekeeper::ratelimit::builders::keyed_sliding_log_with;
use ratekeeper::ratelimit::SystemClock;
use ratekeeper::scheduler::TokioScheduler;
use ratekeeper::server::HttpServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let options = match ApplicationOptions::from_env() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}\n\n{}", e, cli::help());
            std::process::exit(1);
        }
    };

    info!("Starting Ratekeeper sample server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = RatekeeperConfig::load(options.config.as_deref())?;
    options.apply(&mut config);
    let rate = config.rate_limiting.rate()?;
    let sweep_interval = config.rate_limiting.sweep_interval()?;
    info!(%rate, port = ?config.server.port, "Configuration loaded");

    let scheduler = Arc::new(TokioScheduler::dedicated(
        config.rate_limiting.cleanup_threads,
    )?);
    let limiter = keyed_sliding_log_with(
        rate,
        Arc::new(SystemClock),
        sweep_interval,
        api_key_of,
        scheduler.clone(),
    );

    let server = HttpServer::bind(config.server.addr(), limiter).await?;
    info!(addr = %server.local_addr()?, "Serving GET /sample");

    // Run the server with graceful shutdown on Ctrl+C
    let result = server.serve_with_shutdown(shutdown_signal()).await;
    scheduler.shutdown();
    result?;

    info!("Ratekeeper sample server stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
