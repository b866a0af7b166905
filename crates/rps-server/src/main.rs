//! # rps-server
//!
//! Reputation aggregator: listens for signed reports over UDP or TCP and
//! logs every accepted batch as JSON.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use rps_server::{Listener, ReportProcessor, ServerConfig, TracingSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rps_server=debug")),
        )
        .init();

    info!("Starting rps-server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env()?;
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Build the pipeline
    // -----------------------------------------------------------------------
    let processor = Arc::new(
        ReportProcessor::new(Arc::new(config.credentials.clone()), Arc::new(TracingSink))
            .with_freshness_window(config.freshness_window)
            .with_sweep_probability(config.sweep_probability),
    );

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic replay guard sweep, on top of the per-report random trigger
    let sweeper = processor.clone();
    let sweep_interval = config.sweep_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            sweeper.sweep();
        }
    });

    // -----------------------------------------------------------------------
    // 5. Receive reports until shutdown
    // -----------------------------------------------------------------------
    let listener = Listener::bind(config.carrier, config.listen_addr).await?;

    tokio::select! {
        result = listener.serve(processor.clone(), config.max_report_size) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Listener failed");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    info!(processed = processor.processed_count(), "Stopped");
    Ok(())
}
