use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use chainwatch_sentinel::alert::{AlertFanout, JsonlAlertSink, TracingAlertSink};
use chainwatch_sentinel::analyzer::MonitorContext;
use chainwatch_sentinel::chain::ReplayClient;
use chainwatch_sentinel::config::Config;
use chainwatch_sentinel::monitor::ChainMonitor;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Load configuration first: it selects the log format
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;

    // Initialize structured logging (set RUST_LOG=debug for sweep details)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    tracing::info!("ChainWatch Sentinel starting");
    tracing::info!(
        blocks_path = %config.chain.blocks_path,
        api_enabled = config.api.enabled,
        "Configuration loaded from {}",
        config_path
    );
    if !config.monitoring.dormancy_detectable() {
        tracing::warn!(
            account_retention_secs = config.monitoring.account_retention_secs,
            dormancy_threshold_secs = config.monitoring.dormancy_threshold_secs,
            "Accounts are evicted before they can go dormant; dormancy alerts are disabled"
        );
    }

    // Alert sinks: always the log, optionally a JSONL file
    let mut sinks = AlertFanout::new(vec![Box::new(TracingAlertSink)]);
    if let Some(path) = &config.alerts.jsonl_path {
        sinks.add(Box::new(JsonlAlertSink::new(path.clone())));
        tracing::info!(path = %path, "Persisting alerts to JSONL file");
    }

    let context = MonitorContext::new(
        config.monitoring.clone(),
        config.alerts.clone(),
        Arc::new(sinks),
    );

    let client = ReplayClient::new(
        config.chain.blocks_path.clone(),
        Duration::from_millis(config.chain.block_interval_ms),
    );
    let mut monitor = ChainMonitor::new(
        client,
        context.default_analyzers(),
        config.chain.backoff(),
        Duration::from_secs(config.monitoring.cleanup_interval_secs),
    );

    // Spawn API server
    if config.api.enabled {
        let analyzers = monitor.analyzers().to_vec();
        let state = monitor.subscribe_state();
        let host = config.api.host.clone();
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = chainwatch_sentinel::api::serve(analyzers, state, &host, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        });
    }

    // Create shutdown signal (Ctrl+C or SIGTERM)
    let shutdown = CancellationToken::new();
    chainwatch_sentinel::signal::cancel_on_termination(shutdown.clone())?;

    tracing::info!("Monitor started. Press Ctrl+C or send SIGTERM to stop.");
    let result = monitor.run(shutdown).await;
    drop(context);

    match &result {
        Ok(()) => tracing::info!("ChainWatch Sentinel stopped gracefully"),
        Err(e) => tracing::error!(error = %e, "ChainWatch Sentinel stopped with a fatal error"),
    }
    result
}

