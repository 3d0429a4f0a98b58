//! Prometheus exporter for Conviva Experience Insights.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{Level, error, info};
use tracing_subscriber::EnvFilter;

use conviva_exporter_prometheus::config::LogFormat;
use conviva_exporter_prometheus::{Exporter, ExporterConfig, HttpServer};

/// Prometheus exporter for Conviva Experience Insights.
#[derive(Parser, Debug)]
#[command(name = "conviva-exporter-prometheus")]
#[command(about = "Export Conviva Experience Insights metrics to Prometheus")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// Address to listen on for telemetry (overrides config).
    #[arg(long, visible_alias = "web.listen-address")]
    listen: Option<String>,

    /// Path under which to expose metrics (overrides config).
    #[arg(long, visible_alias = "web.telemetry-path")]
    path: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Conviva API base URL.
    #[arg(long, env = "CONVIVA_BASE_URL")]
    base_url: Option<String>,

    /// Conviva API version, e.g. 2.4 or 3.0.
    #[arg(long, env = "CONVIVA_API_VERSION")]
    api_version: Option<String>,

    /// Conviva client id.
    #[arg(long, env = "CONVIVA_CLIENT_ID")]
    client_id: Option<String>,

    /// Conviva client secret.
    #[arg(long, env = "CONVIVA_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Conviva filter id(s), comma-separated.
    #[arg(long, env = "CONVIVA_FILTER_ID", value_delimiter = ',')]
    filter_id: Vec<String>,

    /// Dimension to group by (name for v3, id for v2).
    #[arg(long, env = "CONVIVA_DIMENSION_NAME")]
    dimension: Option<String>,

    /// Skip TLS certificate validation of the Conviva API.
    #[arg(long, env = "CONVIVA_INSECURE_SKIP_VERIFY")]
    insecure_skip_verify: Option<bool>,
}

impl Args {
    /// Apply command-line and environment overrides.
    fn apply(self, config: &mut ExporterConfig) {
        if let Some(listen) = self.listen {
            config.prometheus.listen = listen;
        }
        if let Some(path) = self.path {
            config.prometheus.path = path;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }

        let conviva = &mut config.conviva;
        if let Some(base_url) = self.base_url {
            conviva.base_url = base_url;
        }
        if let Some(api_version) = self.api_version {
            conviva.api_version = api_version;
        }
        if let Some(client_id) = self.client_id {
            conviva.client_id = client_id;
        }
        if let Some(client_secret) = self.client_secret {
            conviva.client_secret = client_secret;
        }
        if !self.filter_id.is_empty() {
            conviva.filter_ids = self.filter_id;
        }
        if let Some(dimension) = self.dimension {
            conviva.dimension = dimension;
        }
        if let Some(insecure) = self.insecure_skip_verify {
            conviva.insecure_skip_verify = insecure;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap reads the environment
    let dotenv = dotenvy::dotenv();
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ExporterConfig::read_file(config_path)?
    } else {
        ExporterConfig::default()
    };
    args.apply(&mut config);

    // Initialize logging
    let log_level = config.logging.level.parse().unwrap_or(Level::INFO);
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("conviva_exporter_prometheus={}", log_level).parse()?);

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }

    if let Err(e) = dotenv {
        info!(reason = %e, "No .env file loaded, assuming environment variables are set");
    }

    config.validate()?;

    info!(
        base_url = %config.conviva.base_url,
        api_version = %config.conviva.api_version,
        filters = ?config.conviva.filter_ids,
        dimension = %config.conviva.dimension,
        "Starting Conviva Experience Insights exporter"
    );
    if config.conviva.insecure_skip_verify {
        info!("TLS certificate validation of the Conviva API is disabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let exporter = Arc::new(Exporter::new(&config)?);

    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    let http_server = HttpServer::new(exporter, listen_addr, config.prometheus.path.clone());

    let mut http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
        _ = &mut http_task => {
            anyhow::bail!("HTTP server exited unexpectedly");
        }
    }

    // The server may already be gone; nothing left to notify then.
    let _ = shutdown_tx.send(true);

    let _ = tokio::time::timeout(Duration::from_secs(5), http_task).await;

    info!("Exporter stopped");
    Ok(())
}

async fn terminate() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        std::future::pending::<()>().await;
    }
}
