//! AdSpace Exchange — two-sided marketplace for physical ad space rentals.
//!
//! Main entry point that wires the marketplace engines and starts the server.

use adspace_api::ApiServer;
use adspace_core::payments::MockPaymentGateway;
use adspace_core::AppConfig;
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "adspace-exchange")]
#[command(about = "Two-sided marketplace for physical ad space rentals")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "ADSPACE__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "ADSPACE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Seconds between deadline sweep passes
    #[arg(long, default_value_t = 300)]
    sweep_interval_secs: u64,

    /// Disable the background deadline sweep (API-only mode)
    #[arg(long, default_value_t = false)]
    no_sweep: bool,

    /// Seed demo bookings on startup (development only)
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adspace_exchange=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("AdSpace Exchange starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        window_days = config.booking.installation_window_days,
        auto_approve_hours = config.booking.proof_auto_approve_hours,
        "Configuration loaded"
    );

    // The mock gateway stands in for the payment provider integration;
    // swap in a real implementation via the PaymentGateway trait.
    let gateway = Arc::new(MockPaymentGateway::new());
    let api_server = ApiServer::new(config.clone(), gateway);

    if cli.seed_demo {
        api_server.state().bookings.seed_demo_bookings();
    }

    // Spawn the deadline sweep (missed windows, proof auto-approval,
    // campaign completion)
    if cli.no_sweep {
        info!("Running in API-only mode (no deadline sweep)");
    } else {
        let sweeper = api_server.state().sweeper.clone();
        let interval_secs = cli.sweep_interval_secs;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                sweeper.run(Utc::now());
            }
        });
        info!(interval_secs, "Deadline sweep scheduled");
    }

    info!("AdSpace Exchange is ready to serve traffic");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
