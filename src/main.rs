use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use brokerd::bus::{EventBus, InMemoryBus};
use brokerd::config::{AppConfig, LoggingConfig};
use brokerd::domain::PositionBook;
use brokerd::lifecycle::LifecycleStore;
use brokerd::router::Router;
use brokerd::services::{BusHealthReporter, HealthReporter, OrderConsumer, PollScheduler};
use brokerd::venue::build_venue;

/// Expected balance heartbeats per monitoring window on the health side.
const HEALTH_N_CHECK: u32 = 6;

#[derive(Parser)]
#[command(name = "brokerd", about = "Order routing and lifecycle gateway")]
struct Cli {
    /// Configuration directory
    #[arg(long, default_value = "config")]
    config_dir: String,

    /// Override the configured venue selector
    #[arg(long)]
    venue: Option<String>,

    /// Log netted instructions instead of submitting them
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from(&cli.config_dir)?;
    if let Some(venue) = &cli.venue {
        config.venue.kind = venue.clone();
    }
    if cli.dry_run {
        config.execution.send_orders = false;
    }

    let _log_guard = init_logging(&config.logging);
    config.validate()?;

    info!(
        "brokerd starting (venue {}, send_orders {})",
        config.venue.kind, config.execution.send_orders
    );

    let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
    let venue = build_venue(&config.venue.kind)?;
    let store = Arc::new(LifecycleStore::new(bus.clone()));
    let positions = Arc::new(PositionBook::new());
    let health: Arc<dyn HealthReporter> = Arc::new(BusHealthReporter::new(
        bus.clone(),
        &config.venue.service_name(),
        HEALTH_N_CHECK,
    ));

    let scheduler = Arc::new(PollScheduler::new(
        venue.clone(),
        bus.clone(),
        positions.clone(),
        store.clone(),
        health,
        &config.venue.account,
        config.execution.venue_timeout(),
        config.polling.clone(),
    ));

    // First balance check runs inline, before any loop spawns
    scheduler.run_balance_check().await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = scheduler.spawn(shutdown_rx.clone());

    let consumer = OrderConsumer::new(
        bus,
        venue,
        store,
        positions,
        Router::new(config.execution.send_orders),
        config.execution.venue_timeout(),
    );
    tasks.push(tokio::spawn(async move {
        consumer.run(shutdown_rx).await;
    }));

    shutdown_signal().await;
    info!("Shutdown signal received, stopping");
    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }

    Ok(())
}

fn init_logging(config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{0},brokerd={0}", config.level)));

    if let Some(path) = &config.file {
        let path = std::path::Path::new(path);
        let directory = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let file_name = path.file_name().unwrap_or_else(|| "brokerd.log".as_ref());
        let appender = tracing_appender::rolling::daily(directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        if config.json {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(writer)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(writer)
                .init();
        }
        return Some(guard);
    }

    if config.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .init();
    }
    None
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
