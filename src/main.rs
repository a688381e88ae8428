use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use desk_executor::api::run_server;
use desk_executor::bus::EventBus;
use desk_executor::config::AppConfig;
use desk_executor::constants::defaults;
use desk_executor::services::cleanup::CleanupService;
use desk_executor::services::gating::SystemClock;
use desk_executor::services::{ExecutorDeps, ExecutorFacade};
use desk_executor::vision::Extraction;
use desk_executor::window::{Actuator, FakeActuator, XdoActuator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let dry_run = std::env::args().any(|a| a == "--dry-run");
    info!("🚀 Starting desk executor{}", if dry_run { " (dry run)" } else { "" });

    let config = AppConfig::load()?;
    info!(
        "⚙️ Config: log root {}, trading hours {}, vision {}",
        config.log_root.display(),
        config.trading_hours.describe(),
        if config.vision.enabled { config.vision.model.as_str() } else { "disabled" }
    );

    let extraction = Extraction::from_config(&config.vision)?;

    let actuator: Arc<dyn Actuator> = if dry_run {
        Arc::new(FakeActuator::with_window(defaults::TITLE_PATTERNS[0]))
    } else {
        Arc::new(XdoActuator::new())
    };
    info!("🖱️ Actuator: {}", actuator.name());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let executor = ExecutorFacade::start(
        &config,
        ExecutorDeps {
            actuator,
            clock: Arc::new(SystemClock),
            extraction,
            bus: EventBus::new(defaults::EVENT_BUS_CAPACITY),
            shutdown: shutdown_rx.clone(),
        },
    );

    if config.window.launch_on_start {
        match executor.launch().await {
            Ok(handle) => info!("🪟 Trading client ready: {}", handle),
            Err(e) => warn!("⚠️ Launch on start failed: {}", e),
        }
    }

    // Held for the lifetime of the process; dropping it stops the cron job.
    let _scheduler = match CleanupService::new(executor.clone(), config.retention.clone()).start().await {
        Ok(scheduler) => Some(scheduler),
        Err(e) => {
            warn!("⚠️ Failed to start retention sweep: {}", e);
            None
        }
    };

    let server = if config.server.enabled {
        let bind: SocketAddr = config.server.bind.parse()?;
        let executor = executor.clone();
        let shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = run_server(executor, bind, shutdown).await {
                error!("❌ API server stopped: {}", e);
            }
        }))
    } else {
        info!("ℹ️ HTTP API disabled");
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("🛑 Ctrl-C received, shutting down");
    shutdown_tx.send(true).ok();

    if let Some(server) = server {
        server.await.ok();
    }
    Ok(())
}
