//! ledbridge - LED driver state bridge
//!
//! Bridges LED drivers on an MQTT broker to a persisted device table.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledbridge::config::AppConfig;
use ledbridge::dispatcher::CommandDispatcher;
use ledbridge::paths::AppPaths;
use ledbridge::service::LedService;
use ledbridge::state::StateActor;
use ledbridge::store::{MemoryRecordStore, RecordStore, SledRecordStore};
use ledbridge::transport::{MqttTransport, TopicLayout, Transport};

/// LED driver state bridge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides the config file
    #[arg(short, long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Address of this controller; overrides the config file
    #[arg(long, env = "SWITCH_MAC")]
    switch_mac: Option<String>,

    /// Keep device records in memory only
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let paths = match &args.config {
        Some(config) => AppPaths::with_config(config),
        None => AppPaths::detect(),
    };

    let mut config = AppConfig::load(&paths.config).await?;
    if let Some(mac) = &args.switch_mac {
        config.override_switch_mac(mac)?;
    }

    paths.ensure_directories()?;

    let level = args.log_level.as_deref().unwrap_or(&config.log_level);
    let _log_guard = init_logging(level, config.logging.file.then_some(&paths.logs_dir))?;

    info!("Starting ledbridge v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", paths.config.display());
    info!("Controller: {}", config.switch_mac);

    run_app(config, &paths, args.ephemeral, shutdown_signal()).await?;

    info!("ledbridge shutdown complete");
    Ok(())
}

async fn run_app(
    config: AppConfig,
    paths: &AppPaths,
    ephemeral: bool,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let store = open_store(&config, paths, ephemeral)?;
    store
        .ensure_table(&config.database.table)
        .with_context(|| format!("Failed to create table {}", config.database.table))?;

    let state = StateActor::spawn(store, config.database.table.clone(), config.switch_mac.clone());

    let layout = TopicLayout::new(
        &config.topics.read_prefix,
        &config.topics.write_prefix,
        &config.switch_mac,
    );
    let client_id = config.broker.effective_client_id();
    let (mqtt, inbound) = MqttTransport::connect(&config.broker, &client_id, layout.subscriptions());
    let mqtt = Arc::new(mqtt);

    let dispatcher = CommandDispatcher::new(
        state.clone(),
        mqtt.clone() as Arc<dyn Transport>,
        layout.clone(),
    );
    let service = Arc::new(LedService::new(
        state.clone(),
        dispatcher,
        layout,
        config.switch_mac.clone(),
        config.service.max_inflight,
    ));

    service.run(inbound, shutdown).await;

    mqtt.disconnect().await;
    info!("Cached drivers at shutdown: {}", state.cache_len().await);
    state.shutdown().await.context("Failed to flush device table")?;

    Ok(())
}

fn open_store(config: &AppConfig, paths: &AppPaths, ephemeral: bool) -> Result<Arc<dyn RecordStore>> {
    if ephemeral {
        info!("Using in-memory device table (--ephemeral)");
        return Ok(Arc::new(MemoryRecordStore::new()));
    }

    let path = config
        .database
        .path
        .clone()
        .unwrap_or_else(|| paths.sled_db_path());
    let store = SledRecordStore::open(&path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    info!("Device table stored in {}", path.display());
    Ok(Arc::new(store))
}

fn init_logging(level: &str, log_dir: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "ledbridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}
