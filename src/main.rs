use clap::Parser;
use simple_logger::SimpleLogger;
use std::sync::Arc;
use std::time::Duration;

mod api;
mod argument;
mod config;
mod health;
mod pool;
mod proxy;
mod store;
mod utils;

use crate::api::handlers::AppState;
use crate::api::{ApiConfig, ApiServer};
use crate::argument::Cli;
use crate::config::{merge_config_and_store, AppConfig};
use crate::health::HealthManager;
use crate::pool::{Pool, PoolHandle};
use crate::store::{db_path_from_env, Store, StoreAdapter};
use crate::utils::error::{ProxyError, ProxyResult};
use crate::utils::shutdown::{wait_for_signal, ShutdownManager};

fn main() -> ProxyResult<()> {
    let cli = Cli::parse();

    let log_level = match cli.log_level.as_str() {
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Warn,
    };

    SimpleLogger::new()
        .with_level(log::LevelFilter::Off)
        .with_module_level("proxy_pool_manager", log_level)
        .init()
        .map_err(|e| ProxyError::Config(format!("failed to initialize logger: {}", e)))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| ProxyError::Config(format!("failed to create runtime: {}", e)))?;

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> ProxyResult<()> {
    let shutdown = ShutdownManager::new();

    let app_config = AppConfig::load(&cli.config)?;
    log::info!("loaded configuration from {}", cli.config.display());

    let db_path = db_path_from_env();
    let store: Arc<dyn StoreAdapter> = Arc::new(Store::connect(&db_path).await?);
    log::info!("connected to store at {}", db_path);

    let stored = store.load_proxies().await?;
    let entries = merge_config_and_store(&app_config, stored);
    log::info!("pool initialized with {} proxies", entries.len());

    let pool: Arc<dyn PoolHandle> = Arc::new(Pool::new(entries));

    let health_interval = Duration::from_secs(cli.health_interval_secs);
    let probe_timeout = app_config.timeout();
    let mut health_manager = HealthManager::start(
        pool.clone(),
        store.clone(),
        health_interval,
        probe_timeout,
        &shutdown,
    );

    let api_config = ApiConfig {
        bind: cli.bind.clone(),
        enable_auth: cli.enable_auth,
        ..ApiConfig::default()
    };
    let state = AppState {
        pool: pool.clone(),
        store: store.clone(),
    };
    let server = ApiServer::new(api_config, state);

    let signal_task = tokio::spawn(wait_for_signal(shutdown.clone()));

    let result = server.serve(&shutdown).await;

    health_manager.stop().await;
    pool.close();
    signal_task.abort();

    if let Err(e) = &result {
        log::error!("shutting down after server error: {}", e);
    }
    result
}
