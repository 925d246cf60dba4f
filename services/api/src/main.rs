use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use gasbank::{LedgerConfig, LedgerService, MemoryStore, SettlementPoller, Store, TimeoutResolver};
use gasbank_api::config::Config;
use gasbank_api::{router, AppState};
use gasbank_models::PgStore;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gasbank_api=debug,gasbank=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!(environment = %config.environment, "starting gas bank");

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => Arc::new(
            PgStore::connect(url)
                .await
                .context("Failed to create database pool")?,
        ),
        None => {
            warn!("DATABASE_URL not set; balances live in memory and are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    let ledger = LedgerService::with_config(
        store,
        LedgerConfig {
            activation_batch: config.schedule_batch,
            ..LedgerConfig::default()
        },
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut workers = Vec::new();

    let activator = ledger.clone();
    let (interval, batch) = (config.schedule_interval, config.schedule_batch);
    let rx = shutdown_rx.clone();
    workers.push(tokio::spawn(async move {
        activator.run_schedule_activator(interval, batch, rx).await;
    }));

    if config.settlement.enabled {
        let resolver = Arc::new(TimeoutResolver::new(config.settlement.timeout));
        let poller = SettlementPoller::new(ledger.clone(), resolver)
            .with_retry_policy(config.settlement.max_attempts, config.settlement.interval);
        let rx = shutdown_rx.clone();
        workers.push(tokio::spawn(async move { poller.run(rx).await }));
    }

    let app = router(AppState::new(ledger));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for ctrl-c");
            }
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    for worker in workers {
        if let Err(err) = worker.await {
            warn!(error = %err, "background worker ended abnormally");
        }
    }
    info!("gas bank stopped");
    Ok(())
}
