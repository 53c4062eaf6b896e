use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use fair_use_quota_tracker::{
    create_router, ApiState, Clock, MemoryQuotaStore, QuotaCheckService, QuotaStore,
    QuotaTrackerConfig, SqliteQuotaStore, StaticPolicyResolver, StoreBackend, SystemClock,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = QuotaTrackerConfig::from_env()?;
    init_tracing(&config.log_level)?;

    info!(
        addr = %config.listen_addr(),
        backend = ?config.store_backend,
        data_dir = %config.data_dir.display(),
        "starting quota-tracker service"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn QuotaStore> = match config.store_backend {
        StoreBackend::Sqlite => Arc::new(SqliteQuotaStore::new(
            config.data_dir.clone(),
            config.busy_timeout(),
            Arc::clone(&clock),
        )?),
        StoreBackend::Memory => Arc::new(MemoryQuotaStore::new(Arc::clone(&clock))),
    };
    let resolver = Arc::new(StaticPolicyResolver::from_config(&config));
    let service = QuotaCheckService::new(store, resolver, clock);

    let listener = TcpListener::bind(config.listen_addr()).await?;
    let state = Arc::new(ApiState::new(service, config));
    let router = create_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("quota-tracker service shutting down");
    Ok(())
}

fn init_tracing(default_level: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
