use std::sync::Arc;

use anyhow::{Context, Result};
use signalement_backend::{
    build_router,
    config::{AppConfig, StoreBackend},
    fallback::FallbackReader,
    models::Region,
    replication::ReplicationCoordinator,
    state::AppState,
    store::{InMemorySignalementStore, PgSignalementStore, RegionCluster, SignalementStore},
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env().context("failed to load application configuration")?;

    let cluster = match config.store_backend {
        StoreBackend::Postgres => {
            info!("store backend: postgres");
            let pg_store = |region: Region, url: &str| -> Result<Arc<dyn SignalementStore>> {
                let store = PgSignalementStore::connect_lazy(url, config.db_max_connections)
                    .with_context(|| format!("invalid connection string for region {region}"))?;
                Ok(Arc::new(store))
            };
            RegionCluster::new(
                pg_store(Region::West, &config.database_urls[0])?,
                pg_store(Region::Sud, &config.database_urls[1])?,
                pg_store(Region::Est, &config.database_urls[2])?,
                pg_store(Region::Centre, &config.database_urls[3])?,
            )
        }
        StoreBackend::Memory => {
            info!("store backend: memory");
            RegionCluster::new(
                Arc::new(InMemorySignalementStore::new()),
                Arc::new(InMemorySignalementStore::new()),
                Arc::new(InMemorySignalementStore::new()),
                Arc::new(InMemorySignalementStore::new()),
            )
        }
    };

    // Schema init is best-effort per region: an unreachable instance must
    // not block boot, the coordinator will report it per request instead.
    for (region, store) in cluster.handles() {
        if let Err(err) = store.init().await {
            warn!(backend = %region, error = %err, "schema init failed, continuing");
        }
    }

    let coordinator = Arc::new(ReplicationCoordinator::new(
        cluster.clone(),
        config.replication_timeout,
    ));
    let reader = Arc::new(FallbackReader::new(cluster));

    let app = build_router(AppState::new(coordinator, reader));

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(address = %addr, "signalement backend started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("signalement_backend=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
