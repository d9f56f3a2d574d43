use rewards_hub::{
    objects::DirObjectStore, reconcile, router, AppState, Config, JsonStore, RewardsStore,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::{fs, sync::watch};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::load();
    if let Some(parent) = config.data_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::create_dir_all(&config.uploads_dir).await?;

    let store: Arc<dyn RewardsStore> =
        Arc::new(JsonStore::open(config.data_path.clone()).await?);
    let objects = Arc::new(DirObjectStore::new(config.uploads_dir.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = tokio::spawn(reconcile::run_periodic(
        Arc::clone(&store),
        config.points_per_day,
        config.reconcile_interval,
        shutdown_rx,
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(AppState::new(store, objects, config));

    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(err) = reconciler.await {
        warn!("reconciler task ended abnormally: {err}");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
