//! DataWeaver server - Binary Entry Point

use std::sync::Arc;
use std::time::Duration;

use dataweaver::api::auth::{ensure_default_admin, JwtAuth};
use dataweaver::api::{create_router, AppState};
use dataweaver::guard::spawn_lease_sweeper;
use dataweaver::{logging, Config, Store};

/// How often expired download sessions are reclaimed when a lease is set
const LEASE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    logging::init(config.log_format);

    tracing::info!(
        version = dataweaver::VERSION,
        database = %config.database.path.display(),
        "starting dataweaver"
    );

    let store = Store::open(&config.database).await?;
    let auth = JwtAuth::from_config(&config.auth)?;
    ensure_default_admin(&store, config.auth.admin_password.as_deref()).await?;

    let (state, completion_worker) = AppState::build(store, &config, auth);
    state.resources.ensure_root().await?;
    state.outputs.ensure_root().await?;

    let sweeper = spawn_lease_sweeper(state.guard.clone(), LEASE_SWEEP_INTERVAL);

    let app = create_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and its state) is gone; drain pending session completions
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    if let Err(e) = completion_worker.await {
        tracing::error!(error = %e, "completion worker ended abnormally");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
