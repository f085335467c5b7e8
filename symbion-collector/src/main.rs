/**
 * SYMBION COLLECTOR - Point d'entrée du daemon de collecte
 *
 * RÔLE : bootstrap complet : .env, logs, config, daemon, API HTTP.
 * Arrêt propre sur Ctrl-C : le serveur HTTP se ferme puis le daemon est stoppé.
 */

use anyhow::{Context, Result};
use symbion_collector::config::load_config;
use symbion_collector::http::{build_router, AppState};
use symbion_collector::Daemon;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("symbion_collector=info")),
        )
        .init();

    let file = load_config().await.context("failed to load collector config")?;
    let addr = file.listen_addr().context("invalid listen address")?;
    let config = file
        .into_daemon_config()
        .context("invalid collector configuration")?;

    let daemon = Daemon::new(config);
    daemon.start().await.context("failed to start collector daemon")?;

    let app = build_router(AppState {
        daemon: daemon.clone(),
    });

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("[collector] listening on http://{addr}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    daemon.shutdown().await;
    served.context("http server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        return;
    }
    info!("ctrl-c received, shutting down");
}
