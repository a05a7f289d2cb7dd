use std::sync::Arc;

use anyhow::Context as _;
use sea_orm::Database;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tessera_auth::background::expiry_watcher::ExpiryWatcher;
use tessera_auth::background::session_sweep;
use tessera_auth::config::AuthConfig;
use tessera_auth::router::build_router;
use tessera_auth::state::AppState;
use tessera_auth_types::token::TokenSigner;
use tessera_core::config::Config;
use tessera_core::tracing::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    let config = AuthConfig::try_from_env().context("load auth config")?;
    config.validate().context("invalid auth config")?;

    let db = Database::connect(&config.database_url)
        .await
        .context("connect to database")?;

    let redis = deadpool_redis::Config::from_url(&config.redis_url)
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .context("create redis pool")?;

    let signer = TokenSigner::new(&config.token_secrets(), config.token_lifetimes());

    let state = AppState {
        db,
        redis,
        signer: Arc::new(signer),
        config: Arc::new(config),
    };

    let watcher = Arc::new(ExpiryWatcher::new(
        state.elevation_cache(),
        state.user_repo(),
        state.notifier(),
        state.config.watcher_poll_interval(),
    ));
    watcher.start();

    let sweep_cancel = CancellationToken::new();
    let sweep = tokio::spawn(session_sweep::run(
        state.session_service(),
        state.config.session_sweep_interval(),
        sweep_cancel.clone(),
    ));

    let addr = format!("0.0.0.0:{}", state.config.auth_port);
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    info!("auth service listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    watcher.stop().await;
    sweep_cancel.cancel();
    if let Err(e) = sweep.await {
        tracing::warn!(error = %e, "session sweep task ended abnormally");
    }
    info!("auth service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
