mod api;
mod engine;
mod middleware;
mod scheduler;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    engine::Engine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Arc::new(postwatch_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(env = %config.env, bind_addr = %config.bind_addr, "postwatch starting");

    let pool = postwatch_db::connect_pool_from_config(&config).await?;
    let applied = postwatch_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations complete");

    match postwatch_db::load_startup_counts(&pool).await {
        Ok(counts) => tracing::info!(
            eligible_links = counts.eligible_links,
            unresolved_links = counts.unresolved_links,
            active_proxies = counts.active_proxies,
            active_tokens = counts.active_tokens,
            limited_tokens = counts.limited_tokens,
            active_cookies = counts.active_cookies,
            "startup: pending work"
        ),
        Err(e) => tracing::warn!(error = %e, "startup: could not load record counts"),
    }

    let engine = Engine::build(&config, pool.clone())?;
    let mut scheduler = scheduler::build_scheduler(&engine, &config).await?;

    let app = build_app(AppState::new(pool, &engine));
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await?;
    tracing::info!(
        live_workers = engine.reconciler.live_workers(),
        "scheduler stopped; exiting"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
