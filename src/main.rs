use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use userservice::{
    auth::jwt::JwtService, clients::build_clients, config::AppConfig, db, default_handlers,
    routes::create_router, state::AppState, Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        database_url = %config.redacted_database_url(),
        mongodb_url = %config.redacted_mongodb_url(),
        pool_size = config.database_max_pool_size,
        embedded_worker = config.embedded_worker,
        jwt_algorithm = ?config.jwt_algorithm,
        "loaded userservice configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let applied = db::run_migrations(&pool)?;
    tracing::info!(applied, "database migrations up to date");

    let clients = build_clients(&config).await?;
    let jwt = JwtService::from_config(&config)?;
    let address = format!("{}:{}", config.server_host, config.server_port);
    let poll_interval = Duration::from_secs(config.worker_poll_interval_secs.max(1));
    let embedded_worker = config.embedded_worker;

    let state = AppState::new(pool, config, jwt, clients);
    if embedded_worker {
        let worker = Worker::new(Arc::new(state.clone()), default_handlers(), poll_interval);
        tokio::spawn(async move { worker.run().await });
    }

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!(%address, "userservice listening");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("server received shutdown signal");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
