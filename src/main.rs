mod app;
mod auth;
mod clock;
mod config;
mod db;
mod error;
mod handlers;
mod sweeper;
#[cfg(test)]
mod testing;

use std::env;
use std::sync::Arc;

use app::{AppState, build_router};
use auth::credentials::PasswordCredentialVerifier;
use auth::jwt::AccessTokenIssuer;
use auth::keys::SigningKeyProvider;
use auth::logout::SessionTerminator;
use auth::rotation::TokenRotationEngine;
use clock::{Clock, SystemClock};
use config::Config;
use db::repositories::refresh_token_repository::PgStoreProvider;
use db::store::StoreProvider;
use error::AppError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DB_POOL_SIZE: u32 = 10;

pub async fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Si RUST_LOG n'est pas défini, utiliser ces règles par défaut
        tracing_subscriber::EnvFilter::new(
            "info,session_guard=debug,hyper_util=warn,tower_http=info",
        )
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// ----------------- Main -----------------

#[tokio::main]
async fn main() -> Result<(), lambda_http::Error> {
    // Initialize logging for all environments
    setup_logging().await;
    tracing::info!("Starting session-guard...");

    let config = Config::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let keys = SigningKeyProvider::resolve(&config.key_sources, &config.environment)
        .map_err(AppError::from)?;
    let issuer = AccessTokenIssuer::new(&keys, config.access_token.clone(), clock.clone());

    let pool = db::connection::create_pool(&config.database_url, DB_POOL_SIZE)?;
    let store: Arc<dyn StoreProvider> = Arc::new(PgStoreProvider::new(pool.clone()));
    let verifier = Arc::new(PasswordCredentialVerifier::new(pool, clock.clone())?);

    let engine = TokenRotationEngine::new(
        store.clone(),
        issuer.clone(),
        verifier,
        clock.clone(),
        config.refresh,
    );
    let terminator = SessionTerminator::new(store.clone(), clock.clone());

    sweeper::spawn_retention_sweep(
        store,
        clock.clone(),
        config.retention,
        config.sweep_interval,
    );

    let app = build_router(AppState {
        engine: Arc::new(engine),
        terminator: Arc::new(terminator),
        issuer,
        cookies: config.cookies.clone(),
        clock,
    });

    if env::var("AWS_LAMBDA_FUNCTION_NAME").is_ok() {
        tracing::info!("Running in Lambda mode");
        lambda_http::run(app).await
    } else {
        tracing::info!("Running in local HTTP server mode");
        let addr = format!("{}:{}", config.server_host, config.server_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("🚀 Server running at http://{}", addr);
        axum::serve(listener, app).await?;

        Ok(())
    }
}
