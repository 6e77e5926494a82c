mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};

use storyloom_api::auth::{AppState, AppStateInner};
use storyloom_api::interceptors::InterceptorConfig;
use storyloom_api::routes;
use storyloom_api::tokens::TokenService;
use storyloom_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storyloom=debug,storyloom_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("FATAL: {:#}", e);
            error!("       Set the STORYLOOM_* variables in your .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Database::open(&config.db_path)?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        tokens: TokenService::new(
            config.jwt_secret.clone(),
            config.jwt_refresh_secret.clone(),
            config.access_token_ttl,
            config.refresh_token_ttl,
        ),
        secure_cookies: config.secure_cookies(),
    });

    let interceptors = InterceptorConfig::new(config.frontend_url.as_deref());
    info!("CORS origins: {}", interceptors.allowed_origins.join(", "));

    let app = routes::router(state, &interceptors);

    info!("Storyloom listening on {} ({:?})", config.addr, config.environment);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
