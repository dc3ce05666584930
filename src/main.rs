use anyhow::Context;
use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use whisperline::{config::Config, db, logging, router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = Config::from_env()?;

    let db_pool = db::connect(&config.database_url, config.max_connections)
        .await
        .context("could not open database")?;

    let origins = config
        .cors_origins
        .iter()
        .map(|origin| HeaderValue::from_str(origin))
        .collect::<Result<Vec<_>, _>>()
        .context("CORS_ORIGINS contains an invalid origin")?;
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any);

    let app_state = AppState::new(db_pool);
    let presence = app_state.gateway.presence().clone();
    let app = router(app_state, cors);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "could not listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
            presence.shutdown().await;
        })
        .await?;

    Ok(())
}
