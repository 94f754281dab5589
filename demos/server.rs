//! Demo server: serve the resource model in `MODEL_PATH` from the database at `DATABASE_URL`.
//!
//! Run from repo root: `cargo run --example server`
//! With the bundled model: `MODEL_PATH=demos/model cargo run --example server`

use resource_gateway::{gateway_router, load_from_dir, resolve, AppState, GatewaySettings, PersistenceBridge, PgBridge};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = GatewaySettings::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("resource_gateway=info")),
        )
        .init();

    let config = load_from_dir(&settings.model_path).await?;
    let model = Arc::new(resolve(&config)?);
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .connect(&settings.database_url)
        .await?;

    let bridge = PgBridge::new(pool, model);
    bridge.ping().await?;
    let credentials = Arc::new(settings.credential_store()?);
    let state = AppState::new(Arc::new(bridge), credentials)
        .with_realm(&settings.realm)
        .with_create_authorization(settings.create_authorization);

    let app = gateway_router(state, settings.max_body_bytes);
    let listener = TcpListener::bind(settings.bind).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        create_authorization = ?settings.create_authorization,
        "resource gateway listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
