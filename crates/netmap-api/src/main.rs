//! Network-mapper device API server.

use netmap_api::config::ApiConfig;
use netmap_api::server::{self, AppState};
use netmap_lifecycle::DeviceManager;
use netmap_store::{InMemoryAuditStore, InMemoryDeviceStore, SqliteAuditStore, SqliteDeviceStore};
use netmap_types::{AdminAuth, DeviceLifecycle};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ApiConfig::from_env()?;

    let lifecycle: Arc<dyn DeviceLifecycle> = match &config.database {
        Some(path) => {
            tracing::info!(path = %path.display(), "using SQLite stores");
            Arc::new(DeviceManager::new(
                SqliteDeviceStore::new(path)?,
                SqliteAuditStore::new(path)?,
            ))
        }
        None => {
            tracing::warn!("NETMAP_DATABASE not set; devices and audit log live in memory");
            Arc::new(DeviceManager::new(
                InMemoryDeviceStore::new(),
                InMemoryAuditStore::new(),
            ))
        }
    };

    let auth = AdminAuth::new(config.admin_token.clone());
    if !auth.is_enabled() {
        tracing::warn!("ADMIN_TOKEN not set; admin audit routes will refuse every request");
    }

    let app = server::router(Arc::new(AppState { lifecycle, auth }));
    tracing::info!("network-mapper API listening on {}", config.listen);
    axum::serve(
        tokio::net::TcpListener::bind(config.listen).await?,
        app.into_make_service(),
    )
    .await?;
    Ok(())
}
