mod api;
mod domain;

use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use authz::{AuthBackend, AuthMiddleware, AuthSettings};
use common::config::{AppConfig, StorageConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[actix_web::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level)?)
        .init();

    info!("Starting {}...", config.service_name);

    let settings = AuthSettings::from_env()?;
    let storage = StorageConfig::from_env()?;
    let backend = Arc::new(AuthBackend::from_config(&settings, &storage).await?);
    info!("Session storage: {}", backend.store().name());

    backend.store().prepare().await?;

    match backend.health().await {
        Ok(()) => info!("Session store reachable"),
        // Redis may come up after us; the store reconnects on demand
        Err(e) => tracing::warn!("Session store not reachable yet: {}", e),
    }

    if let Some(memory) = backend.store().as_memory().cloned() {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PURGE_INTERVAL);
            loop {
                ticker.tick().await;
                let purged = memory.purge_expired();
                if purged > 0 {
                    tracing::debug!("Purged {} expired sessions", purged);
                }
            }
        });
    }

    let server_address = config.server_address();
    info!("Auth Service starting on http://{}", server_address);

    HttpServer::new(move || {
        App::new()
            .wrap(AuthMiddleware::new(backend.clone()).exclude(api::PUBLIC_PATHS))
            .wrap(Logger::default())
            .app_data(web::Data::from(backend.clone()))
            .configure(api::routes::configure)
    })
    .bind(&server_address)?
    .run()
    .await?;

    Ok(())
}
