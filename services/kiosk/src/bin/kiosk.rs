//! services/kiosk/src/bin/kiosk.rs

use kiosk_lib::{
    adapters::{FileSessionStorage, HttpBackend},
    config::Config,
    error::KioskError,
    web::{router, AppState},
};
use loyalty_core::SessionStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), KioskError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting kiosk...");

    // --- 2. Restore the Operator Session ---
    let storage = Arc::new(FileSessionStorage::new(config.session_path.clone()));
    let sessions = Arc::new(SessionStore::new(storage));
    let session = sessions.hydrate();
    info!(
        path = %config.session_path.display(),
        authenticated = session.is_authenticated(),
        "Session hydrated."
    );

    // --- 3. Initialize the Loyalty API Adapter ---
    let backend = Arc::new(HttpBackend::new(&config, sessions.clone())?);
    info!(base_url = %config.api_base_url, "Loyalty API adapter ready.");

    // --- 4. Build the Shared AppState and the Router ---
    let app_state = Arc::new(AppState::new(config.clone(), sessions, backend));
    let app = router(app_state)?;

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
