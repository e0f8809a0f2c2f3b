//! Aquahealth - health scoring for aquariums, pools, spas and ponds.
//!
//! # API Endpoints
//!
//! - `GET /water-bodies/:id/health` - Compute or fetch cached health
//! - `GET /water-bodies/:id/health/peek` - Cached health without fetching
//! - `POST /water-bodies/:id/health/invalidate` - Drop the cached result
//! - `GET /health` - Health check

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use aquahealth::api::{AppState, router};
use aquahealth::clock::SystemClock;
use aquahealth::config::{AppConfig, ProviderConfig};
use aquahealth::data_sources::{DataProvider, RestProvider};
use aquahealth::engine::HealthEngine;
use aquahealth::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("aquahealth=info".parse()?))
        .init();

    let config = AppConfig::from_env()?;

    let provider: Arc<dyn DataProvider> = match &config.provider {
        ProviderConfig::Sqlite { database_url } => {
            info!(database_url = %database_url, "Using SQLite data provider");
            Arc::new(Storage::new(database_url).await?)
        }
        ProviderConfig::Rest { base_url, api_key } => {
            info!(base_url = %base_url, "Using hosted backend data provider");
            Arc::new(RestProvider::new(base_url, api_key.clone()))
        }
    };

    info!(
        port = config.port,
        cache_ttl_secs = config.engine.cache_ttl.as_secs(),
        fetch_timeout_secs = config.engine.fetch_timeout.as_secs(),
        "Starting Aquahealth server"
    );

    let engine = HealthEngine::new(provider, Arc::new(SystemClock), config.engine.clone());
    let app = router(AppState { engine }).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Aquahealth is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
