//! Creator hub connection server
//!
//! Serves the OAuth authorize/callback redirects and the connection
//! management API on top of in-memory stores.

use anyhow::{Context, Result};
use hub_connect_oauth2::{
    AuthorizationStateStore, ConnectConfig, ConnectionService, InMemoryAuthorizationStore,
    InMemoryConnectionStore, Platform,
};
use hub_connect_server::settings::LoggingSettings;
use hub_connect_server::{AppState, Settings, router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load().context("Failed to load configuration")?;
    init_tracing(&settings.logging)?;

    let config = settings.connect_config(ConnectConfig::from_env());
    for platform in Platform::ALL {
        if !config.has_credentials(platform) {
            warn!(%platform, "No client credentials configured");
        }
    }

    let pending = Arc::new(InMemoryAuthorizationStore::new());
    let service = ConnectionService::new(
        config,
        Arc::new(InMemoryConnectionStore::new()),
        pending.clone(),
    )
    .context("Failed to create connection service")?;

    spawn_state_cleanup(
        pending,
        Duration::from_secs(settings.oauth.state_cleanup_interval_seconds),
    );

    let app = router(AppState::new(service));

    let addr = SocketAddr::new(settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Connection server listening on http://{}", addr);
    info!("Platform catalogue: http://{}/api/platforms", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn init_tracing(logging: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_new(&logging.level).context("Invalid log filter")?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging.target)
        .with_level(true);

    match logging.format.to_lowercase().as_str() {
        "compact" => builder.compact().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.init(),
    }
    Ok(())
}

/// Periodically drop pending authorizations whose callback never arrived.
fn spawn_state_cleanup(store: Arc<InMemoryAuthorizationStore>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match store.cleanup_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "Expired pending authorizations removed"),
                Err(err) => warn!("Pending authorization cleanup failed: {}", err),
            }
        }
    });
}
