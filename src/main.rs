use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use bidwatch::{
    AppState,
    api::routes::create_router,
    config::Config,
    monitor::{MonitorSession, fetcher::RelayClient, notify::TracingNotify, store::JsonFileStore},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let app_state = AppState {
        config: Arc::new(config.clone()),
    };

    // Build the router with routes
    let app = create_router(app_state);

    // Create the listener
    let listener = TcpListener::bind(config.server_addr).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Relay listening on {}", local_addr);

    // Optional monitor autostart against our own relay.
    let session = match &config.monitor {
        Some(target) => {
            let relay_url = target
                .relay_url
                .clone()
                .unwrap_or_else(|| format!("http://{}/fetch", local_addr));

            let session = Arc::new(MonitorSession::new(
                Arc::new(RelayClient::new(relay_url)),
                Arc::new(JsonFileStore::new(&config.state_file)),
                Arc::new(TracingNotify),
            ));
            session
                .start_monitoring(&target.url, target.interval, target.keywords.clone())
                .await?;
            tracing::info!("Monitoring {} every {:?}", target.url, target.interval);
            Some(session)
        }
        None => None,
    };

    // Start the server
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl-c");
            tracing::info!("Shutdown signal received");
        })
        .await?;

    if let Some(session) = session {
        session.stop_monitoring().await;
    }

    Ok(())
}
