use dotenvy::dotenv;
use http_server::core::{AppConfig, AppState};
use inbox::{InboxStore, MemoryInbox};
use ingest::Gateway;
use notify::Notifier;
use registry::Registry;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from a .env file.
    dotenv().ok();
    // Use a JSON logger for production-ready structured logging
    tracing_subscriber::fmt().json().init();

    // --- Configuration ---
    let config = AppConfig {
        master_key: env::var("MASTER_API_KEY").expect("MASTER_API_KEY must be set"),
        domains: env::var("ALLOWED_DOMAINS")
            .expect("ALLOWED_DOMAINS must be set")
            .split(',')
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect(),
        inbox_ttl: Duration::from_secs(
            env::var("INBOX_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3600),
        ),
        max_message_size: env::var("MAX_MESSAGE_SIZE_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(20 * 1024 * 1024),
    };
    if config.domains.is_empty() {
        panic!("ALLOWED_DOMAINS must contain at least one domain");
    }
    let port = env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3001);

    // --- Database Pool ---
    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://turbomail.db".to_string());
    let pool = match registry::connect(&database_url).await {
        Ok(pool) => {
            info!("Database pool created successfully.");
            pool
        }
        Err(e) => {
            error!("Failed to create database pool: {}", e);
            return Err(e.into());
        }
    };

    // --- Core components ---
    let registry = Registry::new(pool, config.domains.clone());
    registry.migrate().await?;
    let inbox_store: Arc<dyn InboxStore> = Arc::new(MemoryInbox::new(config.inbox_ttl));
    let notifier = Notifier::new();
    let gateway = Gateway::new(registry.clone(), inbox_store.clone(), notifier.clone());

    let state = AppState {
        registry,
        inbox: inbox_store.clone(),
        notifier,
        gateway,
        config: Arc::new(config),
    };

    let app = http_server::app(state);

    // Background cleanup task
    http_server::spawn_sweeper(inbox_store, SWEEP_INTERVAL);

    // --- Start HTTP Server ---
    // Bind to 0.0.0.0 to be reachable in a container
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("HTTP Server listening on {}", addr);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }

    Ok(())
}
