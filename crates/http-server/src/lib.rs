pub mod api;
pub mod core;
pub mod gate;

use crate::core::AppState;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use inbox::InboxStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Builds the full boundary router. Every route sits behind the access gate;
/// the mail transport's ingestion hook carries the key in its forward URL.
pub fn app(state: AppState) -> Router {
    let max_body = state.config.max_message_size;
    Router::new()
        .route("/", get(|| async { "Disposable mail API is live" }))
        .route("/generate", get(api::address::generate_handler))
        .route("/generate/manual", get(api::address::generate_manual_handler))
        .route("/inbox/:address", get(api::inbox::list_inbox_handler))
        .route(
            "/delete/:address/:index",
            delete(api::inbox::delete_message_handler),
        )
        .route("/delete/:address", delete(api::inbox::delete_inbox_handler))
        .route(
            "/history/:key",
            get(api::address::history_handler).delete(api::address::delete_history_handler),
        )
        .route("/starred/:device_id", get(api::address::starred_handler))
        .route("/star/:address", put(api::address::star_handler))
        .route("/check/:address", get(api::address::check_handler))
        .route("/incoming/raw", post(api::incoming::incoming_raw_handler))
        .route("/ws", get(api::ws::ws_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gate::require_api_key,
        ))
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state)
}

/// Periodic purge of expired inbox keys. Reads expire lazily as well; this
/// keeps idle keys from pinning memory between reads.
pub fn spawn_sweeper(inbox: Arc<dyn InboxStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match inbox.sweep().await {
                Ok(purged) if purged > 0 => {
                    info!(purged, "cleanup: purged expired inboxes");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "inbox sweep failed"),
            }
            tokio::time::sleep(interval).await;
        }
    })
}
