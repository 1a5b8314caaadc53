use crate::core::{ApiError, AppState};
use axum::{
    extract::{Path, State},
    Json,
};
use inbox::Message;
use serde_json::{json, Value};
use tracing::warn;

/// Lists the live messages for an address, oldest first. Reading an inbox
/// counts as use, so the registry record is touched first (best-effort; the
/// read itself must not fail on a registry hiccup).
pub async fn list_inbox_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let address = address.to_lowercase();
    if let Err(e) = state.registry.touch(&address).await {
        warn!(address = %address, error = %e, "failed to touch address on inbox read");
    }
    let messages = state.inbox.list(&address).await?;
    Ok(Json(messages))
}

/// Deletes one message by 0-based index, or the whole inbox for the literal
/// index `all`.
pub async fn delete_message_handler(
    State(state): State<AppState>,
    Path((address, index)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let address = address.to_lowercase();
    if index == "all" {
        state.inbox.delete_all(&address).await?;
    } else {
        let index: usize = index
            .parse()
            .map_err(|_| ApiError::Validation("Message index must be a number or 'all'.".to_string()))?;
        state.inbox.delete_one(&address, index).await?;
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn delete_inbox_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let address = address.to_lowercase();
    state.inbox.delete_all(&address).await?;
    Ok(Json(json!({ "success": true })))
}
