use crate::core::{ApiError, AppState};
use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct KeyParam {
    key: Option<String>,
}

/// Access gate: every request entering this boundary must carry the shared
/// secret as a `key` query parameter. The mail transport embeds it in its
/// forward URL; everything else is a client that was configured with it.
/// A mismatch is rejected before any handler runs.
pub async fn require_api_key(
    State(state): State<AppState>,
    Query(params): Query<KeyParam>,
    request: Request,
    next: Next,
) -> Response {
    match params.key {
        Some(ref key) if *key == state.config.master_key => next.run(request).await,
        _ => ApiError::Unauthorized.into_response(),
    }
}
