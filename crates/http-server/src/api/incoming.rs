use crate::core::{ApiError, AppState};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct IncomingParams {
    pub to: Option<String>,
}

/// Ingestion hook for the external mail transport: raw message bytes in the
/// body, resolved recipient in `to`. A 200 here means the message is stored;
/// anything else tells the transport to treat delivery as failed.
pub async fn incoming_raw_handler(
    State(state): State<AppState>,
    Query(params): Query<IncomingParams>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let recipient = params.to.unwrap_or_default();
    state.gateway.ingest(&recipient, body.to_vec()).await?;
    Ok(StatusCode::OK)
}
