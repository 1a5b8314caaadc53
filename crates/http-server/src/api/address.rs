use crate::core::{ApiError, AppState};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use registry::{Address, Availability};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 20;

const DEFAULT_HISTORY_LIMIT: u32 = 20;

#[derive(Deserialize)]
pub struct GenerateParams {
    #[serde(rename = "deviceId")]
    pub device_id: Option<String>,
}

#[derive(Deserialize)]
pub struct GenerateManualParams {
    pub username: Option<String>,
    pub domain: Option<String>,
    #[serde(rename = "deviceId")]
    pub device_id: Option<String>,
}

#[derive(Serialize)]
pub struct IssuedAddress {
    pub email: String,
    #[serde(rename = "deviceId")]
    pub device_id: String,
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub emails: Vec<Address>,
    pub pagination: Pagination,
}

#[derive(Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

#[derive(Deserialize)]
pub struct StarRequest {
    #[serde(rename = "isStarred")]
    pub is_starred: bool,
}

#[derive(Deserialize)]
pub struct DeleteHistoryParams {
    #[serde(rename = "deviceId")]
    pub device_id: Option<String>,
}

/// Issues a random address for the requesting device.
#[axum::debug_handler]
pub async fn generate_handler(
    State(state): State<AppState>,
    Query(params): Query<GenerateParams>,
) -> Result<Json<IssuedAddress>, ApiError> {
    let device_id = require_device_id(params.device_id)?;
    let issued = state.registry.issue_random(&device_id).await?;
    Ok(Json(IssuedAddress {
        email: issued.address,
        device_id,
    }))
}

/// Issues a caller-chosen address after validating the username and the
/// domain allow-list.
pub async fn generate_manual_handler(
    State(state): State<AppState>,
    Query(params): Query<GenerateManualParams>,
) -> Result<Json<IssuedAddress>, ApiError> {
    let device_id = require_device_id(params.device_id)?;
    let username = params
        .username
        .ok_or_else(|| ApiError::Validation("Username is required.".to_string()))?;
    validate_username(&username)?;
    let domain = params
        .domain
        .ok_or_else(|| ApiError::Validation("Domain is required.".to_string()))?;

    let issued = state
        .registry
        .issue_custom(&device_id, &username, &domain, state.inbox.as_ref())
        .await?;
    Ok(Json(IssuedAddress {
        email: issued.address,
        device_id,
    }))
}

/// Paginated address history for a device, starred entries first.
pub async fn history_handler(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let page = params.page.unwrap_or(1);
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);

    let (emails, total) = state.registry.list_for_owner(&device_id, page, limit).await?;
    Ok(Json(HistoryResponse {
        emails,
        pagination: Pagination {
            page,
            limit,
            total,
            pages: total.div_ceil(limit as u64),
        },
    }))
}

pub async fn starred_handler(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let emails = state.registry.list_starred_for_owner(&device_id).await?;
    Ok(Json(json!({ "emails": emails })))
}

pub async fn star_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Json(payload): Json<StarRequest>,
) -> Result<Json<Value>, ApiError> {
    let address = address.to_lowercase();
    state.registry.set_starred(&address, payload.is_starred).await?;
    Ok(Json(json!({ "success": true, "isStarred": payload.is_starred })))
}

/// Removes an address record, then purges its inbox. The second step is
/// best-effort: a failed purge is reported, not rolled back.
pub async fn delete_history_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<DeleteHistoryParams>,
) -> Result<Json<Value>, ApiError> {
    let address = address.to_lowercase();
    let device_id = require_device_id(params.device_id)?;

    state.registry.delete_for_owner(&address, &device_id).await?;

    let inbox_purged = match state.inbox.delete_all(&address).await {
        Ok(()) => true,
        Err(e) => {
            warn!(address = %address, error = %e, "inbox purge after delete failed");
            false
        }
    };

    Ok(Json(json!({
        "success": true,
        "message": "Email deleted from history",
        "inboxPurged": inbox_purged,
    })))
}

pub async fn check_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Availability>, ApiError> {
    let address = address.to_lowercase();
    let availability = state
        .registry
        .check_availability(&address, state.inbox.as_ref())
        .await?;
    Ok(Json(availability))
}

fn require_device_id(device_id: Option<String>) -> Result<String, ApiError> {
    device_id
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::Validation("Device ID is required.".to_string()))
}

/// Validates the username, checking for length and allowed characters.
fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.len() < MIN_USERNAME_LEN || username.len() > MAX_USERNAME_LEN {
        return Err(ApiError::Validation(format!(
            "Username must be between {MIN_USERNAME_LEN} and {MAX_USERNAME_LEN} characters."
        )));
    }
    if !username.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(ApiError::Validation(
            "Username can only contain alphanumeric characters and underscores.".to_string(),
        ));
    }
    Ok(())
}
