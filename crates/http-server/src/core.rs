use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use inbox::{InboxError, InboxStore};
use ingest::{Gateway, IngestError};
use notify::Notifier;
use registry::{Registry, RegistryError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub inbox: Arc<dyn InboxStore>,
    pub notifier: Notifier,
    pub gateway: Gateway,
    pub config: Arc<AppConfig>,
}

/// Immutable service configuration, read once at startup and injected.
/// Rotating the shared secret means restarting with new configuration.
#[derive(Clone)]
pub struct AppConfig {
    pub master_key: String,
    pub domains: Vec<String>,
    pub inbox_ttl: Duration,
    pub max_message_size: usize,
}

/// Boundary error type: everything a handler can fail with, mapped to a
/// stable `{"error", "message"}` JSON body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Invalid API key")]
    Unauthorized,

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Inbox(#[from] InboxError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

fn inbox_kind(e: &InboxError) -> (StatusCode, &'static str) {
    match e {
        InboxError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        InboxError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            ApiError::Unauthorized => (StatusCode::FORBIDDEN, "unauthorized"),
            ApiError::Registry(e) => match e {
                RegistryError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
                RegistryError::InvalidDomain => (StatusCode::BAD_REQUEST, "invalid_domain"),
                RegistryError::AddressTaken => (StatusCode::CONFLICT, "address_taken"),
                RegistryError::NotFound => (StatusCode::NOT_FOUND, "not_found"),
                RegistryError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
                RegistryError::ExhaustedAttempts(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "exhausted_attempts")
                }
                RegistryError::Database(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
                }
                RegistryError::Inbox(ie) => inbox_kind(ie),
            },
            ApiError::Inbox(e) => inbox_kind(e),
            ApiError::Ingest(e) => match e {
                IngestError::MissingRecipient | IngestError::MissingBody => {
                    (StatusCode::BAD_REQUEST, "invalid_input")
                }
                IngestError::ParseError => (StatusCode::UNPROCESSABLE_ENTITY, "parse_error"),
                IngestError::Store(ie) => inbox_kind(ie),
            },
        };

        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let body = Json(json!({ "error": kind, "message": self.to_string() }));
        (status, body).into_response()
    }
}
