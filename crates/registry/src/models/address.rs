use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// How the local part came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AddressKind {
    Random,
    Custom,
}

/// A durable record of an issued temporary address. The address string is the
/// primary key; the record outlives its inbox content and is only removed by
/// an explicit owner action.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Address {
    pub address: String,
    #[serde(rename = "deviceId")]
    pub owner_id: String,
    #[serde(rename = "type")]
    pub kind: AddressKind,
    #[serde(rename = "isStarred")]
    pub starred: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastUsed")]
    pub last_used_at: DateTime<Utc>,
}

/// Result of the dual existence check over the registry and the live inbox
/// store. `exists` can be true while no registry row remains, because an
/// inbox key may stay live until its TTL runs out.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Availability {
    pub available: bool,
    pub exists: bool,
}
