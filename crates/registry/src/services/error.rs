use inbox::InboxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Domain is not on the allow-list")]
    InvalidDomain,

    #[error("Address is already taken")]
    AddressTaken,

    #[error("Address not found")]
    NotFound,

    #[error("Address is owned by a different device")]
    Forbidden,

    #[error("Failed to generate a unique address after {0} attempts")]
    ExhaustedAttempts(usize),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Inbox store error: {0}")]
    Inbox(#[from] InboxError),
}
