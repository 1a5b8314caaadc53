use chrono::{DateTime, Utc};
use inbox::{Attachment, InboxStore, Message};
use mail_parser::{MessageParser, MimeHeaders};
use notify::Notifier;
use registry::Registry;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from the ingestion gateway.
///
/// `MissingRecipient`, `MissingBody` and `ParseError` are terminal; the
/// transport should not retry them. `Store` failures are transient and safe
/// to re-queue upstream.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("missing recipient")]
    MissingRecipient,

    #[error("missing message body")]
    MissingBody,

    #[error("failed to parse email content")]
    ParseError,

    #[error(transparent)]
    Store(#[from] inbox::InboxError),
}

/// Receives raw message bytes from the mail transport, parses them and fans
/// the result out: inbox append (durable for the caller), registry touch
/// (best-effort) and realtime publish (fire-and-forget).
#[derive(Clone)]
pub struct Gateway {
    registry: Registry,
    inbox: Arc<dyn InboxStore>,
    notifier: Notifier,
}

impl Gateway {
    pub fn new(registry: Registry, inbox: Arc<dyn InboxStore>, notifier: Notifier) -> Self {
        Self {
            registry,
            inbox,
            notifier,
        }
    }

    /// Ingests one raw message for `recipient`. Success means the message is
    /// visible in the inbox store; notifier or touch failures never undo it.
    pub async fn ingest(&self, recipient: &str, raw: Vec<u8>) -> Result<Message, IngestError> {
        let recipient = recipient.trim().to_lowercase();
        if recipient.is_empty() {
            return Err(IngestError::MissingRecipient);
        }
        if raw.is_empty() {
            return Err(IngestError::MissingBody);
        }

        // MIME parsing is the one CPU-heavy step; keep large attachments off
        // the connection-accept path.
        let to = recipient.clone();
        let message = tokio::task::spawn_blocking(move || parse_message(&raw, &to))
            .await
            .map_err(|_| IngestError::ParseError)??;

        self.inbox.append(&recipient, message.clone()).await?;

        // The message is already visible to readers; a failed touch must not
        // roll it back.
        if let Err(e) = self.registry.touch(&recipient).await {
            warn!(recipient = %recipient, error = %e, "failed to touch address record");
        }

        let delivered = self.notifier.publish(&recipient, message.clone()).await;
        info!(recipient = %recipient, subscribers = delivered, "stored inbound message");

        Ok(message)
    }
}

/// Parses raw RFC 5322 bytes into our message shape. Attachment content is
/// dropped; only its metadata survives.
pub fn parse_message(raw: &[u8], to: &str) -> Result<Message, IngestError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or(IngestError::ParseError)?;

    let sender = parsed
        .from()
        .and_then(|from| from.first())
        .map(|addr| match (addr.name.as_deref(), addr.address.as_deref()) {
            (Some(name), Some(address)) => format!("{name} <{address}>"),
            (None, Some(address)) => address.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => "unknown".to_string(),
        })
        .unwrap_or_else(|| "unknown".to_string());

    let attachments = parsed
        .attachments()
        .map(|part| Attachment {
            filename: part.attachment_name().map(|s| s.to_string()),
            content_type: part.content_type().map(|ct| match ct.subtype() {
                Some(subtype) => format!("{}/{}", ct.ctype(), subtype),
                None => ct.ctype().to_string(),
            }),
            size: part.contents().len(),
        })
        .collect();

    let received_at = parsed
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    Ok(Message {
        sender,
        subject: parsed
            .subject()
            .unwrap_or("(no subject)")
            .to_string(),
        body_text: parsed
            .body_text(0)
            .map(|s| s.to_string())
            .unwrap_or_default(),
        body_html: parsed
            .body_html(0)
            .map(|s| s.to_string())
            .unwrap_or_default(),
        attachments,
        received_at,
        to: to.to_string(),
    })
}
