use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attachment metadata only. The content itself is never stored; clients that
/// want it have to fetch the original mail before the inbox expires, which in
/// practice means "we don't serve attachment bodies".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: Option<String>,
    #[serde(rename = "contentType")]
    pub content_type: Option<String>,
    pub size: usize,
}

/// A parsed inbound email, as held in an inbox and pushed to subscribers.
/// Wire field names match what mobile clients already consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "from")]
    pub sender: String,
    pub subject: String,
    #[serde(rename = "text")]
    pub body_text: String,
    #[serde(rename = "html")]
    pub body_html: String,
    pub attachments: Vec<Attachment>,
    #[serde(rename = "date")]
    pub received_at: DateTime<Utc>,
    pub to: String,
}
