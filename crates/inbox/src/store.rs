use crate::message::Message;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Errors surfaced by an inbox store.
#[derive(Debug, Error)]
pub enum InboxError {
    #[error("no message at index {0}")]
    NotFound(usize),

    /// Transient backend failure. The in-memory store never produces this,
    /// but callers must treat it as retryable when a networked backend
    /// (e.g. Redis) sits behind the trait.
    #[error("inbox store unavailable: {0}")]
    Unavailable(String),
}

/// Time-boxed, per-address message lists.
///
/// Keys are bare address strings; nothing here checks the registry, so an
/// inbox can go live for an address that was never issued (mail-transport
/// deployments rely on that).
#[async_trait]
pub trait InboxStore: Send + Sync {
    /// Appends a message, arming or refreshing the list's TTL.
    async fn append(&self, address: &str, message: Message) -> Result<(), InboxError>;

    /// Returns the live messages in insertion order. Unknown and expired
    /// addresses both yield an empty list, not an error.
    async fn list(&self, address: &str) -> Result<Vec<Message>, InboxError>;

    /// Removes the message at `index` (0-based, insertion order).
    async fn delete_one(&self, address: &str, index: usize) -> Result<(), InboxError>;

    /// Drops the whole list immediately, TTL notwithstanding.
    async fn delete_all(&self, address: &str) -> Result<(), InboxError>;

    /// True iff the address currently has a live (unexpired) key.
    async fn exists(&self, address: &str) -> Result<bool, InboxError>;

    /// Purges expired keys, returning how many were dropped. Intended for a
    /// periodic background task; reads also expire lazily.
    async fn sweep(&self) -> Result<usize, InboxError>;
}

struct Entry {
    messages: Vec<Message>,
    deadline: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.deadline > now
    }
}

/// In-process inbox store with sliding expiry.
///
/// TTL policy: **sliding** — every append pushes the whole list's deadline
/// out to `now + ttl`. A busy inbox therefore stays alive as long as mail
/// keeps arriving; an idle one is purged `ttl` after its last message.
pub struct MemoryInbox {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryInbox {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl InboxStore for MemoryInbox {
    async fn append(&self, address: &str, message: Message) -> Result<(), InboxError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(address.to_string())
            .and_modify(|e| {
                // An expired key a sweep hasn't caught yet starts fresh.
                if !e.is_live(now) {
                    e.messages.clear();
                }
            })
            .or_insert_with(|| Entry {
                messages: Vec::new(),
                deadline: now,
            });
        entry.messages.push(message);
        entry.deadline = now + self.ttl;
        Ok(())
    }

    async fn list(&self, address: &str) -> Result<Vec<Message>, InboxError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(address) {
            Some(entry) if entry.is_live(now) => Ok(entry.messages.clone()),
            Some(_) => {
                entries.remove(address);
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn delete_one(&self, address: &str, index: usize) -> Result<(), InboxError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let entry = entries
            .get_mut(address)
            .filter(|e| e.is_live(now))
            .ok_or(InboxError::NotFound(index))?;
        if index >= entry.messages.len() {
            return Err(InboxError::NotFound(index));
        }
        entry.messages.remove(index);
        Ok(())
    }

    async fn delete_all(&self, address: &str) -> Result<(), InboxError> {
        self.entries.lock().await.remove(address);
        Ok(())
    }

    async fn exists(&self, address: &str) -> Result<bool, InboxError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries.get(address).is_some_and(|e| e.is_live(now)))
    }

    async fn sweep(&self) -> Result<usize, InboxError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        let purged = before - entries.len();
        if purged > 0 {
            debug!(purged, "swept expired inboxes");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(subject: &str, to: &str) -> Message {
        Message {
            sender: "someone@example.com".into(),
            subject: subject.into(),
            body_text: "hello".into(),
            body_html: String::new(),
            attachments: Vec::new(),
            received_at: Utc::now(),
            to: to.into(),
        }
    }

    #[tokio::test]
    async fn append_preserves_insertion_order() {
        let store = MemoryInbox::new(Duration::from_secs(60));
        store.append("a@d", message("first", "a@d")).await.unwrap();
        store.append("a@d", message("second", "a@d")).await.unwrap();

        let messages = store.list("a@d").await.unwrap();
        let subjects: Vec<_> = messages.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, ["first", "second"]);
    }

    #[tokio::test]
    async fn unknown_address_lists_empty() {
        let store = MemoryInbox::new(Duration::from_secs(60));
        assert!(store.list("nobody@d").await.unwrap().is_empty());
        assert!(!store.exists("nobody@d").await.unwrap());
    }

    #[tokio::test]
    async fn messages_expire_after_ttl() {
        let store = MemoryInbox::new(Duration::from_millis(30));
        store.append("a@d", message("hi", "a@d")).await.unwrap();
        assert!(store.exists("a@d").await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.list("a@d").await.unwrap().is_empty());
        assert!(!store.exists("a@d").await.unwrap());
    }

    #[tokio::test]
    async fn ttl_slides_on_append() {
        let store = MemoryInbox::new(Duration::from_millis(80));
        store.append("a@d", message("one", "a@d")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.append("a@d", message("two", "a@d")).await.unwrap();

        // Past the original deadline, but within the refreshed one.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.list("a@d").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn delete_one_out_of_bounds_is_not_found() {
        let store = MemoryInbox::new(Duration::from_secs(60));
        store.append("a@d", message("one", "a@d")).await.unwrap();
        store.append("a@d", message("two", "a@d")).await.unwrap();

        assert!(matches!(
            store.delete_one("a@d", 5).await,
            Err(InboxError::NotFound(5))
        ));
        assert!(matches!(
            store.delete_one("empty@d", 0).await,
            Err(InboxError::NotFound(0))
        ));
    }

    #[tokio::test]
    async fn delete_one_removes_by_insertion_index() {
        let store = MemoryInbox::new(Duration::from_secs(60));
        store.append("a@d", message("one", "a@d")).await.unwrap();
        store.append("a@d", message("two", "a@d")).await.unwrap();
        store.append("a@d", message("three", "a@d")).await.unwrap();

        store.delete_one("a@d", 1).await.unwrap();
        let subjects: Vec<_> = store
            .list("a@d")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.subject)
            .collect();
        assert_eq!(subjects, ["one", "three"]);
    }

    #[tokio::test]
    async fn delete_all_clears_immediately() {
        let store = MemoryInbox::new(Duration::from_secs(60));
        store.append("a@d", message("one", "a@d")).await.unwrap();
        store.delete_all("a@d").await.unwrap();

        assert!(store.list("a@d").await.unwrap().is_empty());
        assert!(!store.exists("a@d").await.unwrap());
    }

    #[tokio::test]
    async fn sweep_purges_only_expired_keys() {
        let store = MemoryInbox::new(Duration::from_millis(30));
        store.append("old@d", message("x", "old@d")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        store.append("new@d", message("y", "new@d")).await.unwrap();

        assert_eq!(store.sweep().await.unwrap(), 1);
        assert!(!store.exists("old@d").await.unwrap());
        assert!(store.exists("new@d").await.unwrap());
    }
}
