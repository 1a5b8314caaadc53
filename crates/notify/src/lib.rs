use inbox::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Per-subscriber buffer. A subscriber that lags this far behind starts
/// missing messages; delivery is best-effort.
const CHANNEL_CAPACITY: usize = 64;

/// Fan-out of freshly ingested mail to live subscribers.
///
/// One lazily created broadcast channel per address. Publishing never blocks
/// ingestion: with no subscribers the send is dropped on the floor, and a
/// slow subscriber only loses its own backlog. There is no retroactive
/// delivery; late subscribers read the inbox store for history.
#[derive(Clone, Default)]
pub struct Notifier {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<Message>>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in an address. The receiver sees every message
    /// published after this call; dropping it unsubscribes.
    pub async fn subscribe(&self, address: &str) -> broadcast::Receiver<Message> {
        let mut channels = self.channels.write().await;
        channels
            .entry(address.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Delivers `message` to every current subscriber of `address`.
    /// Returns how many subscribers it reached.
    pub async fn publish(&self, address: &str, message: Message) -> usize {
        let delivered = {
            let channels = self.channels.read().await;
            match channels.get(address) {
                Some(tx) => tx.send(message).unwrap_or(0),
                None => return 0,
            }
        };
        if delivered == 0 {
            // Last subscriber is gone; drop the channel so idle addresses
            // don't accumulate.
            let mut channels = self.channels.write().await;
            if channels
                .get(address)
                .is_some_and(|tx| tx.receiver_count() == 0)
            {
                channels.remove(address);
                debug!(address, "pruned subscriber channel");
            }
        }
        delivered
    }

    /// Number of live subscriptions for an address.
    pub async fn subscriber_count(&self, address: &str) -> usize {
        self.channels
            .read()
            .await
            .get(address)
            .map_or(0, |tx| tx.receiver_count())
    }
}
