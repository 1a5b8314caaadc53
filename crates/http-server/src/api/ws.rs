use crate::core::AppState;
use axum::{
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

/// Commands a connected client may send over the socket.
#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientCommand {
    Subscribe { address: String },
    Unsubscribe { address: String },
}

pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

/// One task per connection. Subscriptions are transient: they live in this
/// function's local map and die with the socket, so a restart drops them all
/// and clients re-subscribe.
async fn client_session(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // All per-address forwarders funnel into one writer task so frames for
    // different addresses never interleave mid-write.
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if sink.send(WsMessage::Text(event)).await.is_err() {
                break;
            }
        }
    });

    let mut subscriptions: HashMap<String, JoinHandle<()>> = HashMap::new();

    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            WsMessage::Text(text) => {
                let Ok(command) = serde_json::from_str::<ClientCommand>(&text) else {
                    debug!("ignoring malformed subscribe frame");
                    continue;
                };
                match command {
                    ClientCommand::Subscribe { address } => {
                        let address = address.to_lowercase();
                        if subscriptions.contains_key(&address) {
                            continue;
                        }
                        let receiver = state.notifier.subscribe(&address).await;
                        let handle =
                            tokio::spawn(forward_new_mail(receiver, address.clone(), events_tx.clone()));
                        debug!(address = %address, "subscribed");
                        subscriptions.insert(address, handle);
                    }
                    ClientCommand::Unsubscribe { address } => {
                        if let Some(handle) = subscriptions.remove(&address.to_lowercase()) {
                            handle.abort();
                        }
                    }
                }
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    // Implicit unsubscribe-all on connection close.
    for handle in subscriptions.into_values() {
        handle.abort();
    }
    writer.abort();
}

/// Forwards one address's broadcast stream into the connection's writer.
/// Lagging only loses this subscriber's backlog; delivery is best-effort.
async fn forward_new_mail(
    mut receiver: broadcast::Receiver<inbox::Message>,
    address: String,
    events: mpsc::UnboundedSender<String>,
) {
    loop {
        match receiver.recv().await {
            Ok(message) => {
                let event = json!({
                    "event": "new_mail",
                    "address": address,
                    "message": message,
                })
                .to_string();
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
