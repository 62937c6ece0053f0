/// Live push channel: websocket client with automatic reconnect
///
/// One connection per authenticated user. A supervisor task dials, subscribes
/// to the user's personal topic, and only then reports `Connected`; on a
/// transport drop it reverts to `Disconnected` and redials after a fixed
/// backoff, indefinitely, until the handle is torn down.
use crate::error::{ChatError, Result};
use crate::message::{ChatMessage, MessageType};
use crate::session::SessionHandle;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// Connection state of the push channel, process-wide per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Live channel configuration
#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub ws_url: String,
    pub reconnect_backoff: Duration,
}

impl LiveConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            reconnect_backoff: Duration::from_secs(3),
        }
    }
}

/// Frames the client writes to the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Subscribe to a topic (sent once per connection, before the channel is
    /// reported connected)
    Subscribe { destination: String },

    /// Publish a chat message to the application destination
    Publish {
        destination: String,
        message: ChatMessage,
    },
}

/// Inbound frame body: the server's new-message notification
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatNotification {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub content: String,
}

impl ChatNotification {
    /// Notifications carry no timestamp; the arrival instant is used.
    pub fn into_message(self) -> ChatMessage {
        ChatMessage {
            id: Some(self.id),
            sender_id: self.sender_id,
            recipient_id: self.receiver_id,
            content: self.content,
            timestamp: Utc::now(),
            message_type: MessageType::Text,
            seq: 0,
        }
    }
}

/// Personal inbound topic for one user
pub fn user_topic(user_id: i64) -> String {
    format!("/topic/user/{}", user_id)
}

/// Application destination for outbound sends
pub const SEND_DESTINATION: &str = "/app/chat";

/// Anything the synchronizer can push an outbound message through.
/// `LiveHandle` is the real implementation; tests substitute a recorder.
pub trait LiveSender: Send + Sync {
    fn send(&self, message: &ChatMessage) -> Result<()>;
}

/// Cancellable handle to the running channel
#[derive(Clone)]
pub struct LiveHandle {
    outgoing: mpsc::UnboundedSender<ChatMessage>,
    state_rx: watch::Receiver<ConnectionState>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl LiveHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch the connection state (drives the UI connectivity indicator and
    /// the synchronizer's outbox flush)
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Queue a message for delivery. Valid only while connected; otherwise
    /// the caller must queue or surface the failure itself.
    pub fn send(&self, message: &ChatMessage) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(ChatError::NotConnected);
        }
        self.outgoing
            .send(message.clone())
            .map_err(|_| ChatError::Transport("Live channel task is gone".to_string()))
    }

    /// Tear the connection down and stop reconnecting
    pub fn disconnect(&self) {
        let _ = self.stop_tx.send(true);
    }
}

impl LiveSender for LiveHandle {
    fn send(&self, message: &ChatMessage) -> Result<()> {
        LiveHandle::send(self, message)
    }
}

/// Connect the live channel for the authenticated user.
///
/// Returns the control handle and the inbound message stream. Fails
/// synchronously only when there is no active session; transport failures
/// are absorbed into the reconnect loop.
pub fn connect(
    config: LiveConfig,
    session: &SessionHandle,
) -> Result<(LiveHandle, mpsc::UnboundedReceiver<ChatMessage>)> {
    let user_id = session
        .user_id()
        .ok_or_else(|| ChatError::Validation("No active session".to_string()))?;

    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
    let (stop_tx, stop_rx) = watch::channel(false);

    tokio::spawn(supervisor(
        config,
        user_id,
        state_tx,
        inbound_tx,
        outgoing_rx,
        stop_rx,
    ));

    Ok((
        LiveHandle {
            outgoing: outgoing_tx,
            state_rx,
            stop_tx: Arc::new(stop_tx),
        },
        inbound_rx,
    ))
}

/// Dial, subscribe, pump, back off, repeat
async fn supervisor(
    config: LiveConfig,
    user_id: i64,
    state_tx: watch::Sender<ConnectionState>,
    inbound_tx: mpsc::UnboundedSender<ChatMessage>,
    mut outgoing_rx: mpsc::UnboundedReceiver<ChatMessage>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        if *stop_rx.borrow() {
            break;
        }

        state_tx.send_replace(ConnectionState::Connecting);
        match connect_async(config.ws_url.as_str()).await {
            Ok((ws, _)) => {
                let (mut sink, mut stream) = ws.split();

                // The subscription must be in place before consumers see
                // `Connected`.
                let subscribe = ClientFrame::Subscribe {
                    destination: user_topic(user_id),
                };
                let subscribed = match serde_json::to_string(&subscribe) {
                    Ok(frame) => sink.send(WsMessage::Text(frame)).await.is_ok(),
                    Err(e) => {
                        warn!("Failed to encode subscribe frame: {}", e);
                        false
                    }
                };

                if subscribed {
                    info!("Live channel connected, subscribed to {}", user_topic(user_id));
                    state_tx.send_replace(ConnectionState::Connected);

                    loop {
                        tokio::select! {
                            changed = stop_rx.changed() => {
                                // Explicit teardown, or every handle dropped
                                if changed.is_err() || *stop_rx.borrow() {
                                    let _ = sink.send(WsMessage::Close(None)).await;
                                    state_tx.send_replace(ConnectionState::Disconnected);
                                    return;
                                }
                            }
                            Some(message) = outgoing_rx.recv() => {
                                let frame = ClientFrame::Publish {
                                    destination: SEND_DESTINATION.to_string(),
                                    message,
                                };
                                let encoded = match serde_json::to_string(&frame) {
                                    Ok(encoded) => encoded,
                                    Err(e) => {
                                        warn!("Failed to encode outbound message: {}", e);
                                        continue;
                                    }
                                };
                                if let Err(e) = sink.send(WsMessage::Text(encoded)).await {
                                    warn!("Live channel write failed: {}", e);
                                    break;
                                }
                            }
                            frame = stream.next() => {
                                match frame {
                                    Some(Ok(WsMessage::Text(body))) => {
                                        match serde_json::from_str::<ChatNotification>(&body) {
                                            Ok(notification) => {
                                                if inbound_tx.send(notification.into_message()).is_err() {
                                                    debug!("Inbound consumer dropped, closing channel");
                                                    let _ = sink.send(WsMessage::Close(None)).await;
                                                    state_tx.send_replace(ConnectionState::Disconnected);
                                                    return;
                                                }
                                            }
                                            // Malformed frames are dropped, never fatal
                                            Err(e) => warn!("Dropping malformed inbound frame: {}", e),
                                        }
                                    }
                                    Some(Ok(WsMessage::Ping(payload))) => {
                                        if sink.send(WsMessage::Pong(payload)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Some(Ok(WsMessage::Close(_))) | None => {
                                        debug!("Live channel closed by server");
                                        break;
                                    }
                                    Some(Ok(_)) => {}
                                    Some(Err(e)) => {
                                        warn!("Live channel read failed: {}", e);
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }

                state_tx.send_replace(ConnectionState::Disconnected);
                warn!(
                    "Live channel dropped, reconnecting in {:?}",
                    config.reconnect_backoff
                );
            }
            Err(e) => {
                state_tx.send_replace(ConnectionState::Disconnected);
                warn!(
                    "Live channel connect to {} failed: {} (retry in {:?})",
                    config.ws_url, e, config.reconnect_backoff
                );
            }
        }

        // Fixed-interval backoff, interruptible by teardown
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = sleep(config.reconnect_backoff) => {}
        }
    }

    state_tx.send_replace(ConnectionState::Disconnected);
}
