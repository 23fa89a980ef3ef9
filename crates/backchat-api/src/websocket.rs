//! Push channel: one live WebSocket subscription to the chat server.
//!
//! [`PushChannel::open`] resolves once the handshake completes, then a
//! background reader task parses each text frame into an
//! [`InboundEvent`] and forwards it through an mpsc channel. The channel
//! never reconnects on its own: when the socket drops, [`PushChannel::recv`]
//! returns `None` and the caller decides what happens next.
//!
//! # Example
//!
//! ```rust,ignore
//! use backchat_api::websocket::PushChannel;
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let url = client.push_url("alice")?;
//! let mut channel = PushChannel::open(&url, &cancel).await?;
//!
//! while let Some(event) = channel.recv().await {
//!     println!("{event:?}");
//! }
//! ```

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::models::InboundEvent;

// ── Channel capacity ─────────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── PushChannel ──────────────────────────────────────────────────────

/// Handle to an open push subscription.
///
/// Dropping the handle (or calling [`close`](Self::close)) cancels the
/// reader task and sends a close frame. Closing twice is a no-op.
#[derive(Debug)]
pub struct PushChannel {
    events: mpsc::Receiver<InboundEvent>,
    cancel: CancellationToken,
}

impl PushChannel {
    /// Connect to `url` and spawn the frame reader.
    ///
    /// The reader runs under a child of `cancel`, so cancelling the parent
    /// token also tears the channel down. There is no handshake timeout:
    /// a stalled open resolves only by failure or by dropping the future.
    pub async fn open(url: &Url, cancel: &CancellationToken) -> Result<Self, Error> {
        tracing::info!(url = %url, "Connecting to push channel");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        tracing::info!("Push channel connected");

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let token = cancel.child_token();

        let task_token = token.clone();
        tokio::spawn(async move {
            if let Err(e) = read_frames(ws_stream, &events_tx, &task_token).await {
                tracing::warn!(error = %e, "Push channel read failed");
            }
            tracing::debug!("Push channel reader exiting");
        });

        Ok(Self::from_receiver(events_rx, token))
    }

    /// Build a channel from an already-running event source.
    ///
    /// The receiver yielding `None` is treated as the channel closing.
    /// Used by alternative transports and by test doubles.
    pub fn from_receiver(events: mpsc::Receiver<InboundEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// Next inbound event, or `None` once the channel has closed.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            event = self.events.recv() => event,
        }
    }

    /// Close the channel. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether [`close`](Self::close) has been called (directly or via the parent token).
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Frame reader ─────────────────────────────────────────────────────

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Read frames until the socket drops, the consumer goes away, or `cancel` fires.
async fn read_frames(
    mut ws: WsStream,
    events_tx: &mpsc::Sender<InboundEvent>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // Best effort; the peer may already be gone.
                let _ = ws.close(None).await;
                return Ok(());
            }
            frame = ws.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        let Some(event) = parse_frame(text.as_str()) else {
                            continue;
                        };
                        if events_tx.send(event).await.is_err() {
                            tracing::debug!("Push channel consumer dropped");
                            return Ok(());
                        }
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite answers pings itself
                        tracing::trace!("Push channel ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        return match frame {
                            Some(cf) if cf.code != CloseCode::Normal => Err(Error::WebSocketClosed {
                                code: u16::from(cf.code),
                                reason: cf.reason.to_string(),
                            }),
                            Some(_) => {
                                tracing::info!("Push channel closed normally");
                                Ok(())
                            }
                            None => {
                                tracing::info!("Push channel close frame received (no payload)");
                                Ok(())
                            }
                        };
                    }
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => {
                        tracing::info!("Push channel stream ended");
                        return Ok(());
                    }
                    Some(Ok(_)) => {
                        tracing::debug!("Ignoring non-text push frame");
                    }
                }
            }
        }
    }
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Parse one text frame. Malformed or unknown frames are logged and dropped.
pub fn parse_frame(text: &str) -> Option<InboundEvent> {
    match serde_json::from_str::<InboundEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, frame = text, "Dropping malformed push frame");
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
