//! # Connection Manager
//!
//! Owns the single WebSocket to the node and implements [`Transport`].
//!
//! One background task runs the connection loop: connect, forward frames,
//! and on any failure back off and retry. There is no attempt limit; the
//! delay doubles per consecutive failure up to the configured cap and starts
//! over after a connection succeeds.
//!
//! ```text
//! [Disconnected] → [Connecting] → [Connected] ──drop──→ [Reconnecting] ─┐
//!                                     ↑                                 │
//!                                     └──────────── backoff ────────────┘
//! ```
//!
//! Outbound envelopes go through a per-connection channel. Its sender is
//! dropped when the socket closes, so nothing written while disconnected
//! reaches a later connection.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use plot_telemetry::{CONNECTION_READY, RECONNECTS};
use plot_types::{Envelope, SUBPROTOCOL};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, ConfigError};
use crate::domain::TransportError;
use crate::ports::{ConnectionEvent, Transport};

/// Connection lifecycle as seen from outside the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            _ => Self::Disconnected,
        }
    }
}

/// Delay before reconnect attempt `attempt` (0-based): `base * 2^attempt`,
/// capped.
#[must_use]
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 1u32 << attempt.min(20);
    base.saturating_mul(factor).min(cap)
}

/// Connection state written by the loop and read by everyone else.
#[derive(Default)]
struct Shared {
    ready: AtomicBool,
    generation: AtomicU64,
    state: AtomicU8,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn open(&self, outbound: mpsc::UnboundedSender<Message>) -> u64 {
        *self.outbound.lock() = Some(outbound);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.ready.store(true, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);
        CONNECTION_READY.set(1.0);
        generation
    }

    fn close(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.outbound.lock().take();
        CONNECTION_READY.set(0.0);
    }
}

#[derive(Debug, Clone)]
struct LoopSettings {
    url: String,
    connect_timeout: Duration,
    backoff_base: Duration,
    backoff_cap: Duration,
}

/// How an established session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Dropped,
    Shutdown,
}

/// Handle to the node connection. Clones share the same socket.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl ConnectionManager {
    /// Spawn the connection loop on the current tokio runtime.
    ///
    /// # Returns
    ///
    /// The handle and the receiver of connection events. Feed the receiver
    /// to [`crate::PlotClient::run`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when `config` fails validation; nothing is
    /// spawned.
    pub fn start(
        config: &ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<ConnectionEvent>), ConfigError> {
        config.validate()?;
        let shared = Arc::new(Shared::default());
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let settings = LoopSettings {
            url: config.endpoint_url(),
            connect_timeout: config.connect_timeout,
            backoff_base: config.backoff_base,
            backoff_cap: config.backoff_cap,
        };

        tokio::spawn(Self::connection_loop(
            settings,
            shared.clone(),
            event_tx,
            shutdown_rx,
        ));

        Ok((
            Self {
                shared,
                shutdown_tx: Arc::new(shutdown_tx),
            },
            event_rx,
        ))
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.shared.state.load(Ordering::SeqCst))
    }

    /// Close the socket and stop reconnecting.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn connection_loop(
        settings: LoopSettings,
        shared: Arc<Shared>,
        events: mpsc::Sender<ConnectionEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut attempt = 0u32;
        let mut first = true;

        loop {
            if *shutdown.borrow() {
                break;
            }
            shared.set_state(if first {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            });
            first = false;

            match Self::run_connection(&settings, &shared, &events, &mut shutdown).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Dropped) => {
                    attempt = 0;
                    if events.send(ConnectionEvent::Disconnected).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(url = %settings.url, attempt, error = %e, "Node connection failed");
                    attempt = attempt.saturating_add(1);
                }
            }

            let delay = backoff_delay(
                attempt.saturating_sub(1),
                settings.backoff_base,
                settings.backoff_cap,
            );
            debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnect");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            RECONNECTS.inc();
        }

        shared.close();
        shared.set_state(ConnectionState::Disconnected);
        debug!("Connection loop stopped");
    }

    async fn run_connection(
        settings: &LoopSettings,
        shared: &Shared,
        events: &mpsc::Sender<ConnectionEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, TransportError> {
        let connect_error = |reason: String| TransportError::Connect {
            url: settings.url.clone(),
            reason,
        };

        let mut request = settings
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| connect_error(e.to_string()))?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));

        let (ws_stream, _) = tokio::time::timeout(settings.connect_timeout, connect_async(request))
            .await
            .map_err(|_| TransportError::Timeout(settings.connect_timeout))?
            .map_err(|e| connect_error(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let generation = shared.open(out_tx);
        info!(url = %settings.url, generation, "Connected to node");

        if events
            .send(ConnectionEvent::Connected { generation })
            .await
            .is_err()
        {
            shared.close();
            return Ok(SessionEnd::Shutdown);
        }

        let end = loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let event = ConnectionEvent::Message(text.as_str().to_owned());
                        if events.send(event).await.is_err() {
                            break SessionEnd::Shutdown;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!(error = %e, "Failed to answer ping");
                            break SessionEnd::Dropped;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "Node closed the connection");
                        break SessionEnd::Dropped;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket read failed");
                        break SessionEnd::Dropped;
                    }
                    None => break SessionEnd::Dropped,
                },
                Some(message) = out_rx.recv() => {
                    if let Err(e) = write.send(message).await {
                        warn!(error = %e, "WebSocket write failed");
                        break SessionEnd::Dropped;
                    }
                }
                _ = shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    break SessionEnd::Shutdown;
                }
            }
        };

        shared.close();
        info!(generation, ?end, "Node connection closed");
        Ok(end)
    }
}

impl Transport for ConnectionManager {
    fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::SeqCst)
    }

    fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if !self.is_ready() {
            return Err(TransportError::NotReady);
        }

        let json = envelope.to_json()?;
        let outbound = self.shared.outbound.lock();
        let Some(tx) = outbound.as_ref() else {
            return Err(TransportError::NotReady);
        };
        tx.send(Message::Text(json.into()))
            .map_err(|_| TransportError::Closed)
    }
}
