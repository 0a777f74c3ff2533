/*
[INPUT]:  WebSocket URL, liveness window, cancellation signal
[OUTPUT]: One receive loop per connection + serialized outbound writes
[POS]:    WebSocket layer - socket lifetime management
[UPDATE]: When connection lifecycle or teardown semantics change
*/

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{BitfinexError, Result};
use crate::ws::codec;
use crate::ws::dispatcher::Dispatcher;
use crate::ws::lock;
use crate::ws::subscription::SubscriptionRegistry;

const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Connection lifecycle as published on the state watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Exclusive owner of the transport connection.
///
/// `connect` starts exactly one receive loop task; outbound writes funnel
/// through a channel drained by that same task, so the socket never sees
/// concurrent writers. The manager only reports state - reconnection policy
/// belongs to the caller.
pub(crate) struct Connection {
    url: String,
    liveness_window: Duration,
    registry: Arc<StdMutex<SubscriptionRegistry>>,
    outbound_tx: Mutex<Option<mpsc::Sender<WsMessage>>>,
    state_tx: watch::Sender<ConnectionState>,
    // Keep one receiver alive so `state_tx.send` retains its value even when
    // no external observer is currently subscribed; a watch channel with zero
    // receivers drops the sent value on the floor.
    _state_rx: watch::Receiver<ConnectionState>,
    shutdown: StdMutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    pub(crate) fn new(
        url: String,
        liveness_window: Duration,
        registry: Arc<StdMutex<SubscriptionRegistry>>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        Connection {
            url,
            liveness_window,
            registry,
            outbound_tx: Mutex::new(None),
            state_tx,
            _state_rx: state_rx,
            shutdown: StdMutex::new(CancellationToken::new()),
            task: Mutex::new(None),
        }
    }

    /// Observe connection state changes.
    pub(crate) fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Establish the transport and start the receive loop.
    ///
    /// Idempotent: a no-op while already connected. Construction never
    /// connects; callers decide when.
    pub(crate) async fn connect(self: Arc<Self>, dispatcher: Dispatcher) -> Result<()> {
        let mut slot = self.outbound_tx.lock().await;
        if slot.is_some() {
            debug!("connect called while already connected; ignoring");
            return Ok(());
        }

        let _ = self.state_tx.send(ConnectionState::Connecting);
        info!(url = %self.url, "connecting");

        let (stream, _response) = match connect_async(self.url.as_str()).await {
            Ok(ok) => ok,
            Err(err) => {
                let _ = self.state_tx.send(ConnectionState::Disconnected);
                return Err(BitfinexError::WebSocket(err.to_string()));
            }
        };

        let (write, read) = stream.split();
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        *slot = Some(outbound);
        drop(slot);

        let token = CancellationToken::new();
        *lock(&self.shutdown) = token.clone();
        let _ = self.state_tx.send(ConnectionState::Connected);
        info!("connected");

        let conn = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            run_loop(
                write,
                read,
                outbound_rx,
                &dispatcher,
                &token,
                conn.liveness_window,
            )
            .await;
            conn.teardown().await;
        });
        *self.task.lock().await = Some(handle);

        Ok(())
    }

    /// Queue one outbound text frame.
    ///
    /// Safe to call concurrently with the receive loop and with other
    /// `send` calls; the loop task serializes the actual socket writes.
    pub(crate) async fn send(&self, text: String) -> Result<()> {
        let sender = self.outbound_tx.lock().await.clone();
        let Some(sender) = sender else {
            return Err(BitfinexError::NotConnected);
        };
        sender
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|_| BitfinexError::WebSocket("outbound channel closed".to_string()))
    }

    /// Signal the receive loop to stop. Synchronous; safe from `Drop`.
    pub(crate) fn cancel(&self) {
        lock(&self.shutdown).cancel();
    }

    /// Cancel and wait for the receive loop to finish tearing down.
    pub(crate) async fn disconnect(&self) {
        self.cancel();
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Runs exactly once per connection, whatever ended the loop.
    async fn teardown(&self) {
        *self.outbound_tx.lock().await = None;
        lock(&self.registry).clear();
        let _ = self.state_tx.send(ConnectionState::Disconnected);
        info!("disconnected");
    }

    #[cfg(test)]
    pub(crate) async fn install_test_transport(&self) -> mpsc::Receiver<WsMessage> {
        let (outbound, outbound_rx) = mpsc::channel(16);
        *self.outbound_tx.lock().await = Some(outbound);
        let _ = self.state_tx.send(ConnectionState::Connected);
        outbound_rx
    }

    #[cfg(test)]
    pub(crate) async fn teardown_for_test(&self) {
        self.teardown().await;
    }
}

async fn run_loop(
    mut write: WsSink,
    mut read: WsSource,
    mut outbound_rx: mpsc::Receiver<WsMessage>,
    dispatcher: &Dispatcher,
    shutdown: &CancellationToken,
    liveness_window: Duration,
) {
    let mut deadline = Instant::now() + liveness_window;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = write.send(WsMessage::Close(None)).await;
                break;
            }
            _ = tokio::time::sleep_until(deadline) => {
                // Heartbeats count as frames; total silence means the
                // connection is dead and takes the normal teardown path.
                warn!(window = ?liveness_window, "no frames inside the liveness window; closing");
                let _ = write.send(WsMessage::Close(None)).await;
                break;
            }
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(message) => {
                        if write.send(message).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = write.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(message)) => {
                        deadline = Instant::now() + liveness_window;
                        match message {
                            WsMessage::Text(text) => {
                                dispatcher.dispatch(codec::decode(text.as_str()));
                            }
                            WsMessage::Binary(bytes) => {
                                if let Ok(text) = std::str::from_utf8(&bytes) {
                                    dispatcher.dispatch(codec::decode(text));
                                }
                            }
                            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
                            WsMessage::Close(_) => {
                                info!("websocket closed by server");
                                break;
                            }
                            WsMessage::Frame(_) => {}
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "websocket error");
                        break;
                    }
                    None => {
                        debug!("websocket stream ended");
                        break;
                    }
                }
            }
        }
    }
}
