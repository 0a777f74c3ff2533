/*
[INPUT]:  Subscribe/unsubscribe calls and listener registrations
[OUTPUT]: Live trade/candle callbacks + connection state notifications
[POS]:    WebSocket layer - public client facade
[UPDATE]: When the public streaming surface changes
*/

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{BitfinexError, Result};
use crate::types::{Candle, Timeframe, Trade};
use crate::ws::codec;
use crate::ws::connection::{Connection, ConnectionState};
use crate::ws::dispatcher::Dispatcher;
use crate::ws::events::{EventHub, ListenerId, MarketEvent};
use crate::ws::lock;
use crate::ws::subscription::{SubscriptionHandle, SubscriptionKey, SubscriptionRegistry};

/// Public WebSocket endpoint for market data
const WS_URL: &str = "wss://api-pub.bitfinex.com/ws/2";

const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(30);
const DEFAULT_EVENT_BUFFER: usize = 1024;

/// WebSocket client configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub url: String,
    /// Close the connection when no frame (data or heartbeat) arrives
    /// inside this window.
    pub liveness_window: Duration,
    /// Capacity of the listener event queue; overflow drops the newest
    /// event with a diagnostic.
    pub event_buffer: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: WS_URL.to_string(),
            liveness_window: DEFAULT_LIVENESS_WINDOW,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Streaming market-data client for the Bitfinex public feed.
///
/// Construction is passive: call [`BitfinexWebSocket::connect`] to establish
/// the socket. Subscribe calls return once the request frame is sent; the
/// exchange ack arrives asynchronously and resolves the returned
/// [`SubscriptionHandle`]. Subscriptions do not survive a disconnect and
/// must be re-requested after reconnecting; reconnect policy is the
/// caller's (watch [`BitfinexWebSocket::state`]).
pub struct BitfinexWebSocket {
    registry: Arc<StdMutex<SubscriptionRegistry>>,
    hub: Arc<EventHub>,
    connection: Arc<Connection>,
    events_tx: mpsc::Sender<MarketEvent>,
    events_rx: StdMutex<Option<mpsc::Receiver<MarketEvent>>>,
    pump: StdMutex<Option<JoinHandle<()>>>,
}

impl BitfinexWebSocket {
    /// Create a client with default configuration
    pub fn new() -> Self {
        Self::with_config(WsConfig::default())
    }

    /// Create a client with custom configuration
    pub fn with_config(config: WsConfig) -> Self {
        let registry = Arc::new(StdMutex::new(SubscriptionRegistry::new()));
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));
        let connection = Arc::new(Connection::new(
            config.url,
            config.liveness_window,
            Arc::clone(&registry),
        ));
        Self {
            registry,
            hub: Arc::new(EventHub::new()),
            connection,
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
            pump: StdMutex::new(None),
        }
    }

    /// Establish the connection and start the receive loop.
    ///
    /// Idempotent while already connected.
    pub async fn connect(&self) -> Result<()> {
        self.start_pump_if_needed();
        let dispatcher = Dispatcher::new(Arc::clone(&self.registry), self.events_tx.clone());
        Arc::clone(&self.connection).connect(dispatcher).await
    }

    /// Close the connection and wait for teardown.
    ///
    /// All subscriptions are evicted; their handles observe `Removed`.
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Observe connection state changes.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.state()
    }

    /// Subscribe to live trades for a pair (e.g. `"BTCUSD"`).
    pub async fn subscribe_trades(&self, pair: &str) -> Result<SubscriptionHandle> {
        self.subscribe(SubscriptionKey::trades(pair)).await
    }

    /// Unsubscribe from live trades for a pair.
    pub async fn unsubscribe_trades(&self, pair: &str) -> Result<()> {
        self.unsubscribe(&SubscriptionKey::trades(pair)).await
    }

    /// Subscribe to live candles for a pair and period.
    ///
    /// Supported periods are 60, 300, 900 and 3600 seconds; anything else
    /// fails with [`BitfinexError::UnsupportedTimeframe`] before any frame
    /// is sent. The `from`/`to`/`limit` range options exist for parity with
    /// the historical surface but the streaming feed always starts from
    /// "now"; use [`crate::http::BitfinexClient::get_candles`] for
    /// backfill.
    pub async fn subscribe_candles(
        &self,
        pair: &str,
        period_secs: u32,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<SubscriptionHandle> {
        let timeframe = Timeframe::from_period_secs(period_secs)
            .ok_or(BitfinexError::UnsupportedTimeframe { period_secs })?;
        if from.is_some() || to.is_some() || limit.is_some() {
            debug!(pair, "range options are ignored by the streaming feed; use get_candles for history");
        }
        self.subscribe(SubscriptionKey::candles(pair, timeframe)).await
    }

    /// Unsubscribe from live candles for a pair and period.
    pub async fn unsubscribe_candles(&self, pair: &str, period_secs: u32) -> Result<()> {
        let timeframe = Timeframe::from_period_secs(period_secs)
            .ok_or(BitfinexError::UnsupportedTimeframe { period_secs })?;
        self.unsubscribe(&SubscriptionKey::candles(pair, timeframe)).await
    }

    /// Register a listener for buy trades.
    pub fn on_buy_trade(&self, callback: impl Fn(&Trade) + Send + Sync + 'static) -> ListenerId {
        self.hub.on_buy_trade(callback)
    }

    /// Register a listener for sell trades.
    pub fn on_sell_trade(&self, callback: impl Fn(&Trade) + Send + Sync + 'static) -> ListenerId {
        self.hub.on_sell_trade(callback)
    }

    /// Register a listener for candle updates.
    pub fn on_candle(&self, callback: impl Fn(&Candle) + Send + Sync + 'static) -> ListenerId {
        self.hub.on_candle(callback)
    }

    /// Remove a previously registered listener.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.hub.remove_listener(id)
    }

    async fn subscribe(&self, key: SubscriptionKey) -> Result<SubscriptionHandle> {
        let handle = lock(&self.registry).request_subscribe(key.clone())?;
        let frame = codec::encode_subscribe(&key);
        if let Err(err) = self.connection.send(frame).await {
            // The request never went out; leave no ghost entry behind.
            lock(&self.registry).abort_request(&key);
            return Err(err);
        }
        Ok(handle)
    }

    async fn unsubscribe(&self, key: &SubscriptionKey) -> Result<()> {
        let chan_id = lock(&self.registry).request_unsubscribe(key)?;
        self.connection.send(codec::encode_unsubscribe(chan_id)).await
    }

    fn start_pump_if_needed(&self) {
        let mut pump = lock(&self.pump);
        if pump.is_some() {
            return;
        }
        if let Some(events_rx) = lock(&self.events_rx).take() {
            *pump = Some(Arc::clone(&self.hub).spawn_pump(events_rx));
        }
    }
}

impl Default for BitfinexWebSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BitfinexWebSocket {
    fn drop(&mut self) {
        self.connection.cancel();
        if let Some(handle) = lock(&self.pump).take() {
            handle.abort();
        }
    }
}
