/*
[INPUT]:  Decoded trade/candle events from the dispatcher queue
[OUTPUT]: Callback invocations on registered listeners
[POS]:    WebSocket layer - multi-subscriber event fan-out
[UPDATE]: When listener surfaces or delivery policy change
*/

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::types::{Candle, Side, Trade};

/// Token returned by listener registration; pass it back to remove the
/// listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        ListenerId(Uuid::new_v4())
    }
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;

/// One multi-subscriber listener set.
///
/// `emit` snapshots the current subscribers before invoking any of them, so
/// a listener may remove itself (or others) mid-dispatch without
/// deadlocking; the in-flight dispatch still reaches every subscriber that
/// was registered when it started.
pub(crate) struct Listeners<T> {
    callbacks: RwLock<HashMap<ListenerId, Callback<T>>>,
}

impl<T> Listeners<T> {
    fn new() -> Self {
        Listeners {
            callbacks: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ListenerId, Callback<T>>> {
        self.callbacks
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ListenerId, Callback<T>>> {
        self.callbacks
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn add(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId::new();
        self.write().insert(id, Arc::new(callback));
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        self.write().remove(&id).is_some()
    }

    pub(crate) fn emit(&self, event: &T) {
        let snapshot: Vec<Callback<T>> = self.read().values().cloned().collect();
        for callback in snapshot {
            callback(event);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.read().len()
    }
}

/// Fully-decoded event ready for listener delivery.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MarketEvent {
    Trade(Trade),
    Candle(Candle),
}

/// Listener sets for the three event streams, fed by a bounded queue so a
/// slow listener cannot stall frame ingestion.
pub(crate) struct EventHub {
    buy_trades: Listeners<Trade>,
    sell_trades: Listeners<Trade>,
    candles: Listeners<Candle>,
}

impl EventHub {
    pub(crate) fn new() -> Self {
        EventHub {
            buy_trades: Listeners::new(),
            sell_trades: Listeners::new(),
            candles: Listeners::new(),
        }
    }

    pub(crate) fn on_buy_trade(
        &self,
        callback: impl Fn(&Trade) + Send + Sync + 'static,
    ) -> ListenerId {
        self.buy_trades.add(callback)
    }

    pub(crate) fn on_sell_trade(
        &self,
        callback: impl Fn(&Trade) + Send + Sync + 'static,
    ) -> ListenerId {
        self.sell_trades.add(callback)
    }

    pub(crate) fn on_candle(
        &self,
        callback: impl Fn(&Candle) + Send + Sync + 'static,
    ) -> ListenerId {
        self.candles.add(callback)
    }

    pub(crate) fn remove_listener(&self, id: ListenerId) -> bool {
        self.buy_trades.remove(id) || self.sell_trades.remove(id) || self.candles.remove(id)
    }

    /// Deliver one event to the matching listener set.
    pub(crate) fn deliver(&self, event: MarketEvent) {
        match event {
            MarketEvent::Trade(trade) => match trade.side {
                Side::Buy => self.buy_trades.emit(&trade),
                Side::Sell => self.sell_trades.emit(&trade),
            },
            MarketEvent::Candle(candle) => self.candles.emit(&candle),
        }
    }

    /// Spawn the queue consumer; it runs until every sender is dropped.
    pub(crate) fn spawn_pump(
        self: Arc<Self>,
        mut events_rx: mpsc::Receiver<MarketEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                self.deliver(event);
            }
        })
    }
}
