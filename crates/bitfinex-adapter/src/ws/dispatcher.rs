/*
[INPUT]:  Decoded frames from the receive loop
[OUTPUT]: Registry transitions + domain events on the bounded queue
[POS]:    WebSocket layer - frame routing against the registry
[UPDATE]: When frame handling or drop diagnostics change
*/

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::types::{Candle, Trade};
use crate::ws::codec::Frame;
use crate::ws::events::MarketEvent;
use crate::ws::lock;
use crate::ws::subscription::SubscriptionRegistry;

const DROP_LOG_LIMIT: usize = 5;

static UNRECOGNIZED_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);
static MALFORMED_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);
static OVERFLOW_LOG_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Routes each decoded frame, in receipt order, to the registry or the
/// event queue.
///
/// Every drop path here is local recovery: a noisy feed degrades into
/// diagnostics, never into a dead receive loop.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    registry: Arc<Mutex<SubscriptionRegistry>>,
    events_tx: mpsc::Sender<MarketEvent>,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<Mutex<SubscriptionRegistry>>,
        events_tx: mpsc::Sender<MarketEvent>,
    ) -> Self {
        Dispatcher {
            registry,
            events_tx,
        }
    }

    pub(crate) fn dispatch(&self, frame: Frame) {
        match frame {
            Frame::SubscribeAck { chan_id, key } => {
                lock(&self.registry).confirm_subscribe(chan_id, &key);
            }
            Frame::UnsubscribeAck { chan_id } => {
                lock(&self.registry).confirm_unsubscribe(chan_id);
            }
            Frame::ErrorAck { code, message, key } => {
                warn!(?code, %message, "error event from exchange");
                if let Some(key) = key {
                    lock(&self.registry).fail_subscribe(&key);
                }
            }
            Frame::Info => {
                debug!("info event");
            }
            Frame::Heartbeat { .. } => {
                // Liveness only; the receive loop already refreshed its
                // deadline when the frame arrived.
            }
            Frame::TradeUpdate { chan_id, trade } => {
                let Some(key) = lock(&self.registry).resolve(chan_id) else {
                    debug!(chan_id, "trade update for unmapped channel; dropping");
                    return;
                };
                match Trade::from_wire(&key.pair, trade.id, trade.time_ms, trade.amount, trade.price)
                {
                    Some(trade) => self.forward(MarketEvent::Trade(trade)),
                    None => log_malformed_once(chan_id, "trade"),
                }
            }
            Frame::CandleUpdate { chan_id, candle } => {
                let Some(key) = lock(&self.registry).resolve(chan_id) else {
                    debug!(chan_id, "candle update for unmapped channel; dropping");
                    return;
                };
                match Candle::from_wire(
                    &key.pair,
                    candle.open_time_ms,
                    candle.open,
                    candle.close,
                    candle.high,
                    candle.low,
                    candle.volume,
                ) {
                    Some(candle) => self.forward(MarketEvent::Candle(candle)),
                    None => log_malformed_once(chan_id, "candle"),
                }
            }
            Frame::Unrecognized => log_unrecognized_once(),
        }
    }

    fn forward(&self, event: MarketEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log_overflow_once(),
            Err(TrySendError::Closed(_)) => {
                debug!("event queue closed; dropping event");
            }
        }
    }
}

fn log_unrecognized_once() {
    let count = UNRECOGNIZED_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < DROP_LOG_LIMIT {
        debug!(
            sample_index = count + 1,
            sample_limit = DROP_LOG_LIMIT,
            "unrecognized frame dropped"
        );
    }
}

fn log_malformed_once(chan_id: u32, kind: &'static str) {
    let count = MALFORMED_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < DROP_LOG_LIMIT {
        warn!(
            sample_index = count + 1,
            sample_limit = DROP_LOG_LIMIT,
            chan_id,
            kind,
            "malformed payload dropped"
        );
    }
}

fn log_overflow_once() {
    let count = OVERFLOW_LOG_COUNT.fetch_add(1, Ordering::Relaxed);
    if count < DROP_LOG_LIMIT {
        warn!(
            sample_index = count + 1,
            sample_limit = DROP_LOG_LIMIT,
            "event queue full; dropping newest event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Side, Timeframe};
    use crate::ws::codec::{RawCandle, RawTrade, decode};
    use crate::ws::subscription::SubscriptionKey;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).expect("decimal literal")
    }

    fn setup(capacity: usize) -> (Dispatcher, Arc<Mutex<SubscriptionRegistry>>, mpsc::Receiver<MarketEvent>) {
        let registry = Arc::new(Mutex::new(SubscriptionRegistry::new()));
        let (events_tx, events_rx) = mpsc::channel(capacity);
        (Dispatcher::new(Arc::clone(&registry), events_tx), registry, events_rx)
    }

    fn raw_trade(amount: &str) -> RawTrade {
        RawTrade {
            id: "123".to_string(),
            time_ms: 1_690_000_000_000,
            amount: dec(amount),
            price: dec("65000.0"),
        }
    }

    #[tokio::test]
    async fn ack_then_trade_reaches_queue_as_sell() {
        let (dispatcher, registry, mut events_rx) = setup(8);
        lock(&registry)
            .request_subscribe(SubscriptionKey::trades("BTCUSD"))
            .expect("request");

        dispatcher.dispatch(decode(
            r#"{"event":"subscribed","chanId":17,"channel":"trades","symbol":"tBTCUSD"}"#,
        ));
        dispatcher.dispatch(decode(r#"[17,["te","123",1690000000000,-0.5,65000.0]]"#));

        let event = events_rx.try_recv().expect("one event queued");
        match event {
            MarketEvent::Trade(trade) => {
                assert_eq!(trade.pair, "BTCUSD");
                assert_eq!(trade.side, Side::Sell);
                assert_eq!(trade.amount, dec("-0.5"));
                assert_eq!(trade.price, dec("65000.0"));
            }
            other => panic!("expected trade event, got {other:?}"),
        }
        assert!(events_rx.try_recv().is_err(), "exactly one event expected");
    }

    #[tokio::test]
    async fn unmapped_channel_never_reaches_queue() {
        let (dispatcher, _registry, mut events_rx) = setup(8);
        dispatcher.dispatch(Frame::TradeUpdate {
            chan_id: 99,
            trade: raw_trade("0.5"),
        });
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn zero_amount_trade_is_dropped_as_malformed() {
        let (dispatcher, registry, mut events_rx) = setup(8);
        lock(&registry)
            .request_subscribe(SubscriptionKey::trades("BTCUSD"))
            .expect("request");
        lock(&registry).confirm_subscribe(17, &SubscriptionKey::trades("BTCUSD"));

        dispatcher.dispatch(Frame::TradeUpdate {
            chan_id: 17,
            trade: raw_trade("0"),
        });
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn candle_update_resolves_pair_and_total_price() {
        let (dispatcher, registry, mut events_rx) = setup(8);
        let key = SubscriptionKey::candles("ETHUSD", Timeframe::M1);
        lock(&registry).request_subscribe(key.clone()).expect("request");
        lock(&registry).confirm_subscribe(42, &key);

        dispatcher.dispatch(Frame::CandleUpdate {
            chan_id: 42,
            candle: RawCandle {
                open_time_ms: 1_690_000_000_000,
                open: dec("100.0"),
                close: dec("101.5"),
                high: dec("102.0"),
                low: dec("99.5"),
                volume: dec("4.0"),
            },
        });

        match events_rx.try_recv().expect("candle queued") {
            MarketEvent::Candle(candle) => {
                assert_eq!(candle.pair, "ETHUSD");
                assert_eq!(candle.total_price, dec("406.0"));
            }
            other => panic!("expected candle event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn heartbeat_and_info_produce_no_events() {
        let (dispatcher, _registry, mut events_rx) = setup(8);
        dispatcher.dispatch(Frame::Heartbeat { chan_id: 17 });
        dispatcher.dispatch(Frame::Info);
        dispatcher.dispatch(Frame::Unrecognized);
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn error_ack_with_context_fails_pending_request() {
        let (dispatcher, registry, _events_rx) = setup(8);
        let key = SubscriptionKey::trades("BADUSD");
        lock(&registry).request_subscribe(key.clone()).expect("request");

        dispatcher.dispatch(decode(
            r#"{"event":"error","msg":"symbol: invalid","code":10300,"channel":"trades","symbol":"tBADUSD"}"#,
        ));

        assert_eq!(lock(&registry).state_of(&key), None);
    }

    #[tokio::test]
    async fn unsubscribe_ack_stops_subsequent_dispatch() {
        let (dispatcher, registry, mut events_rx) = setup(8);
        let key = SubscriptionKey::trades("BTCUSD");
        lock(&registry).request_subscribe(key.clone()).expect("request");
        lock(&registry).confirm_subscribe(17, &key);
        lock(&registry).request_unsubscribe(&key).expect("unsubscribe");

        dispatcher.dispatch(Frame::UnsubscribeAck { chan_id: 17 });
        assert_eq!(lock(&registry).state_of(&key), None);

        dispatcher.dispatch(Frame::TradeUpdate {
            chan_id: 17,
            trade: raw_trade("0.5"),
        });
        assert!(events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn overflow_drops_newest_event() {
        let (dispatcher, registry, mut events_rx) = setup(1);
        let key = SubscriptionKey::trades("BTCUSD");
        lock(&registry).request_subscribe(key.clone()).expect("request");
        lock(&registry).confirm_subscribe(17, &key);

        dispatcher.dispatch(Frame::TradeUpdate {
            chan_id: 17,
            trade: raw_trade("0.5"),
        });
        dispatcher.dispatch(Frame::TradeUpdate {
            chan_id: 17,
            trade: raw_trade("-0.7"),
        });

        match events_rx.try_recv().expect("oldest event kept") {
            MarketEvent::Trade(trade) => assert_eq!(trade.amount, dec("0.5")),
            other => panic!("expected trade event, got {other:?}"),
        }
        assert!(events_rx.try_recv().is_err(), "newest event dropped on overflow");
    }
}
