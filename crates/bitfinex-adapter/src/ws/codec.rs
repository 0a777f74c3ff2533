/*
[INPUT]:  Raw WebSocket frame text
[OUTPUT]: Tagged Frame variants / encoded subscribe requests
[POS]:    WebSocket layer - stateless wire codec
[UPDATE]: When frame shapes or the subscribe grammar change
*/

use rust_decimal::Decimal;
use serde_json::{Value, json};

use crate::types::{ChannelKind, Timeframe, wire};
use crate::ws::subscription::SubscriptionKey;

/// Trade payload fields as they arrive on the wire, before channel-id
/// resolution attaches a pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTrade {
    pub id: String,
    pub time_ms: i64,
    pub amount: Decimal,
    pub price: Decimal,
}

/// Candle payload fields as they arrive on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCandle {
    pub open_time_ms: i64,
    pub open: Decimal,
    pub close: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: Decimal,
}

/// One decoded inbound frame.
///
/// Decoding is purely structural: the codec never consults the subscription
/// registry, and malformed input becomes [`Frame::Unrecognized`] instead of
/// an error so a noisy feed cannot fail the receive loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    SubscribeAck { chan_id: u32, key: SubscriptionKey },
    UnsubscribeAck { chan_id: u32 },
    ErrorAck {
        code: Option<i64>,
        message: String,
        key: Option<SubscriptionKey>,
    },
    Info,
    Heartbeat { chan_id: u32 },
    TradeUpdate { chan_id: u32, trade: RawTrade },
    CandleUpdate { chan_id: u32, candle: RawCandle },
    Unrecognized,
}

/// Encode a subscribe request for the key.
///
/// Trades subscribe by prefixed symbol (`tBTCUSD`); candles subscribe by
/// key (`trade:1m:tBTCUSD`).
pub fn encode_subscribe(key: &SubscriptionKey) -> String {
    match key.kind {
        ChannelKind::Trades => json!({
            "event": "subscribe",
            "channel": "trades",
            "symbol": format!("t{}", key.pair),
        })
        .to_string(),
        ChannelKind::Candles => json!({
            "event": "subscribe",
            "channel": "candles",
            "key": candle_key(key),
        })
        .to_string(),
    }
}

/// Encode an unsubscribe request for a bound channel id.
pub fn encode_unsubscribe(chan_id: u32) -> String {
    json!({
        "event": "unsubscribe",
        "chanId": chan_id,
    })
    .to_string()
}

/// Decode one inbound frame.
pub fn decode(raw: &str) -> Frame {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return Frame::Unrecognized;
    };
    match &value {
        Value::Object(event) => decode_event(event),
        Value::Array(items) => decode_data(items),
        _ => Frame::Unrecognized,
    }
}

fn candle_key(key: &SubscriptionKey) -> String {
    let token = key.timeframe.map(Timeframe::token).unwrap_or("1m");
    format!("trade:{}:t{}", token, key.pair)
}

fn decode_event(event: &serde_json::Map<String, Value>) -> Frame {
    match event.get("event").and_then(Value::as_str) {
        Some("subscribed") => {
            let chan_id = event.get("chanId").and_then(channel_id);
            let key = key_from_event(event);
            match (chan_id, key) {
                (Some(chan_id), Some(key)) => Frame::SubscribeAck { chan_id, key },
                _ => Frame::Unrecognized,
            }
        }
        Some("unsubscribed") => match event.get("chanId").and_then(channel_id) {
            Some(chan_id) => Frame::UnsubscribeAck { chan_id },
            None => Frame::Unrecognized,
        },
        Some("error") => Frame::ErrorAck {
            code: event.get("code").and_then(Value::as_i64),
            message: event
                .get("msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
            key: key_from_event(event),
        },
        Some("info") => Frame::Info,
        _ => Frame::Unrecognized,
    }
}

/// Rebuild the logical subscription key from the structural fields an ack
/// (or subscribe error) echoes: `channel` plus `symbol` for trades, `key`
/// for candles.
fn key_from_event(event: &serde_json::Map<String, Value>) -> Option<SubscriptionKey> {
    let channel = event.get("channel").and_then(Value::as_str)?;
    match ChannelKind::from_channel(channel)? {
        ChannelKind::Trades => {
            let symbol = event.get("symbol").and_then(Value::as_str)?;
            let pair = symbol.strip_prefix('t')?;
            Some(SubscriptionKey::trades(pair))
        }
        ChannelKind::Candles => {
            let key = event.get("key").and_then(Value::as_str)?;
            parse_candle_key(key)
        }
    }
}

/// Parse a candle key of the exact form `trade:{timeframe}:t{PAIR}`.
fn parse_candle_key(raw: &str) -> Option<SubscriptionKey> {
    let mut parts = raw.splitn(3, ':');
    if parts.next() != Some("trade") {
        return None;
    }
    let timeframe = Timeframe::from_token(parts.next()?)?;
    let pair = parts.next()?.strip_prefix('t')?;
    Some(SubscriptionKey::candles(pair, timeframe))
}

fn decode_data(items: &[Value]) -> Frame {
    let [head, payload, ..] = items else {
        return Frame::Unrecognized;
    };
    let Some(chan_id) = channel_id(head) else {
        return Frame::Unrecognized;
    };
    match payload {
        Value::String(tag) if tag == "hb" => Frame::Heartbeat { chan_id },
        Value::Array(fields) => decode_payload(chan_id, fields),
        _ => Frame::Unrecognized,
    }
}

fn decode_payload(chan_id: u32, fields: &[Value]) -> Frame {
    match fields.first() {
        // Tagged trade event: ["te", id, timeMs, signedAmount, price].
        // Other tags ("tu" confirmations, snapshots) fall through to
        // Unrecognized; dispatching them as well would duplicate events.
        Some(Value::String(tag)) if tag == "te" => {
            let trade = (|| {
                Some(RawTrade {
                    id: wire::id_string(fields.get(1)?)?,
                    time_ms: wire::millis(fields.get(2)?)?,
                    amount: wire::decimal(fields.get(3)?)?,
                    price: wire::decimal(fields.get(4)?)?,
                })
            })();
            match trade {
                Some(trade) => Frame::TradeUpdate { chan_id, trade },
                None => Frame::Unrecognized,
            }
        }
        // Raw numeric candle array: [openTimeMs, open, close, high, low, volume].
        Some(first) if first.is_number() => {
            let candle = (|| {
                Some(RawCandle {
                    open_time_ms: wire::millis(fields.first()?)?,
                    open: wire::decimal(fields.get(1)?)?,
                    close: wire::decimal(fields.get(2)?)?,
                    high: wire::decimal(fields.get(3)?)?,
                    low: wire::decimal(fields.get(4)?)?,
                    volume: wire::decimal(fields.get(5)?)?,
                })
            })();
            match candle {
                Some(candle) => Frame::CandleUpdate { chan_id, candle },
                None => Frame::Unrecognized,
            }
        }
        _ => Frame::Unrecognized,
    }
}

fn channel_id(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|id| u32::try_from(id).ok())
}
