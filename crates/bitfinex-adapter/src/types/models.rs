/*
[INPUT]:  Exchange schema definitions and serde requirements
[OUTPUT]: Typed Rust structs with serialization support
[POS]:    Data layer - type definitions for market-data domain objects
[UPDATE]: When the exchange schema changes or new types are added
*/

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::Side;

/// A single executed trade, historical or streamed.
///
/// `side` is derived from the sign of `amount`; the exchange never sends it
/// explicitly. `amount` keeps its sign (negative for sells).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub time: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub side: Side,
    pub pair: String,
}

impl Trade {
    /// Build a trade from raw wire fields.
    ///
    /// Returns `None` for a zero amount (no derivable side) or an
    /// unrepresentable timestamp; such rows are malformed and dropped by
    /// callers.
    pub fn from_wire(
        pair: &str,
        id: String,
        time_ms: i64,
        amount: Decimal,
        price: Decimal,
    ) -> Option<Self> {
        let side = Side::from_amount(amount)?;
        let time = DateTime::from_timestamp_millis(time_ms)?;
        Some(Trade {
            id,
            time,
            amount,
            price,
            side,
            pair: pair.to_string(),
        })
    }
}

/// One OHLCV candle.
///
/// `total_price` is computed locally as `close_price * total_volume`; the
/// exchange does not transmit it and it is not a true traded-value aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub pair: String,
    pub open_time: DateTime<Utc>,
    #[serde(with = "rust_decimal::serde::str")]
    pub open_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub close_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub low_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_volume: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_price: Decimal,
}

impl Candle {
    /// Build a candle from raw wire fields, computing `total_price`.
    ///
    /// Returns `None` for an unrepresentable timestamp.
    pub fn from_wire(
        pair: &str,
        open_time_ms: i64,
        open: Decimal,
        close: Decimal,
        high: Decimal,
        low: Decimal,
        volume: Decimal,
    ) -> Option<Self> {
        let open_time = DateTime::from_timestamp_millis(open_time_ms)?;
        Some(Candle {
            pair: pair.to_string(),
            open_time,
            open_price: open,
            close_price: close,
            high_price: high,
            low_price: low,
            total_volume: volume,
            total_price: close * volume,
        })
    }
}

pub(crate) mod wire {
    use rust_decimal::Decimal;
    use serde_json::Value;
    use std::str::FromStr;

    /// Parse a JSON number or numeric string into a `Decimal`.
    ///
    /// Wire numbers are decimal text; going through the JSON token instead of
    /// an `f64` round-trip keeps prices exact. Scientific notation falls back
    /// to `from_scientific`.
    pub(crate) fn decimal(value: &Value) -> Option<Decimal> {
        if let Some(raw) = value.as_str() {
            return Decimal::from_str(raw.trim()).ok();
        }
        if value.is_number() {
            let raw = value.to_string();
            return Decimal::from_str(&raw)
                .or_else(|_| Decimal::from_scientific(&raw))
                .ok();
        }
        None
    }

    /// Normalize a JSON string or integer id into a `String`.
    pub(crate) fn id_string(value: &Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Extract a unix-millisecond timestamp.
    pub(crate) fn millis(value: &Value) -> Option<i64> {
        value.as_i64()
    }
}
