/*
[INPUT]:  Exchange schema definitions and serde requirements
[OUTPUT]: Typed Rust enums with serialization support
[POS]:    Data layer - type definitions for market-data domain objects
[UPDATE]: When the exchange schema changes or new types are added
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Derive the trade side from the signed amount the exchange streams.
    ///
    /// Bitfinex does not send a side field: positive amounts are buys,
    /// negative amounts are sells. A zero amount carries no side and is
    /// treated as malformed (`None`).
    pub fn from_amount(amount: Decimal) -> Option<Self> {
        if amount > Decimal::ZERO {
            Some(Side::Buy)
        } else if amount < Decimal::ZERO {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

/// Candle timeframes supported by the subscribe surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
}

impl Timeframe {
    /// Map a caller-supplied period in seconds to a supported timeframe.
    pub fn from_period_secs(period_secs: u32) -> Option<Self> {
        match period_secs {
            60 => Some(Timeframe::M1),
            300 => Some(Timeframe::M5),
            900 => Some(Timeframe::M15),
            3600 => Some(Timeframe::H1),
            _ => None,
        }
    }

    pub fn period_secs(self) -> u32 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::H1 => 3600,
        }
    }

    /// Exchange token for this timeframe, as used in candle keys.
    pub fn token(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "1m" => Some(Timeframe::M1),
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "1h" => Some(Timeframe::H1),
            _ => None,
        }
    }
}

/// Logical stream kind on the public WebSocket feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Trades,
    Candles,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Trades => "trades",
            ChannelKind::Candles => "candles",
        }
    }

    pub fn from_channel(channel: &str) -> Option<Self> {
        match channel {
            "trades" => Some(ChannelKind::Trades),
            "candles" => Some(ChannelKind::Candles),
            _ => None,
        }
    }
}
