/*
[INPUT]:  Pair identifiers and query parameters
[OUTPUT]: Historical market data (trades, candles)
[POS]:    HTTP layer - public market data endpoints (no auth required)
[UPDATE]: When adding new public endpoints or changing response format
*/

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::error::{BitfinexError, Result};
use crate::http::BitfinexClient;
use crate::types::{Candle, Timeframe, Trade, wire};

impl BitfinexClient {
    /// Fetch the most recent trades for a pair.
    ///
    /// GET /v2/trades/t{PAIR}/hist?limit={limit}
    ///
    /// Rows arrive as raw arrays `[id, timeMs, amount, price]`; the side is
    /// derived from the sign of `amount` exactly as on the stream.
    pub async fn get_trades(&self, pair: &str, limit: u32) -> Result<Vec<Trade>> {
        let endpoint = format!("trades/t{pair}/hist?limit={limit}");
        let builder = self.public_request(Method::GET, &endpoint)?;
        let body: Value = self.send_json(builder).await?;
        let rows = response_rows(&body)?;

        Ok(rows
            .iter()
            .filter_map(|row| trade_from_row(pair, row))
            .collect())
    }

    /// Fetch historical candles for a pair and period.
    ///
    /// GET /v2/candles/trade:{tf}:t{PAIR}/hist?limit={n}[&start=ms][&end=ms]
    ///
    /// Rows arrive as raw arrays `[timeMs, open, close, high, low, volume]`.
    /// Supported periods are 60, 300, 900 and 3600 seconds. Defaults to the
    /// 100 most recent candles when `limit` is not given.
    pub async fn get_candles(
        &self,
        pair: &str,
        period_secs: u32,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        limit: Option<u32>,
    ) -> Result<Vec<Candle>> {
        let timeframe = Timeframe::from_period_secs(period_secs)
            .ok_or(BitfinexError::UnsupportedTimeframe { period_secs })?;

        let mut endpoint = format!(
            "candles/trade:{}:t{}/hist?limit={}",
            timeframe.token(),
            pair,
            limit.unwrap_or(100)
        );
        if let Some(from) = from {
            endpoint.push_str(&format!("&start={}", from.timestamp_millis()));
        }
        if let Some(to) = to {
            endpoint.push_str(&format!("&end={}", to.timestamp_millis()));
        }

        let builder = self.public_request(Method::GET, &endpoint)?;
        let body: Value = self.send_json(builder).await?;
        let rows = response_rows(&body)?;

        Ok(rows
            .iter()
            .filter_map(|row| candle_from_row(pair, row))
            .collect())
    }
}

/// Interpret a response body as a list of rows.
///
/// The exchange reports failures inside a 200 body as
/// `["error", code, "message"]`; that shape becomes an error instead of
/// being silently skipped as a malformed row.
fn response_rows(body: &Value) -> Result<&[Value]> {
    let Some(items) = body.as_array() else {
        return Err(BitfinexError::InvalidResponse(
            "expected a JSON array of rows".to_string(),
        ));
    };
    if let Some(first) = items.first()
        && first.as_str() == Some("error")
    {
        let code = items.get(1).and_then(Value::as_i64).unwrap_or_default();
        let message = items
            .get(2)
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(BitfinexError::InvalidResponse(format!(
            "exchange error {code}: {message}"
        )));
    }
    Ok(items)
}

fn trade_from_row(pair: &str, row: &Value) -> Option<Trade> {
    let fields = row.as_array()?;
    let trade = (|| {
        Trade::from_wire(
            pair,
            wire::id_string(fields.first()?)?,
            wire::millis(fields.get(1)?)?,
            wire::decimal(fields.get(2)?)?,
            wire::decimal(fields.get(3)?)?,
        )
    })();
    if trade.is_none() {
        debug!(pair, "skipping malformed trade row");
    }
    trade
}

fn candle_from_row(pair: &str, row: &Value) -> Option<Candle> {
    let fields = row.as_array()?;
    let candle = (|| {
        Candle::from_wire(
            pair,
            wire::millis(fields.first()?)?,
            wire::decimal(fields.get(1)?)?,
            wire::decimal(fields.get(2)?)?,
            wire::decimal(fields.get(3)?)?,
            wire::decimal(fields.get(4)?)?,
            wire::decimal(fields.get(5)?)?,
        )
    })();
    if candle.is_none() {
        debug!(pair, "skipping malformed candle row");
    }
    candle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ClientConfig;
    use crate::types::Side;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).expect("decimal literal")
    }

    async fn client_for(server: &MockServer) -> BitfinexClient {
        BitfinexClient::with_config_and_base_url(ClientConfig::default(), &server.uri())
            .expect("client init")
    }

    #[tokio::test]
    async fn test_get_trades() {
        let server = MockServer::start().await;
        let mock_response = r#"[
            [123, 1690000000000, 0.5, 65000],
            [124, 1690000000500, -0.3, 64990.5]
        ]"#;

        let _mock = Mock::given(method("GET"))
            .and(path("/trades/tBTCUSD/hist"))
            .and(query_param("limit", "10"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_raw(mock_response, "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let trades = client.get_trades("BTCUSD", 10).await.expect("get_trades");

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].id, "123");
        assert_eq!(trades[0].side, Side::Buy);
        assert_eq!(trades[0].pair, "BTCUSD");
        assert_eq!(trades[1].side, Side::Sell);
        assert_eq!(trades[1].price, dec("64990.5"));
    }

    #[tokio::test]
    async fn test_get_trades_skips_zero_amount_rows() {
        let server = MockServer::start().await;
        let mock_response = r#"[
            [123, 1690000000000, 0, 65000],
            [124, 1690000000500, 1.0, 64990]
        ]"#;

        let _mock = Mock::given(method("GET"))
            .and(path("/trades/tBTCUSD/hist"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_raw(mock_response, "application/json"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let trades = client.get_trades("BTCUSD", 10).await.expect("get_trades");

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].id, "124");
    }

    #[tokio::test]
    async fn test_get_candles_with_range() {
        let server = MockServer::start().await;
        let mock_response = r#"[
            [1690000000000, 100.0, 101.5, 102.0, 99.5, 4.0],
            [1690000060000, 101.5, 101.0, 101.8, 100.9, 2.5]
        ]"#;

        let _mock = Mock::given(method("GET"))
            .and(path("/candles/trade:1m:tBTCUSD/hist"))
            .and(query_param("limit", "2"))
            .and(query_param("start", "1690000000000"))
            .and(query_param("end", "1690000120000"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_raw(mock_response, "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let from = DateTime::from_timestamp_millis(1_690_000_000_000);
        let to = DateTime::from_timestamp_millis(1_690_000_120_000);
        let candles = client
            .get_candles("BTCUSD", 60, from, to, Some(2))
            .await
            .expect("get_candles");

        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].pair, "BTCUSD");
        assert_eq!(candles[0].open_price, dec("100.0"));
        assert_eq!(candles[0].total_price, dec("101.5") * dec("4.0"));
    }

    #[tokio::test]
    async fn test_get_candles_unsupported_period() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        let err = client
            .get_candles("BTCUSD", 120, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BitfinexError::UnsupportedTimeframe { period_secs: 120 }));
    }

    #[tokio::test]
    async fn test_in_body_error_array_is_surfaced() {
        let server = MockServer::start().await;
        let _mock = Mock::given(method("GET"))
            .and(path("/trades/tBADUSD/hist"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_raw(r#"["error",10020,"symbol: invalid"]"#, "application/json"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.get_trades("BADUSD", 10).await.unwrap_err();
        match err {
            BitfinexError::InvalidResponse(message) => {
                assert!(message.contains("10020"));
                assert!(message.contains("symbol: invalid"));
            }
            other => panic!("expected invalid response, got {other:?}"),
        }
    }
}
