/*
[INPUT]:  WebSocket client public surface
[OUTPUT]: Test results for the streaming client
[POS]:    Integration tests - WebSocket
[UPDATE]: When the WebSocket client surface changes
*/

use bitfinex_adapter::{
    BitfinexError, BitfinexWebSocket, ConnectionState, Side, Timeframe, WsConfig,
};
use rstest::rstest;
use rust_decimal::Decimal;
use std::str::FromStr;

#[test]
fn test_websocket_creation() {
    let ws = BitfinexWebSocket::new();
    assert_eq!(*ws.state().borrow(), ConnectionState::Disconnected);
}

#[test]
fn test_websocket_default() {
    let ws: BitfinexWebSocket = Default::default();
    assert_eq!(*ws.state().borrow(), ConnectionState::Disconnected);
}

#[test]
fn test_default_config_targets_public_endpoint() {
    let config = WsConfig::default();
    assert!(config.url.contains("api-pub.bitfinex.com"));
    assert!(config.event_buffer > 0);
}

#[tokio::test]
async fn test_subscribe_before_connect_is_not_connected() {
    let ws = BitfinexWebSocket::new();

    let err = ws.subscribe_trades("BTCUSD").await.unwrap_err();
    assert!(matches!(err, BitfinexError::NotConnected));

    // The failed request left no entry behind: this is still NotConnected,
    // not a duplicate-subscription error.
    let err = ws.subscribe_trades("BTCUSD").await.unwrap_err();
    assert!(matches!(err, BitfinexError::NotConnected));
}

#[tokio::test]
async fn test_unsubscribe_without_subscription_fails() {
    let ws = BitfinexWebSocket::new();

    let err = ws.unsubscribe_trades("BTCUSD").await.unwrap_err();
    assert!(matches!(err, BitfinexError::NotSubscribed { .. }));

    let err = ws.unsubscribe_candles("BTCUSD", 60).await.unwrap_err();
    assert!(matches!(err, BitfinexError::NotSubscribed { .. }));
}

#[tokio::test]
async fn test_unsupported_period_is_rejected_locally() {
    let ws = BitfinexWebSocket::new();

    let err = ws
        .subscribe_candles("BTCUSD", 42, None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, BitfinexError::UnsupportedTimeframe { period_secs: 42 }));

    let err = ws.unsubscribe_candles("BTCUSD", 42).await.unwrap_err();
    assert!(matches!(err, BitfinexError::UnsupportedTimeframe { period_secs: 42 }));
}

#[test]
fn test_listener_registration_round_trip() {
    let ws = BitfinexWebSocket::new();

    let buy_id = ws.on_buy_trade(|_| {});
    let sell_id = ws.on_sell_trade(|_| {});
    let candle_id = ws.on_candle(|_| {});

    assert!(ws.remove_listener(buy_id));
    assert!(ws.remove_listener(sell_id));
    assert!(ws.remove_listener(candle_id));
    assert!(!ws.remove_listener(buy_id), "ids are single-use");
}

#[rstest]
#[case(60, Timeframe::M1, "1m")]
#[case(300, Timeframe::M5, "5m")]
#[case(900, Timeframe::M15, "15m")]
#[case(3600, Timeframe::H1, "1h")]
fn test_supported_periods(
    #[case] period_secs: u32,
    #[case] expected: Timeframe,
    #[case] token: &str,
) {
    let timeframe = Timeframe::from_period_secs(period_secs).expect("supported period");
    assert_eq!(timeframe, expected);
    assert_eq!(timeframe.token(), token);
    assert_eq!(timeframe.period_secs(), period_secs);
}

#[rstest]
#[case("0.5", Some(Side::Buy))]
#[case("-0.5", Some(Side::Sell))]
#[case("0", None)]
fn test_side_is_derived_from_amount_sign(#[case] amount: &str, #[case] expected: Option<Side>) {
    let amount = Decimal::from_str(amount).expect("decimal literal");
    assert_eq!(Side::from_amount(amount), expected);
}
