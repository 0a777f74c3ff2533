/*
[INPUT]:  Test configuration and mock server requirements
[OUTPUT]: Shared test utilities and fixtures
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for bitfinex-adapter tests

use wiremock::MockServer;

/// Setup a mock HTTP server for testing
pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// Two raw trade rows as the exchange returns them: one buy, one sell
#[allow(dead_code)]
pub fn sample_trade_rows() -> &'static str {
    r#"[
        [9001, 1690000000000, 0.25, 65000],
        [9002, 1690000001000, -0.75, 64995.5]
    ]"#
}

/// Two raw candle rows: [timeMs, open, close, high, low, volume]
#[allow(dead_code)]
pub fn sample_candle_rows() -> &'static str {
    r#"[
        [1690000000000, 100.0, 101.5, 102.0, 99.5, 4.0],
        [1690000060000, 101.5, 101.0, 101.8, 100.9, 2.5]
    ]"#
}
