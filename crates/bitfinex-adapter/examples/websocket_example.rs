/*
[INPUT]:  WebSocket URL and pair subscriptions
[OUTPUT]: Real-time trade and candle updates printed to stdout
[POS]:    Examples - WebSocket stream handling
[UPDATE]: When the WebSocket API changes
*/

use bitfinex_adapter::BitfinexWebSocket;
use tokio::time::{Duration, sleep};

/// Example: stream live trades and candles
///
/// Subscriptions are acked asynchronously; the returned handle resolves
/// once the exchange binds a channel id.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Bitfinex WebSocket Example ===\n");

    let ws = BitfinexWebSocket::new();
    ws.on_buy_trade(|trade| println!("  buy  {} {} @ {}", trade.pair, trade.amount, trade.price));
    ws.on_sell_trade(|trade| println!("  sell {} {} @ {}", trade.pair, trade.amount, trade.price));
    ws.on_candle(|candle| {
        println!(
            "  candle {} {} c={} v={}",
            candle.pair, candle.open_time, candle.close_price, candle.total_volume
        )
    });
    println!("✓ Listeners registered");

    ws.connect().await?;
    println!("✓ Connected");

    let mut trades = ws.subscribe_trades("BTCUSD").await?;
    trades.wait_active().await?;
    println!("✓ Trades subscription active");

    let mut candles = ws.subscribe_candles("BTCUSD", 60, None, None, None).await?;
    candles.wait_active().await?;
    println!("✓ Candles subscription active\n");

    println!("Streaming for 30 seconds...");
    sleep(Duration::from_secs(30)).await;

    ws.unsubscribe_trades("BTCUSD").await?;
    ws.unsubscribe_candles("BTCUSD", 60).await?;
    ws.disconnect().await;
    println!("\n✓ WebSocket example complete");
    Ok(())
}
