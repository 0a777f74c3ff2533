/*
[INPUT]:  Pair and query parameters
[OUTPUT]: Historical trades and candles printed to stdout
[POS]:    Examples - REST market data
[UPDATE]: When the REST API changes
*/

use bitfinex_adapter::BitfinexClient;

/// Example: fetch historical market data over REST
///
/// Both endpoints are public; no credentials required.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Bitfinex REST Example ===\n");

    let client = BitfinexClient::new()?;
    println!("✓ REST client created");

    let trades = client.get_trades("BTCUSD", 5).await?;
    println!("\nLast {} trades for BTCUSD:", trades.len());
    for trade in &trades {
        println!(
            "  {} {:?} {} @ {} ({})",
            trade.time, trade.side, trade.amount, trade.price, trade.id
        );
    }

    let candles = client.get_candles("BTCUSD", 60, None, None, Some(5)).await?;
    println!("\nLast {} one-minute candles for BTCUSD:", candles.len());
    for candle in &candles {
        println!(
            "  {} o={} c={} h={} l={} v={} (total {})",
            candle.open_time,
            candle.open_price,
            candle.close_price,
            candle.high_price,
            candle.low_price,
            candle.total_volume,
            candle.total_price
        );
    }

    println!("\n✓ REST example complete");
    Ok(())
}
