// =============================================================================
// Trade feed — aggregated-trade WebSocket stream per owned symbol
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};

use crate::engine::Engine;
use crate::types::{AggressorSide, TradeTick};

/// Connect to the aggTrade WebSocket stream for a single symbol and feed
/// trades into the engine. Returns when the stream drops so the caller
/// can reconnect.
pub async fn run_trade_stream(symbol: &str, engine: &Arc<Engine>) -> Result<()> {
    let lower = symbol.to_lowercase();
    let url = format!("wss://stream.binance.com:9443/ws/{lower}@aggTrade");
    info!(url = %url, symbol = %symbol, "connecting to trade WebSocket");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to trade WebSocket")?;

    info!(symbol = %symbol, "trade WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_agg_trade(&text) {
                        Ok(tick) => engine.on_trade_tick(symbol, tick),
                        Err(e) => {
                            warn!(symbol = %symbol, error = %e, "failed to parse aggTrade message");
                        }
                    }
                }
            }
            Some(Err(e)) => {
                error!(symbol = %symbol, error = %e, "trade WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, "trade WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

/// Parse an aggTrade message into a trade tick.
///
/// Expected shape:
/// ```json
/// { "e": "aggTrade", "s": "BTCUSDT", "p": "37000.00", "q": "0.123",
///   "T": 1700000000000, "m": true }
/// ```
///
/// The tick is stamped with the exchange's trade time `T` (event time),
/// not arrival time. `m` = buyer-is-maker, so `m: true` means the taker
/// sold into the bid.
fn parse_agg_trade(text: &str) -> Result<TradeTick> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse aggTrade JSON")?;

    let price: f64 = root["p"]
        .as_str()
        .context("missing field p")?
        .parse()
        .context("failed to parse price")?;

    let quantity: f64 = root["q"]
        .as_str()
        .context("missing field q")?
        .parse()
        .context("failed to parse quantity")?;

    let trade_time_ms = root["T"].as_i64().context("missing field T")?;
    let ts: DateTime<Utc> =
        DateTime::from_timestamp_millis(trade_time_ms).context("invalid trade time")?;

    let is_buyer_maker = root["m"].as_bool().context("missing field m")?;
    let aggressor = if is_buyer_maker {
        AggressorSide::Sell
    } else {
        AggressorSide::Buy
    };

    TradeTick::new(ts, price, quantity, aggressor)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_taker_buy() {
        let text = r#"{"e":"aggTrade","s":"BTCUSDT","p":"37000.00","q":"0.123","T":1700000000000,"m":false}"#;
        let tick = parse_agg_trade(text).unwrap();
        assert_eq!(tick.price, 37_000.0);
        assert_eq!(tick.volume, 0.123);
        assert_eq!(tick.aggressor, AggressorSide::Buy);
        assert_eq!(tick.ts.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn buyer_maker_means_sell_aggressor() {
        let text = r#"{"e":"aggTrade","s":"BTCUSDT","p":"37000.00","q":"1.0","T":1700000000000,"m":true}"#;
        let tick = parse_agg_trade(text).unwrap();
        assert_eq!(tick.aggressor, AggressorSide::Sell);
    }

    #[test]
    fn rejects_malformed_messages() {
        assert!(parse_agg_trade("{}").is_err());
        assert!(parse_agg_trade(r#"{"p":"x","q":"1","T":1,"m":true}"#).is_err());
        assert!(parse_agg_trade("not json").is_err());
    }
}
