// =============================================================================
// Depth feed — partial-book WebSocket stream per owned symbol
// =============================================================================

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};

use crate::engine::Engine;

/// Connect to the partial depth WebSocket stream for a single symbol and
/// route top-20 snapshots into the engine.
///
/// Uses the `@depth20@100ms` stream, which delivers the 20 best levels
/// per side every 100 ms. Runs until the stream disconnects or errors,
/// then returns so the caller can handle reconnection.
pub async fn run_depth_stream(symbol: &str, engine: &Arc<Engine>) -> Result<()> {
    let lower = symbol.to_lowercase();
    let url = format!("wss://stream.binance.com:9443/ws/{lower}@depth20@100ms");
    info!(url = %url, symbol = %symbol, "connecting to depth WebSocket");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to depth WebSocket")?;

    info!(symbol = %symbol, "depth WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_depth_message(&text) {
                        Ok((bids, asks)) => {
                            engine.on_order_book_deltas(symbol, &bids, &asks, Utc::now());
                        }
                        Err(e) => {
                            warn!(symbol = %symbol, error = %e, "failed to parse depth message");
                        }
                    }
                }
            }
            Some(Err(e)) => {
                error!(symbol = %symbol, error = %e, "depth WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!(symbol = %symbol, "depth WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

/// Parse a partial-depth message.
///
/// Expected shape:
/// ```json
/// {
///   "lastUpdateId": 12345,
///   "bids": [["37000.00", "1.5"], ...],
///   "asks": [["37001.00", "1.2"], ...]
/// }
/// ```
fn parse_depth_message(text: &str) -> Result<(Vec<(f64, f64)>, Vec<(f64, f64)>)> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse depth JSON")?;

    let bids = parse_levels(root["bids"].as_array().context("missing field bids")?);
    let asks = parse_levels(root["asks"].as_array().context("missing field asks")?);
    Ok((bids, asks))
}

fn parse_levels(raw: &[serde_json::Value]) -> Vec<(f64, f64)> {
    raw.iter()
        .filter_map(|level| {
            let price: f64 = level.get(0)?.as_str()?.parse().ok()?;
            let qty: f64 = level.get(1)?.as_str()?.parse().ok()?;
            Some((price, qty))
        })
        .collect()
}
