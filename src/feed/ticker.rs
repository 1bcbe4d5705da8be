// =============================================================================
// Ticker poller — 24 h rolling statistics via the venue REST API
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::types::TickerStats;

const BASE_URL: &str = "https://api.binance.com";
/// Ticker statistics move slowly; refresh well below rate limits.
const POLL_INTERVAL: Duration = Duration::from_secs(30);

pub struct TickerClient {
    http: reqwest::Client,
}

impl TickerClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Fetch 24 h rolling stats for one symbol.
    pub async fn fetch_24h(&self, symbol: &str) -> Result<TickerStats> {
        let url = format!("{BASE_URL}/api/v3/ticker/24hr?symbol={symbol}");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("ticker request failed")?
            .error_for_status()
            .context("ticker request rejected")?;

        let body: serde_json::Value = response.json().await.context("ticker parse failed")?;

        let field = |name: &str| -> f64 {
            body.get(name)
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0)
        };

        Ok(TickerStats {
            last_price: field("lastPrice"),
            change_24h_pct: field("priceChangePercent"),
            high_24h: field("highPrice"),
            low_24h: field("lowPrice"),
            volume_24h: field("volume"),
        })
    }
}

impl Default for TickerClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Background loop refreshing ticker stats for every owned symbol.
/// Failures are logged and retried on the next tick.
pub async fn run_ticker_loop(engine: Arc<Engine>) {
    let client = TickerClient::new();
    let mut interval = tokio::time::interval(POLL_INTERVAL);

    loop {
        interval.tick().await;

        for symbol in engine.owned_symbol_list() {
            match client.fetch_24h(&symbol).await {
                Ok(stats) => {
                    debug!(symbol = %symbol, last_price = stats.last_price, "ticker_updated");
                    engine.update_ticker(&symbol, stats);
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "ticker_fetch_failed");
                }
            }
        }
    }
}
