// =============================================================================
// Report publishing — bounded-retry writes that preserve key TTLs
// =============================================================================

use std::time::Duration;

use tracing::{debug, error, warn};

use crate::kv::{report_key, KvStore};
use crate::report::schema::MarketReport;

/// Maximum publish attempts per report.
const MAX_RETRIES: u32 = 3;
/// First retry delay; doubles on each subsequent attempt.
const RETRY_DELAY_MS: u64 = 100;

/// Publish the report under `report:{symbol}`, preserving any TTL already
/// set on the key so consumer-side expiry policies survive overwrites.
///
/// Transient store errors are retried with exponential backoff up to
/// three attempts; a serialization failure is final. Returns whether the
/// write landed.
pub async fn publish_report(kv: &KvStore, symbol: &str, report: &MarketReport) -> bool {
    let key = report_key(symbol);

    let payload = match serde_json::to_string(report) {
        Ok(json) => json,
        Err(e) => {
            error!(symbol = %symbol, error = %e, "report_serialization_error");
            return false;
        }
    };

    for attempt in 0..MAX_RETRIES {
        match kv.set_keepttl(&key, &payload).await {
            Ok(()) => {
                debug!(
                    symbol = %symbol,
                    size_bytes = payload.len(),
                    attempt = attempt + 1,
                    "report_published"
                );
                return true;
            }
            Err(e) => {
                warn!(
                    symbol = %symbol,
                    attempt = attempt + 1,
                    max_retries = MAX_RETRIES,
                    error = %e,
                    "report_publish_error"
                );
                if attempt + 1 < MAX_RETRIES {
                    let delay = RETRY_DELAY_MS * 2u64.pow(attempt);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                } else {
                    error!(symbol = %symbol, max_retries = MAX_RETRIES, "report_publish_max_retries_exceeded");
                }
            }
        }
    }
    false
}

/// Read back the current report for a symbol, or None when absent or
/// unparsable.
pub async fn fetch_report(kv: &KvStore, symbol: &str) -> Option<MarketReport> {
    let key = report_key(symbol);
    match kv.get(&key).await {
        Ok(Some(json)) => match serde_json::from_str(&json) {
            Ok(report) => Some(report),
            Err(e) => {
                error!(symbol = %symbol, error = %e, "report_parse_error");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            error!(symbol = %symbol, error = %e, "report_fetch_error");
            None
        }
    }
}
