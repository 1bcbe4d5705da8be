// =============================================================================
// Anomaly detection — spoofing, iceberg, and flash-crash risk signals
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state::orderbook::OrderBookSource;
use crate::types::{AggressorSide, BookSide, Severity, TradeTick};

/// Levels inspected per side for spoofing.
const SPOOF_TOP_LEVELS: usize = 10;
/// Minimum distance from mid before a large order looks suspicious.
const SPOOF_DISTANCE_BPS: f64 = 50.0;
/// Iceberg: minimum fills sharing a price bucket.
const ICEBERG_MIN_FILLS: usize = 5;
/// Iceberg price bucket tolerance, percent of price.
const ICEBERG_TOLERANCE_PCT: f64 = 0.10;

/// A detected microstructure anomaly, tagged by kind in the report JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Anomaly {
    Spoofing {
        side: BookSide,
        price: f64,
        quantity: f64,
        distance_bps: i64,
        severity: Severity,
        note: String,
    },
    Iceberg {
        side: BookSide,
        price: f64,
        fill_count: usize,
        total_volume: f64,
        severity: Severity,
        note: String,
    },
    FlashCrashRisk {
        triggered_signals: Vec<String>,
        severity: Severity,
        note: String,
        details: FlashCrashDetails,
    },
}

impl Anomaly {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Spoofing { severity, .. }
            | Self::Iceberg { severity, .. }
            | Self::FlashCrashRisk { severity, .. } => *severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlashCrashDetails {
    pub spread_bps: f64,
    pub depth_imbalance: f64,
    pub flow_acceleration: f64,
}

/// Flag large far-from-mid resting orders on the top 10 levels of each
/// side: distance > 50 bps from mid and size > 2x the side's mean level
/// size. Severity: high if also > 5x mean and > 100 bps out, medium if
/// > 3x mean, else low.
pub fn detect_spoofing(book: &dyn OrderBookSource, mid_price: f64) -> Vec<Anomaly> {
    if mid_price <= 0.0 {
        return Vec::new();
    }

    let mut anomalies = Vec::new();
    for (side, levels, label) in [
        (BookSide::Bid, book.top_bids(crate::state::symbol_state::BOOK_DEPTH), "bid"),
        (BookSide::Ask, book.top_asks(crate::state::symbol_state::BOOK_DEPTH), "ask"),
    ] {
        if levels.is_empty() {
            continue;
        }
        let avg_qty: f64 = levels.iter().map(|l| l.qty).sum::<f64>() / levels.len() as f64;

        for level in levels.iter().take(SPOOF_TOP_LEVELS) {
            let distance_bps = ((level.price - mid_price) / mid_price * 10_000.0).abs();
            if distance_bps <= SPOOF_DISTANCE_BPS || level.qty <= avg_qty * 2.0 {
                continue;
            }

            let severity = if level.qty > avg_qty * 5.0 && distance_bps > 100.0 {
                Severity::High
            } else if level.qty > avg_qty * 3.0 {
                Severity::Medium
            } else {
                Severity::Low
            };

            anomalies.push(Anomaly::Spoofing {
                side,
                price: level.price,
                quantity: level.qty,
                distance_bps: distance_bps as i64,
                severity,
                note: format!(
                    "Large {label} {:.2} at {:.0}bps from mid, potential spoofing",
                    level.qty, distance_bps
                ),
            });
        }
    }
    anomalies
}

/// Group trades into 0.10%-wide price buckets (grid anchored at the
/// window's first trade) and flag buckets with >= 5 fills. The iceberg
/// sits on the side being consumed: buy-dominated fills point at a
/// hidden ask, sell-dominated at a hidden bid. Severity: high at >= 20
/// fills, medium at >= 10, else low.
pub fn detect_iceberg(trades: &[TradeTick]) -> Vec<Anomaly> {
    if trades.len() < ICEBERG_MIN_FILLS {
        return Vec::new();
    }

    struct Bucket {
        fills: usize,
        total_volume: f64,
        buy_count: usize,
        sell_count: usize,
    }

    let step = trades[0].price * ICEBERG_TOLERANCE_PCT / 100.0;
    if step <= 0.0 {
        return Vec::new();
    }

    let mut buckets: BTreeMap<i64, Bucket> = BTreeMap::new();
    for trade in trades {
        let key = (trade.price / step).round() as i64;
        let bucket = buckets.entry(key).or_insert(Bucket {
            fills: 0,
            total_volume: 0.0,
            buy_count: 0,
            sell_count: 0,
        });
        bucket.fills += 1;
        bucket.total_volume += trade.volume;
        match trade.aggressor {
            AggressorSide::Buy => bucket.buy_count += 1,
            AggressorSide::Sell => bucket.sell_count += 1,
        }
    }

    let mut anomalies = Vec::new();
    for (key, bucket) in buckets {
        if bucket.fills < ICEBERG_MIN_FILLS {
            continue;
        }
        let side = if bucket.buy_count > bucket.sell_count {
            BookSide::Ask
        } else {
            BookSide::Bid
        };
        let severity = if bucket.fills >= 20 {
            Severity::High
        } else if bucket.fills >= 10 {
            Severity::Medium
        } else {
            Severity::Low
        };
        let price = key as f64 * step;
        anomalies.push(Anomaly::Iceberg {
            side,
            price,
            fill_count: bucket.fills,
            total_volume: bucket.total_volume,
            severity,
            note: format!(
                "{} fills at ~{:.2} with stable depth, potential iceberg",
                bucket.fills, price
            ),
        });
    }
    anomalies
}

/// Flash-crash risk fires when at least two of three signals trigger:
/// spread > 20 bps, |imbalance| > 0.3, flow acceleration < -100.
/// Severity: high with all three, medium with two.
pub fn detect_flash_crash_risk(
    spread_bps: f64,
    depth_imbalance: f64,
    flow_acceleration: f64,
) -> Option<Anomaly> {
    let mut triggered = Vec::new();
    if spread_bps > 20.0 {
        triggered.push("spread_widening".to_string());
    }
    if depth_imbalance.abs() > 0.3 {
        triggered.push("thin_book".to_string());
    }
    if flow_acceleration < -100.0 {
        triggered.push("negative_flow".to_string());
    }

    if triggered.len() < 2 {
        return None;
    }

    let severity = if triggered.len() == 3 {
        Severity::High
    } else {
        Severity::Medium
    };

    Some(Anomaly::FlashCrashRisk {
        note: format!("{} of 3 flash crash signals active", triggered.len()),
        triggered_signals: triggered,
        severity,
        details: FlashCrashDetails {
            spread_bps,
            depth_imbalance,
            flow_acceleration,
        },
    })
}
