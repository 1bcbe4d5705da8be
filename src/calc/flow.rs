// =============================================================================
// Order flow — trade rate, net flow by aggressor side, flow acceleration
// =============================================================================

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::calc::round_to;
use crate::types::{AggressorSide, TradeTick};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetFlow {
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub net_flow: f64,
}

/// Trades per second over the window ending at `now`.
pub fn orders_per_sec(trades: &[TradeTick], window_seconds: i64, now: DateTime<Utc>) -> f64 {
    let cutoff = now - Duration::seconds(window_seconds);
    let count = trades.iter().filter(|t| t.ts > cutoff).count();
    if count == 0 {
        return 0.0;
    }
    round_to(count as f64 / window_seconds as f64, 2)
}

/// Net order flow (buy volume - sell volume) over the window ending at
/// `now`, or None when the window holds no trades.
pub fn net_flow(trades: &[TradeTick], window_seconds: i64, now: DateTime<Utc>) -> Option<NetFlow> {
    let cutoff = now - Duration::seconds(window_seconds);
    let recent: Vec<&TradeTick> = trades.iter().filter(|t| t.ts > cutoff).collect();
    if recent.is_empty() {
        return None;
    }

    let mut buy_volume = 0.0;
    let mut sell_volume = 0.0;
    for trade in recent {
        match trade.aggressor {
            AggressorSide::Buy => buy_volume += trade.volume,
            AggressorSide::Sell => sell_volume += trade.volume,
        }
    }

    Some(NetFlow {
        buy_volume: round_to(buy_volume, 8),
        sell_volume: round_to(sell_volume, 8),
        net_flow: round_to(buy_volume - sell_volume, 8),
    })
}

/// Rate-of-change of the trade rate over the window: split into halves,
/// compute trades/sec in each, return `(recent - older) / (window / 2)`.
/// Zero when either half is empty.
pub fn flow_acceleration(
    trades: &[TradeTick],
    window_seconds: i64,
    now: DateTime<Utc>,
) -> f64 {
    if trades.len() < 2 {
        return 0.0;
    }

    let half = Duration::milliseconds(window_seconds * 500);
    let full = Duration::seconds(window_seconds);

    let recent_count = trades
        .iter()
        .filter(|t| now - t.ts <= half && now - t.ts >= Duration::zero())
        .count();
    let older_count = trades
        .iter()
        .filter(|t| {
            let age = now - t.ts;
            age > half && age <= full
        })
        .count();

    if recent_count == 0 || older_count == 0 {
        return 0.0;
    }

    let half_secs = window_seconds as f64 / 2.0;
    let recent_rate = recent_count as f64 / half_secs;
    let older_rate = older_count as f64 / half_secs;
    (recent_rate - older_rate) / half_secs
}
