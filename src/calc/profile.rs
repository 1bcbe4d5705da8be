// =============================================================================
// Volume Profile — POC / VAH / VAL over tick-binned trade history
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::TradeTick;

/// Minimum trades required before a profile is meaningful.
const MIN_TRADES: usize = 10;
/// Fraction of total volume the value area must cover.
const VALUE_AREA_FRACTION: f64 = 0.70;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeProfile {
    /// Point of Control: center of the highest-volume price bin.
    #[serde(rename = "POC")]
    pub poc: f64,
    /// Value Area High.
    #[serde(rename = "VAH")]
    pub vah: f64,
    /// Value Area Low.
    #[serde(rename = "VAL")]
    pub val: f64,
    /// Seconds spanned by the trade window.
    pub window_sec: i64,
    pub trade_count: usize,
}

/// Bin trade volume on a `tick_size / bins_per_tick` grid, locate the POC,
/// then expand outward one bin at a time (always toward the heavier
/// neighbor, preferring the lower-price side on exact ties) until the
/// value area holds 70% of total volume.
///
/// Returns None with fewer than 10 trades or when the inputs degenerate.
pub fn volume_profile(
    trades: &[TradeTick],
    tick_size: f64,
    bins_per_tick: u32,
) -> Option<VolumeProfile> {
    if trades.len() < MIN_TRADES || tick_size <= 0.0 || bins_per_tick == 0 {
        return None;
    }

    let bin_size = tick_size / bins_per_tick as f64;

    let min_price = trades.iter().map(|t| t.price).fold(f64::INFINITY, f64::min);
    let max_price = trades.iter().map(|t| t.price).fold(f64::NEG_INFINITY, f64::max);
    if !min_price.is_finite() || !max_price.is_finite() {
        return None;
    }

    let n_bins = (((max_price - min_price) / bin_size).floor() as usize) + 1;
    let edge = |i: usize| min_price + i as f64 * bin_size;

    let mut hist = vec![0.0f64; n_bins];
    for trade in trades {
        let idx = (((trade.price - min_price) / bin_size) as usize).min(n_bins - 1);
        hist[idx] += trade.volume;
    }

    // POC: first bin with maximal volume (lower price wins exact ties).
    let mut poc_idx = 0;
    for (i, &volume) in hist.iter().enumerate() {
        if volume > hist[poc_idx] {
            poc_idx = i;
        }
    }
    let poc_price = (edge(poc_idx) + edge(poc_idx + 1)) / 2.0;

    // Expand the value area from the POC until it covers 70% of volume.
    let total_volume: f64 = hist.iter().sum();
    let target_volume = total_volume * VALUE_AREA_FRACTION;

    let mut left = poc_idx;
    let mut right = poc_idx;
    let mut accumulated = hist[poc_idx];

    while accumulated < target_volume {
        let left_volume = if left > 0 { hist[left - 1] } else { 0.0 };
        let right_volume = if right + 1 < n_bins { hist[right + 1] } else { 0.0 };

        if left_volume >= right_volume && left > 0 {
            left -= 1;
            accumulated += hist[left];
        } else if right + 1 < n_bins {
            right += 1;
            accumulated += hist[right];
        } else {
            break;
        }
    }

    let val = edge(left);
    let vah = edge(right + 1);
    if !(val <= poc_price && poc_price <= vah) {
        return None;
    }

    let window_sec = if trades.len() >= 2 {
        (trades[trades.len() - 1].ts - trades[0].ts).num_seconds()
    } else {
        0
    };

    Some(VolumeProfile {
        poc: poc_price,
        vah,
        val,
        window_sec,
        trade_count: trades.len(),
    })
}
