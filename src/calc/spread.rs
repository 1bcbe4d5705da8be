// =============================================================================
// Spread metrics — spread (bps), mid price, microprice
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::calc::round_to;
use crate::types::PriceQty;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpreadMetrics {
    pub spread_bps: f64,
    pub mid_price: f64,
    pub micro_price: f64,
}

/// Spread in basis points (1 bps = 0.01%).
pub fn spread_bps(best_bid: PriceQty, best_ask: PriceQty) -> f64 {
    if best_bid.price <= 0.0 || best_ask.price <= 0.0 {
        return 0.0;
    }
    let mid = (best_bid.price + best_ask.price) / 2.0;
    let spread = best_ask.price - best_bid.price;
    round_to((spread / mid) * 10_000.0, 4)
}

/// Simple mid price.
pub fn mid_price(best_bid: PriceQty, best_ask: PriceQty) -> f64 {
    round_to((best_bid.price + best_ask.price) / 2.0, 8)
}

/// Volume-weighted microprice: weights each side's price by the
/// opposite side's quantity. Falls back to mid when both sizes are zero.
pub fn micro_price(best_bid: PriceQty, best_ask: PriceQty) -> f64 {
    let total_qty = best_bid.qty + best_ask.qty;
    if total_qty == 0.0 {
        return mid_price(best_bid, best_ask);
    }
    let micro =
        (best_ask.qty * best_bid.price + best_bid.qty * best_ask.price) / total_qty;
    round_to(micro, 8)
}

/// All spread metrics, or None without a two-sided book.
pub fn spread_metrics(
    best_bid: Option<PriceQty>,
    best_ask: Option<PriceQty>,
) -> Option<SpreadMetrics> {
    let (bid, ask) = (best_bid?, best_ask?);
    Some(SpreadMetrics {
        spread_bps: spread_bps(bid, ask),
        mid_price: mid_price(bid, ask),
        micro_price: micro_price(bid, ask),
    })
}
