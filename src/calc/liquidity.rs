// =============================================================================
// Liquidity features — wall and vacuum detection against percentile baselines
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::calc::percentile;
use crate::state::orderbook::OrderBookSource;
use crate::state::symbol_state::BOOK_DEPTH;
use crate::types::{BookSide, PriceQty, Severity};

/// Minimum quantity-history samples before percentiles are trusted.
const MIN_HISTORY: usize = 10;
/// A wall is at least this multiple of the P95 baseline.
const WALL_FACTOR: f64 = 1.5;
/// Minimum consecutive thin levels that form a vacuum.
const VACUUM_MIN_RUN: usize = 3;

/// A concentrated resting order significantly above normal size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityWall {
    pub side: BookSide,
    pub price: f64,
    pub quantity: f64,
    pub severity: Severity,
    /// Distance from mid price in basis points.
    pub distance_bps: i64,
}

/// A run of consecutive levels with abnormally low quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityVacuum {
    pub side: BookSide,
    pub price_start: f64,
    pub price_end: f64,
    pub level_count: usize,
    pub severity: Severity,
}

/// Flag top levels whose quantity is at least 1.5x the P95 of recent
/// level sizes. Severity: high at >= 3x P95, medium at >= 2x, else low.
/// Requires at least 10 history samples and a two-sided book.
pub fn detect_walls(
    book: &dyn OrderBookSource,
    quantity_history: &[f64],
) -> Vec<LiquidityWall> {
    if quantity_history.len() < MIN_HISTORY {
        return Vec::new();
    }
    let Some(p95) = percentile(quantity_history, 95.0) else {
        return Vec::new();
    };

    let (Some(best_bid), Some(best_ask)) = (book.best_bid(), book.best_ask()) else {
        return Vec::new();
    };
    let mid = (best_bid.price + best_ask.price) / 2.0;

    let mut walls = Vec::new();
    for (side, levels) in [
        (BookSide::Bid, book.top_bids(BOOK_DEPTH)),
        (BookSide::Ask, book.top_asks(BOOK_DEPTH)),
    ] {
        for level in levels {
            if level.qty >= p95 * WALL_FACTOR {
                let severity = if level.qty >= p95 * 3.0 {
                    Severity::High
                } else if level.qty >= p95 * 2.0 {
                    Severity::Medium
                } else {
                    Severity::Low
                };
                let distance_bps = ((level.price - mid) / mid * 10_000.0).abs() as i64;
                walls.push(LiquidityWall {
                    side,
                    price: level.price,
                    quantity: level.qty,
                    severity,
                    distance_bps,
                });
            }
        }
    }
    walls
}

/// Flag runs of >= 3 consecutive levels below the P10 of recent level
/// sizes, per side, in top-of-book order. Severity: high at >= 10 levels,
/// medium at >= 6, else low.
pub fn detect_vacuums(
    book: &dyn OrderBookSource,
    quantity_history: &[f64],
) -> Vec<LiquidityVacuum> {
    if quantity_history.len() < MIN_HISTORY {
        return Vec::new();
    }
    let Some(p10) = percentile(quantity_history, 10.0) else {
        return Vec::new();
    };

    let mut vacuums = Vec::new();
    for (side, levels) in [
        (BookSide::Bid, book.top_bids(BOOK_DEPTH)),
        (BookSide::Ask, book.top_asks(BOOK_DEPTH)),
    ] {
        collect_runs(side, &levels, p10, &mut vacuums);
    }
    vacuums
}

fn collect_runs(
    side: BookSide,
    levels: &[PriceQty],
    threshold: f64,
    out: &mut Vec<LiquidityVacuum>,
) {
    let mut run: Vec<f64> = Vec::new();
    for level in levels {
        if level.qty < threshold {
            run.push(level.price);
        } else {
            flush_run(side, &mut run, out);
        }
    }
    flush_run(side, &mut run, out);
}

fn flush_run(side: BookSide, run: &mut Vec<f64>, out: &mut Vec<LiquidityVacuum>) {
    if run.len() >= VACUUM_MIN_RUN {
        let severity = if run.len() >= 10 {
            Severity::High
        } else if run.len() >= 6 {
            Severity::Medium
        } else {
            Severity::Low
        };
        out.push(LiquidityVacuum {
            side,
            price_start: run[0],
            price_end: run[run.len() - 1],
            level_count: run.len(),
            severity,
        });
    }
    run.clear();
}
