// =============================================================================
// Depth metrics — aggregate size and imbalance over the top-N book
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::calc::round_to;
use crate::state::orderbook::OrderBookSource;
use crate::state::symbol_state::BOOK_DEPTH;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthMetrics {
    pub total_bid_qty: f64,
    pub total_ask_qty: f64,
    /// (bids - asks) / (bids + asks), in [-1, 1]. Positive = bid-heavy.
    pub imbalance: f64,
}

/// Depth metrics over the top-N levels, or None when either side is empty.
pub fn depth_metrics(book: &dyn OrderBookSource) -> Option<DepthMetrics> {
    let bids = book.top_bids(BOOK_DEPTH);
    let asks = book.top_asks(BOOK_DEPTH);
    if bids.is_empty() || asks.is_empty() {
        return None;
    }

    let total_bid_qty: f64 = bids.iter().map(|l| l.qty).sum();
    let total_ask_qty: f64 = asks.iter().map(|l| l.qty).sum();

    let total = total_bid_qty + total_ask_qty;
    let imbalance = if total == 0.0 {
        0.0
    } else {
        (total_bid_qty - total_ask_qty) / total
    };

    Some(DepthMetrics {
        total_bid_qty: round_to(total_bid_qty, 8),
        total_ask_qty: round_to(total_ask_qty, 8),
        imbalance: round_to(imbalance, 4),
    })
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::orderbook::OrderBookL2;

    #[test]
    fn none_when_either_side_empty() {
        let mut book = OrderBookL2::new(20);
        assert!(depth_metrics(&book).is_none());
        book.update_bid(100.0, 1.0);
        assert!(depth_metrics(&book).is_none());
    }

    #[test]
    fn totals_and_imbalance() {
        let mut book = OrderBookL2::new(20);
        book.update_bid(100.0, 1.0);
        book.update_bid(99.5, 2.0);
        book.update_ask(100.5, 6.0);

        let m = depth_metrics(&book).unwrap();
        assert_eq!(m.total_bid_qty, 3.0);
        assert_eq!(m.total_ask_qty, 6.0);
        // (3 - 6) / 9 = -0.3333
        assert!((m.imbalance - -0.3333).abs() < 1e-9, "got {}", m.imbalance);
    }

    #[test]
    fn imbalance_bounded() {
        let mut book = OrderBookL2::new(20);
        book.update_bid(100.0, 1_000_000.0);
        book.update_ask(100.5, 0.0001);
        let m = depth_metrics(&book).unwrap();
        assert!(m.imbalance <= 1.0 && m.imbalance >= -1.0);
        assert!(m.imbalance > 0.99);
    }

    #[test]
    fn balanced_book_has_zero_imbalance() {
        let mut book = OrderBookL2::new(20);
        book.update_bid(100.0, 5.0);
        book.update_ask(100.5, 5.0);
        assert_eq!(depth_metrics(&book).unwrap().imbalance, 0.0);
    }
}
