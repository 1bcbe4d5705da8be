// =============================================================================
// Level-2 Order Book — price-keyed depth with cached top-N projections
// =============================================================================

use std::collections::HashMap;

use crate::types::PriceQty;

/// Narrow read interface over an order book, as consumed by the
/// calculators and report builders. Adapting any upstream book shape
/// happens once, at the boundary; everything downstream sees only this.
pub trait OrderBookSource {
    fn top_bids(&self, n: usize) -> Vec<PriceQty>;
    fn top_asks(&self, n: usize) -> Vec<PriceQty>;
    fn best_bid(&self) -> Option<PriceQty>;
    fn best_ask(&self) -> Option<PriceQty>;
}

/// L2 order book for a single symbol.
///
/// Levels are keyed by exact price; the top-N projections (bids sorted
/// descending, asks ascending, truncated to `max_levels`) are recomputed
/// after every mutation so reads are just slice lookups. The maps never
/// contain a zero or negative quantity.
#[derive(Debug, Clone)]
pub struct OrderBookL2 {
    // Keyed by price bit pattern; prices are validated finite and positive
    // upstream, so bit equality matches numeric equality.
    bids: HashMap<u64, (f64, f64)>,
    asks: HashMap<u64, (f64, f64)>,
    top_bids: Vec<(f64, f64)>,
    top_asks: Vec<(f64, f64)>,
    max_levels: usize,
}

impl OrderBookL2 {
    pub fn new(max_levels: usize) -> Self {
        Self {
            bids: HashMap::new(),
            asks: HashMap::new(),
            top_bids: Vec::new(),
            top_asks: Vec::new(),
            max_levels,
        }
    }

    /// Insert/replace a bid level; qty <= 0 removes the level.
    pub fn update_bid(&mut self, price: f64, qty: f64) {
        if qty <= 0.0 {
            self.bids.remove(&price.to_bits());
        } else {
            self.bids.insert(price.to_bits(), (price, qty));
        }
        self.recompute_top();
    }

    /// Insert/replace an ask level; qty <= 0 removes the level.
    pub fn update_ask(&mut self, price: f64, qty: f64) {
        if qty <= 0.0 {
            self.asks.remove(&price.to_bits());
        } else {
            self.asks.insert(price.to_bits(), (price, qty));
        }
        self.recompute_top();
    }

    /// Replace the whole book with a fresh top-N snapshot (partial-depth
    /// feeds deliver the full visible book every update).
    pub fn apply_snapshot(&mut self, bids: &[(f64, f64)], asks: &[(f64, f64)]) {
        self.bids.clear();
        self.asks.clear();
        for &(price, qty) in bids {
            if qty > 0.0 {
                self.bids.insert(price.to_bits(), (price, qty));
            }
        }
        for &(price, qty) in asks {
            if qty > 0.0 {
                self.asks.insert(price.to_bits(), (price, qty));
            }
        }
        self.recompute_top();
    }

    fn recompute_top(&mut self) {
        let mut bids: Vec<(f64, f64)> = self.bids.values().copied().collect();
        bids.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        bids.truncate(self.max_levels);
        self.top_bids = bids;

        let mut asks: Vec<(f64, f64)> = self.asks.values().copied().collect();
        asks.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        asks.truncate(self.max_levels);
        self.top_asks = asks;
    }

    /// Best bid < best ask whenever both sides are populated.
    pub fn is_uncrossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price < ask.price,
            _ => true,
        }
    }

    pub fn bid_level_count(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_level_count(&self) -> usize {
        self.asks.len()
    }
}

impl OrderBookSource for OrderBookL2 {
    fn top_bids(&self, n: usize) -> Vec<PriceQty> {
        self.top_bids
            .iter()
            .take(n)
            .map(|&(price, qty)| PriceQty { price, qty })
            .collect()
    }

    fn top_asks(&self, n: usize) -> Vec<PriceQty> {
        self.top_asks
            .iter()
            .take(n)
            .map(|&(price, qty)| PriceQty { price, qty })
            .collect()
    }

    fn best_bid(&self) -> Option<PriceQty> {
        self.top_bids
            .first()
            .map(|&(price, qty)| PriceQty { price, qty })
    }

    fn best_ask(&self) -> Option<PriceQty> {
        self.top_asks
            .first()
            .map(|&(price, qty)| PriceQty { price, qty })
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn book_with_levels() -> OrderBookL2 {
        let mut book = OrderBookL2::new(20);
        book.update_bid(100.0, 1.0);
        book.update_bid(99.5, 2.0);
        book.update_bid(99.0, 3.0);
        book.update_ask(100.5, 1.5);
        book.update_ask(101.0, 2.5);
        book
    }

    #[test]
    fn best_bid_is_highest_best_ask_is_lowest() {
        let book = book_with_levels();
        assert_eq!(book.best_bid().unwrap().price, 100.0);
        assert_eq!(book.best_ask().unwrap().price, 100.5);
    }

    #[test]
    fn top_bids_sorted_descending_asks_ascending() {
        let book = book_with_levels();
        let bids: Vec<f64> = book.top_bids(20).iter().map(|l| l.price).collect();
        let asks: Vec<f64> = book.top_asks(20).iter().map(|l| l.price).collect();
        assert_eq!(bids, vec![100.0, 99.5, 99.0]);
        assert_eq!(asks, vec![100.5, 101.0]);
    }

    #[test]
    fn zero_qty_removes_level() {
        let mut book = book_with_levels();
        book.update_bid(100.0, 0.0);
        assert_eq!(book.best_bid().unwrap().price, 99.5);
        book.update_ask(100.5, 0.0);
        assert_eq!(book.best_ask().unwrap().price, 101.0);
    }

    #[test]
    fn replacing_level_updates_qty() {
        let mut book = book_with_levels();
        book.update_bid(100.0, 7.0);
        assert_eq!(book.best_bid().unwrap().qty, 7.0);
        assert_eq!(book.bid_level_count(), 3);
    }

    #[test]
    fn top_truncates_to_max_levels() {
        let mut book = OrderBookL2::new(3);
        for i in 0..10 {
            book.update_bid(100.0 - i as f64, 1.0);
        }
        assert_eq!(book.top_bids(20).len(), 3);
        assert_eq!(book.top_bids(20)[0].price, 100.0);
    }

    #[test]
    fn snapshot_replaces_previous_book() {
        let mut book = book_with_levels();
        book.apply_snapshot(&[(50.0, 1.0)], &[(51.0, 2.0)]);
        assert_eq!(book.bid_level_count(), 1);
        assert_eq!(book.ask_level_count(), 1);
        assert_eq!(book.best_bid().unwrap().price, 50.0);
        assert_eq!(book.best_ask().unwrap().price, 51.0);
    }

    #[test]
    fn snapshot_skips_zero_qty_levels() {
        let mut book = OrderBookL2::new(20);
        book.apply_snapshot(&[(50.0, 0.0), (49.0, 1.0)], &[]);
        assert_eq!(book.bid_level_count(), 1);
        assert_eq!(book.best_bid().unwrap().price, 49.0);
    }

    #[test]
    fn uncrossed_invariant() {
        let book = book_with_levels();
        assert!(book.is_uncrossed());

        let mut crossed = OrderBookL2::new(20);
        crossed.update_bid(101.0, 1.0);
        crossed.update_ask(100.0, 1.0);
        assert!(!crossed.is_uncrossed());

        let empty = OrderBookL2::new(20);
        assert!(empty.is_uncrossed());
    }
}
