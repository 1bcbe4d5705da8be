// =============================================================================
// Symbol State — order book, windowed trade buffers, freshness tracking
// =============================================================================
//
// One instance per tracked symbol. Mutation is serialized by the caller
// (the engine keeps each state behind its own lock); nothing in here is
// shared across symbols.
// =============================================================================

use chrono::{DateTime, Duration, Utc};

use crate::state::orderbook::{OrderBookL2, OrderBookSource};
use crate::state::window::WindowedBuffer;
use crate::types::{PriceQty, TradeTick};

/// Depth tracked per side.
pub const BOOK_DEPTH: usize = 20;

/// Trade buffer capacities per window.
const CAP_10S: usize = 1_000;
const CAP_30S: usize = 3_000;
const CAP_30MIN: usize = 20_000;
/// Quantity history feeding percentile baselines.
const CAP_QTY_HISTORY: usize = 10_000;

/// Complete microstructure state for one symbol.
pub struct SymbolState {
    pub symbol: String,
    pub order_book: OrderBookL2,

    pub last_trade: Option<TradeTick>,
    pub best_bid: Option<PriceQty>,
    pub best_ask: Option<PriceQty>,

    trades_10s: WindowedBuffer<TradeTick>,
    trades_30s: WindowedBuffer<TradeTick>,
    trades_30min: WindowedBuffer<TradeTick>,
    quantity_history: WindowedBuffer<f64>,

    /// Event time of the most recent ingested event for this symbol.
    pub last_event_ts: Option<DateTime<Utc>>,
}

impl SymbolState {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            order_book: OrderBookL2::new(BOOK_DEPTH),
            last_trade: None,
            best_bid: None,
            best_ask: None,
            trades_10s: WindowedBuffer::new(CAP_10S),
            trades_30s: WindowedBuffer::new(CAP_30S),
            trades_30min: WindowedBuffer::new(CAP_30MIN),
            quantity_history: WindowedBuffer::new(CAP_QTY_HISTORY),
            last_event_ts: None,
        }
    }

    /// Apply a single bid level update (qty=0 removes the level).
    pub fn update_bid(&mut self, price: f64, qty: f64) {
        self.order_book.update_bid(price, qty);
        self.best_bid = self.order_book.best_bid();
        if qty > 0.0 {
            self.quantity_history.push(qty);
        }
        self.last_event_ts = Some(Utc::now());
    }

    /// Apply a single ask level update (qty=0 removes the level).
    pub fn update_ask(&mut self, price: f64, qty: f64) {
        self.order_book.update_ask(price, qty);
        self.best_ask = self.order_book.best_ask();
        if qty > 0.0 {
            self.quantity_history.push(qty);
        }
        self.last_event_ts = Some(Utc::now());
    }

    /// Replace the book with a full top-20 snapshot from the depth feed.
    pub fn apply_depth_snapshot(
        &mut self,
        bids: &[(f64, f64)],
        asks: &[(f64, f64)],
        ts: DateTime<Utc>,
    ) {
        self.order_book.apply_snapshot(bids, asks);
        self.best_bid = self.order_book.best_bid();
        self.best_ask = self.order_book.best_ask();

        for &(_, qty) in bids.iter().chain(asks.iter()) {
            if qty > 0.0 {
                self.quantity_history.push(qty);
            }
        }

        self.last_event_ts = Some(ts);
    }

    /// Insert a trade into all three time-windowed buffers.
    pub fn add_trade(&mut self, trade: TradeTick) {
        self.last_trade = Some(trade);
        self.trades_10s.push(trade);
        self.trades_30s.push(trade);
        self.trades_30min.push(trade);
        self.last_event_ts = Some(trade.ts);
    }

    /// Trades newer than `now - window_seconds`, read from the smallest
    /// buffer that covers the window.
    pub fn trades_in_window(&self, window_seconds: i64) -> Vec<TradeTick> {
        let cutoff = Utc::now() - Duration::seconds(window_seconds);
        self.buffer_for_window(window_seconds).items_newer_than(cutoff)
    }

    /// All trades retained for the given window, unfiltered by time.
    pub fn trades_buffered(&self, window_seconds: i64) -> Vec<TradeTick> {
        self.buffer_for_window(window_seconds).to_vec()
    }

    fn buffer_for_window(&self, window_seconds: i64) -> &WindowedBuffer<TradeTick> {
        if window_seconds <= 10 {
            &self.trades_10s
        } else if window_seconds <= 30 {
            &self.trades_30s
        } else {
            &self.trades_30min
        }
    }

    pub fn quantity_history_snapshot(&self) -> Vec<f64> {
        self.quantity_history.to_vec()
    }

    /// Milliseconds since the last ingested event, or None before the
    /// first event arrives.
    pub fn data_age_ms(&self) -> Option<i64> {
        self.last_event_ts
            .map(|ts| (Utc::now() - ts).num_milliseconds().max(0))
    }

    /// All four buffers respect their caps.
    pub fn buffers_bounded(&self) -> bool {
        self.trades_10s.len() <= self.trades_10s.max_size()
            && self.trades_30s.len() <= self.trades_30s.max_size()
            && self.trades_30min.len() <= self.trades_30min.max_size()
            && self.quantity_history.len() <= self.quantity_history.max_size()
    }
}
