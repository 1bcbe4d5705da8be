// =============================================================================
// Fast-cycle report builder — spread, depth, flow, health every ~250 ms
// =============================================================================

use chrono::{SecondsFormat, Utc};

use crate::calc::depth::depth_metrics;
use crate::calc::flow::{net_flow, orders_per_sec};
use crate::calc::health::{health_score, ingestion_status};
use crate::calc::spread::spread_metrics;
use crate::report::schema::{
    DepthBlock, FlowBlock, HealthBlock, HealthComponents, IngestionInfo, MarketReport,
    WriterInfo, WriterMode, SCHEMA_VERSION,
};
use crate::state::orderbook::OrderBookSource;
use crate::state::symbol_state::{SymbolState, BOOK_DEPTH};
use crate::types::TickerStats;

/// Build a complete fast-cycle report from the symbol's current state.
///
/// Returns None when the state cannot support one yet: both best bid and
/// best ask must exist and the spread/depth metrics must be computable.
/// That is the normal warm-up path, not an error.
pub fn build_fast_report(
    state: &SymbolState,
    node_id: &str,
    writer_token: i64,
    mode: WriterMode,
    venue: &str,
    ticker: Option<&TickerStats>,
) -> Option<MarketReport> {
    let best_bid = state.best_bid?;
    let best_ask = state.best_ask?;

    let now = Utc::now();
    let data_age_ms = state.data_age_ms().unwrap_or(0);
    let last_update = state.last_event_ts.unwrap_or(now);

    let spread = spread_metrics(Some(best_bid), Some(best_ask))?;
    let depth = depth_metrics(&state.order_book)?;

    let trades_10s = state.trades_buffered(10);
    let trades_30s = state.trades_buffered(30);
    let orders_per_sec = orders_per_sec(&trades_10s, 10, now);
    let net_flow = net_flow(&trades_30s, 30, now)
        .map(|f| f.net_flow)
        .unwrap_or(0.0);

    // Fast cycle never runs the anomaly detectors.
    let health = health_score(
        Some(data_age_ms),
        Some(spread.spread_bps),
        Some(depth.imbalance),
        false,
    );

    let last_price = state
        .last_trade
        .map(|t| t.price)
        .unwrap_or(spread.mid_price);
    let (change_24h_pct, high_24h, low_24h, volume_24h) = match ticker {
        Some(t) => (t.change_24h_pct, t.high_24h, t.low_24h, t.volume_24h),
        None => (0.0, last_price, last_price, 0.0),
    };

    Some(MarketReport {
        schema_version: SCHEMA_VERSION.to_string(),
        writer: WriterInfo {
            node_id: node_id.to_string(),
            writer_token,
            mode,
        },
        updated_at: now.timestamp_millis(),
        symbol: state.symbol.clone(),
        venue: venue.to_string(),
        generated_at: now.to_rfc3339_opts(SecondsFormat::Micros, true),
        data_age_ms,
        ingestion: IngestionInfo {
            status: ingestion_status(data_age_ms),
            last_update: last_update.to_rfc3339_opts(SecondsFormat::Micros, true),
        },
        last_price,
        change_24h_pct,
        high_24h,
        low_24h,
        volume_24h,
        best_bid,
        best_ask,
        spread_bps: spread.spread_bps,
        mid_price: spread.mid_price,
        micro_price: spread.micro_price,
        depth: DepthBlock {
            top20_bid: state.order_book.top_bids(BOOK_DEPTH),
            top20_ask: state.order_book.top_asks(BOOK_DEPTH),
            sum_bid: depth.total_bid_qty,
            sum_ask: depth.total_ask_qty,
            imbalance: depth.imbalance,
        },
        flow: FlowBlock {
            orders_per_sec,
            net_flow,
        },
        health: HealthBlock {
            status: health.status,
            score: health.score as i64,
            components: HealthComponents {
                spread: 0.0,
                depth: 0.0,
                balance: 0.0,
                flow: 0.0,
                anomalies: 0.0,
                freshness: health.score,
            },
            issues: health.issues.iter().map(|s| s.to_string()).collect(),
        },
        analytics: None,
        liquidity: None,
        anomalies: None,
        slow_cycle_updated_at: None,
    })
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::health::MarketStatus;
    use crate::types::{AggressorSide, TradeTick};

    fn minimal_state() -> SymbolState {
        let mut state = SymbolState::new("BTCUSDT");
        state.update_bid(100.0, 1.0);
        state.update_ask(100.5, 2.0);
        state
    }

    #[test]
    fn none_without_two_sided_book() {
        let mut state = SymbolState::new("BTCUSDT");
        assert!(build_fast_report(&state, "n1", 1, WriterMode::Single, "BINANCE", None).is_none());

        state.update_bid(100.0, 1.0);
        assert!(build_fast_report(&state, "n1", 1, WriterMode::Single, "BINANCE", None).is_none());
    }

    #[test]
    fn fast_report_from_minimal_state() {
        // best_bid 100.0x1, best_ask 100.5x2, no trades, no ticker.
        let state = minimal_state();
        let report =
            build_fast_report(&state, "n1", 1, WriterMode::Single, "BINANCE", None).unwrap();

        assert_eq!(report.mid_price, 100.25);
        assert!((report.micro_price - 100.16666667).abs() < 1e-8);
        assert!((report.spread_bps - 49.8753).abs() < 1e-4);
        assert!((report.depth.imbalance - -0.3333).abs() < 1e-9);
        assert_eq!(report.flow.orders_per_sec, 0.0);
        assert_eq!(report.flow.net_flow, 0.0);
        // Moderate imbalance is an intermediate penalty -> degraded.
        assert_eq!(report.health.status, MarketStatus::Degraded);
        assert_eq!(report.health.score, 90);
        assert_eq!(report.schema_version, "1.1");
        assert_eq!(report.writer.writer_token, 1);
    }

    #[test]
    fn last_price_falls_back_to_mid_without_trades() {
        let state = minimal_state();
        let report =
            build_fast_report(&state, "n1", 1, WriterMode::Single, "BINANCE", None).unwrap();
        assert_eq!(report.last_price, 100.25);
        assert_eq!(report.high_24h, 100.25);
        assert_eq!(report.low_24h, 100.25);
        assert_eq!(report.volume_24h, 0.0);
    }

    #[test]
    fn last_trade_price_and_ticker_flow_through() {
        let mut state = minimal_state();
        state.add_trade(TradeTick::new(Utc::now(), 100.2, 0.5, AggressorSide::Buy).unwrap());

        let ticker = TickerStats {
            last_price: 100.2,
            change_24h_pct: 1.5,
            high_24h: 105.0,
            low_24h: 95.0,
            volume_24h: 12_345.0,
        };
        let report =
            build_fast_report(&state, "n1", 3, WriterMode::Coordinated, "BINANCE", Some(&ticker))
                .unwrap();

        assert_eq!(report.last_price, 100.2);
        assert_eq!(report.change_24h_pct, 1.5);
        assert_eq!(report.high_24h, 105.0);
        assert_eq!(report.volume_24h, 12_345.0);
        assert!(report.flow.net_flow > 0.0);
        assert!(report.flow.orders_per_sec > 0.0);
    }

    #[test]
    fn rebuilding_from_unchanged_book_is_stable() {
        let state = minimal_state();
        let a = build_fast_report(&state, "n1", 1, WriterMode::Single, "BINANCE", None).unwrap();
        let b = build_fast_report(&state, "n1", 1, WriterMode::Single, "BINANCE", None).unwrap();
        assert_eq!(a.depth, b.depth);
        assert_eq!(a.spread_bps, b.spread_bps);
        assert_eq!(a.mid_price, b.mid_price);
        assert_eq!(a.micro_price, b.micro_price);
    }

    #[test]
    fn generated_at_uses_utc_z_suffix() {
        let state = minimal_state();
        let report =
            build_fast_report(&state, "n1", 1, WriterMode::Single, "BINANCE", None).unwrap();
        assert!(report.generated_at.ends_with('Z'));
        assert!(report.ingestion.last_update.ends_with('Z'));
    }
}
