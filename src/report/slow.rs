// =============================================================================
// Slow-cycle analytics — volume profile, liquidity features, anomalies,
// and enrichment of the cached fast report
// =============================================================================

use chrono::Utc;
use tracing::warn;

use crate::calc::anomaly::{detect_flash_crash_risk, detect_iceberg, detect_spoofing, Anomaly};
use crate::calc::depth::depth_metrics;
use crate::calc::flow::flow_acceleration;
use crate::calc::liquidity::{detect_vacuums, detect_walls, LiquidityVacuum, LiquidityWall};
use crate::calc::profile::{volume_profile, VolumeProfile};
use crate::calc::spread::{mid_price, spread_bps};
use crate::report::schema::{AnalyticsBlock, LiquidityBlock, MarketReport};
use crate::state::symbol_state::SymbolState;

/// Default volume-profile binning.
const PROFILE_BINS_PER_TICK: u32 = 5;

/// Compute-heavy metrics produced once per slow cycle.
#[derive(Debug, Clone, Default)]
pub struct SlowMetrics {
    pub volume_profile: Option<VolumeProfile>,
    pub walls: Vec<LiquidityWall>,
    pub vacuums: Vec<LiquidityVacuum>,
    pub anomalies: Vec<Anomaly>,
}

impl SlowMetrics {
    pub fn is_empty(&self) -> bool {
        self.volume_profile.is_none()
            && self.walls.is_empty()
            && self.vacuums.is_empty()
            && self.anomalies.is_empty()
    }
}

/// Run all slow-cycle calculators over the symbol's state. Individual
/// calculators that lack inputs simply contribute nothing; the bundle is
/// always returned.
pub fn calculate_slow_metrics(state: &SymbolState, tick_size: f64) -> SlowMetrics {
    let mut metrics = SlowMetrics::default();
    let now = Utc::now();

    // Volume profile from the 30-minute window.
    let trades_30min = state.trades_buffered(1_800);
    metrics.volume_profile = volume_profile(&trades_30min, tick_size, PROFILE_BINS_PER_TICK);

    let quantity_history = state.quantity_history_snapshot();
    metrics.walls = detect_walls(&state.order_book, &quantity_history);
    metrics.vacuums = detect_vacuums(&state.order_book, &quantity_history);

    // Anomalies: spoofing against mid, icebergs over the 30 s window,
    // flash-crash risk from the fast signals.
    let mid = match (state.best_bid, state.best_ask) {
        (Some(bid), Some(ask)) => Some(mid_price(bid, ask)),
        _ => None,
    };

    if let Some(mid) = mid {
        metrics
            .anomalies
            .extend(detect_spoofing(&state.order_book, mid));
    }

    let trades_30s = state.trades_buffered(30);
    metrics.anomalies.extend(detect_iceberg(&trades_30s));

    if let (Some(bid), Some(ask)) = (state.best_bid, state.best_ask) {
        if let Some(depth) = depth_metrics(&state.order_book) {
            let trades_10s = state.trades_buffered(10);
            let acceleration = flow_acceleration(&trades_10s, 10, now);
            let spread = spread_bps(bid, ask);
            if let Some(risk) = detect_flash_crash_risk(spread, depth.imbalance, acceleration) {
                metrics.anomalies.push(risk);
            }
        } else {
            warn!(symbol = %state.symbol, phase = "slow_cycle", "flash_crash_skipped_no_depth");
        }
    }

    metrics
}

/// Merge slow-cycle analytics into a cached fast-cycle report.
///
/// Fast-cycle fields (spread, depth, flow, health) are the source of
/// truth and are never touched; only the optional tail blocks and the
/// `slow_cycle_updated_at` stamp change.
pub fn enrich_report(base: &MarketReport, metrics: &SlowMetrics) -> MarketReport {
    let mut enriched = base.clone();

    if metrics.volume_profile.is_some() {
        enriched.analytics = Some(AnalyticsBlock {
            volume_profile: metrics.volume_profile.clone(),
        });
    }

    if !metrics.walls.is_empty() || !metrics.vacuums.is_empty() {
        enriched.liquidity = Some(LiquidityBlock {
            walls: (!metrics.walls.is_empty()).then(|| metrics.walls.clone()),
            vacuums: (!metrics.vacuums.is_empty()).then(|| metrics.vacuums.clone()),
        });
    }

    if !metrics.anomalies.is_empty() {
        enriched.anomalies = Some(metrics.anomalies.clone());
    }

    enriched.slow_cycle_updated_at = Some(Utc::now().timestamp_millis());
    enriched
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fast::build_fast_report;
    use crate::report::schema::WriterMode;
    use crate::types::{AggressorSide, TradeTick};

    fn warm_state() -> SymbolState {
        let mut state = SymbolState::new("BTCUSDT");
        state.update_bid(100.0, 1.0);
        state.update_ask(100.5, 2.0);
        state
    }

    fn base_report(state: &SymbolState) -> MarketReport {
        build_fast_report(state, "n1", 1, WriterMode::Single, "BINANCE", None).unwrap()
    }

    #[test]
    fn empty_state_yields_empty_metrics() {
        let state = SymbolState::new("BTCUSDT");
        let metrics = calculate_slow_metrics(&state, 0.01);
        assert!(metrics.is_empty());
    }

    #[test]
    fn volume_profile_appears_with_enough_trades() {
        let mut state = warm_state();
        for _ in 0..15 {
            state.add_trade(
                TradeTick::new(Utc::now(), 100.25, 1.0, AggressorSide::Buy).unwrap(),
            );
        }
        let metrics = calculate_slow_metrics(&state, 0.01);
        let profile = metrics.volume_profile.unwrap();
        assert_eq!(profile.trade_count, 15);
        assert!(profile.val <= profile.poc && profile.poc <= profile.vah);
    }

    #[test]
    fn enrichment_preserves_fast_fields() {
        let mut state = warm_state();
        for _ in 0..15 {
            state.add_trade(
                TradeTick::new(Utc::now(), 100.25, 1.0, AggressorSide::Buy).unwrap(),
            );
        }
        let base = base_report(&state);
        let metrics = calculate_slow_metrics(&state, 0.01);
        let enriched = enrich_report(&base, &metrics);

        assert_eq!(enriched.spread_bps, base.spread_bps);
        assert_eq!(enriched.mid_price, base.mid_price);
        assert_eq!(enriched.depth, base.depth);
        assert_eq!(enriched.flow, base.flow);
        assert_eq!(enriched.health, base.health);
        assert_eq!(enriched.updated_at, base.updated_at);

        assert!(enriched.analytics.is_some());
        assert!(enriched.slow_cycle_updated_at.is_some());
    }

    #[test]
    fn enrichment_with_empty_metrics_only_stamps_time() {
        let state = warm_state();
        let base = base_report(&state);
        let enriched = enrich_report(&base, &SlowMetrics::default());

        assert!(enriched.analytics.is_none());
        assert!(enriched.liquidity.is_none());
        assert!(enriched.anomalies.is_none());
        assert!(enriched.slow_cycle_updated_at.is_some());
    }

    #[test]
    fn iceberg_anomaly_flows_into_enrichment() {
        let mut state = warm_state();
        for _ in 0..12 {
            state.add_trade(
                TradeTick::new(Utc::now(), 100.25, 1.0, AggressorSide::Buy).unwrap(),
            );
        }
        let metrics = calculate_slow_metrics(&state, 0.01);
        assert!(metrics
            .anomalies
            .iter()
            .any(|a| matches!(a, Anomaly::Iceberg { .. })));

        let enriched = enrich_report(&base_report(&state), &metrics);
        assert!(enriched.anomalies.unwrap().len() >= 1);
    }
}
