// =============================================================================
// Report cycles — the ~250 ms fast tier and the ~2 s slow enrichment tier
// =============================================================================

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::kv::{fetch_report, publish_report};
use crate::metrics;
use crate::report::fast::build_fast_report;
use crate::report::slow::{calculate_slow_metrics, enrich_report};

/// Warn when a cycle consumes more than this share of its period.
const UTILIZATION_WARN_FRACTION: f64 = 0.8;

pub async fn run_fast_cycle_loop(engine: Arc<Engine>) {
    info!("fast_cycle_loop_started");
    let mut interval =
        tokio::time::interval(Duration::from_millis(engine.config.report_period_ms));
    loop {
        interval.tick().await;
        engine.on_fast_cycle().await;
    }
}

pub async fn run_slow_cycle_loop(engine: Arc<Engine>) {
    info!("slow_cycle_loop_started");
    let mut interval =
        tokio::time::interval(Duration::from_millis(engine.config.slow_period_ms));
    loop {
        interval.tick().await;
        // Fire-and-forget so ticks keep their cadence; the reentrancy
        // guard inside on_slow_cycle absorbs overruns.
        let engine = engine.clone();
        tokio::spawn(async move {
            engine.on_slow_cycle().await;
        });
    }
}

impl Engine {
    /// One fast cycle: for every owned symbol verify the fencing token,
    /// build the report from a consistent state snapshot, and publish.
    pub async fn on_fast_cycle(&self) {
        let cycle_start = Instant::now();

        for symbol in self.owned_symbol_list() {
            let Some(token) = self.writer_token(&symbol) else {
                warn!(symbol = %symbol, "report_skipped_no_lease");
                continue;
            };

            // Stale-writer detection: the token in the store must still
            // be the one we were issued.
            if self.config.enable_coordination {
                let lease_info = self.lease.lease_info(&symbol).await;
                if lease_info.token != Some(token) {
                    warn!(
                        symbol = %symbol,
                        our_token = token,
                        current_token = ?lease_info.token,
                        reason = "stale_token",
                        "lease_conflict"
                    );
                    metrics::inc_lease_conflicts();
                    continue;
                }
            }

            let report_start = Instant::now();
            let report = {
                let Some(state) = self.state_for(&symbol) else {
                    continue;
                };
                let ticker = self.ticker_for(&symbol);
                let state = state.lock();
                build_fast_report(
                    &state,
                    &self.config.node_id,
                    token,
                    self.mode,
                    &self.config.venue,
                    ticker.as_ref(),
                )
            };

            let Some(report) = report else {
                debug!(symbol = %symbol, "report_skipped_insufficient_data");
                continue;
            };
            let report_gen_ms = report_start.elapsed().as_secs_f64() * 1_000.0;

            let publish_start = Instant::now();
            let published = publish_report(&self.kv, &symbol, &report).await;
            let publish_ms = publish_start.elapsed().as_secs_f64() * 1_000.0;

            if published {
                metrics::record_report_published(&symbol, report.data_age_ms as f64);
                metrics::record_calc_latency("report_generation", "fast", report_gen_ms);
                metrics::record_calc_latency("kv_publish", "fast", publish_ms);
                debug!(
                    symbol = %symbol,
                    lag_ms = report.data_age_ms,
                    report_gen_ms,
                    publish_ms,
                    writer_token = token,
                    "report_published"
                );
            } else {
                warn!(symbol = %symbol, "report_publish_failed");
            }
        }

        let cycle_ms = cycle_start.elapsed().as_secs_f64() * 1_000.0;
        metrics::record_calc_latency("fast_cycle_total", "fast", cycle_ms);

        let period_ms = self.config.report_period_ms as f64;
        if cycle_ms > period_ms * UTILIZATION_WARN_FRACTION {
            let utilization_pct = (cycle_ms / period_ms * 100.0).round();
            warn!(
                cycle_ms,
                period_ms = self.config.report_period_ms,
                utilization_pct,
                "fast_cycle_slow"
            );
        }
    }

    /// One slow cycle: compute the heavy analytics per owned symbol and
    /// merge them into the cached fast report. Reentrancy-guarded: when
    /// the previous cycle is still running, the tick is skipped and
    /// counted.
    pub async fn on_slow_cycle(&self) {
        if self.slow_cycle_running.swap(true, Ordering::SeqCst) {
            let skips = self.slow_cycle_skips.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(skip_count = skips, "slow_cycle_skip");
            return;
        }

        let cycle_start = Instant::now();

        for symbol in self.owned_symbol_list() {
            let Some(state) = self.state_for(&symbol) else {
                continue;
            };

            let calc_start = Instant::now();
            let slow_metrics = {
                let state = state.lock();
                calculate_slow_metrics(&state, self.config.tick_size)
            };
            let calc_ms = calc_start.elapsed().as_secs_f64() * 1_000.0;

            if slow_metrics.volume_profile.is_some() {
                metrics::record_calc_latency("volume_profile", "slow", calc_ms);
            }
            if !slow_metrics.walls.is_empty() || !slow_metrics.vacuums.is_empty() {
                metrics::record_calc_latency("liquidity", "slow", calc_ms);
            }
            if !slow_metrics.anomalies.is_empty() {
                metrics::record_calc_latency("anomalies", "slow", calc_ms);
            }

            // The fast report in the store is the source of truth; the
            // slow tier only decorates it.
            let Some(base) = fetch_report(&self.kv, &symbol).await else {
                debug!(symbol = %symbol, "slow_cycle_no_base_report");
                continue;
            };

            let enriched = enrich_report(&base, &slow_metrics);
            if publish_report(&self.kv, &symbol, &enriched).await {
                debug!(symbol = %symbol, calc_ms, "slow_cycle_enriched");
            }
        }

        self.slow_cycle_running.store(false, Ordering::SeqCst);

        let cycle_ms = cycle_start.elapsed().as_secs_f64() * 1_000.0;
        metrics::record_calc_latency("slow_cycle_total", "slow", cycle_ms);

        let period_ms = self.config.slow_period_ms as f64;
        if cycle_ms > period_ms * UTILIZATION_WARN_FRACTION {
            let utilization_pct = (cycle_ms / period_ms * 100.0).round();
            warn!(
                cycle_ms,
                period_ms = self.config.slow_period_ms,
                utilization_pct,
                "slow_cycle_slow"
            );
        }
    }
}
