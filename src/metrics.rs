// =============================================================================
// Observability — Prometheus metrics recorder and the /metrics, /health server
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use parking_lot::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Calculation latency buckets (milliseconds).
const CALC_LATENCY_BUCKETS: &[f64] = &[
    1.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1_000.0, 2_000.0,
];
/// Data freshness buckets (milliseconds).
const DATA_AGE_BUCKETS: &[f64] = &[
    10.0, 50.0, 100.0, 250.0, 500.0, 750.0, 1_000.0, 1_500.0, 2_000.0, 5_000.0,
];

/// Install the global Prometheus recorder with the report pipeline's
/// bucket layout and register metric descriptions. Returns the handle
/// the HTTP endpoint renders from.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("calc_latency_ms".to_string()),
            CALC_LATENCY_BUCKETS,
        )
        .context("calc_latency_ms buckets")?
        .set_buckets_for_metric(Matcher::Full("data_age_ms".to_string()), DATA_AGE_BUCKETS)
        .context("data_age_ms buckets")?
        .install_recorder()
        .context("install prometheus recorder")?;

    metrics::describe_gauge!("node_heartbeat", "Node heartbeat status (1=alive, 0=dead)");
    metrics::describe_gauge!("symbols_assigned", "Number of symbols assigned to node");
    metrics::describe_histogram!("calc_latency_ms", "Calculation latency in milliseconds");
    metrics::describe_counter!("report_publish_total", "Total reports published");
    metrics::describe_histogram!("data_age_ms", "Data age in milliseconds at publish");
    metrics::describe_counter!("lease_conflicts_total", "Lease conflicts detected");
    metrics::describe_counter!("hrw_rebalances_total", "HRW rebalance cycles that changed ownership");
    metrics::describe_counter!("ws_resubscribe_total", "WebSocket (re)subscriptions by reason");

    Ok(handle)
}

// ── Recording helpers (label plumbing in one place) ──────────────────────────

pub fn record_calc_latency(metric: &'static str, cycle: &'static str, duration_ms: f64) {
    metrics::histogram!("calc_latency_ms", duration_ms, "metric" => metric, "cycle" => cycle);
}

pub fn record_report_published(symbol: &str, data_age_ms: f64) {
    metrics::counter!("report_publish_total", 1, "symbol" => symbol.to_string());
    metrics::histogram!("data_age_ms", data_age_ms, "symbol" => symbol.to_string());
}

pub fn set_node_heartbeat(node_id: &str, alive: bool) {
    metrics::gauge!("node_heartbeat", if alive { 1.0 } else { 0.0 }, "node" => node_id.to_string());
}

pub fn set_symbols_assigned(node_id: &str, count: usize) {
    metrics::gauge!("symbols_assigned", count as f64, "node" => node_id.to_string());
}

pub fn inc_lease_conflicts() {
    metrics::counter!("lease_conflicts_total", 1);
}

pub fn inc_rebalances() {
    metrics::counter!("hrw_rebalances_total", 1);
}

pub fn inc_ws_resubscribe(reason: &'static str) {
    metrics::counter!("ws_resubscribe_total", 1, "reason" => reason);
}

// =============================================================================
// HTTP surface
// =============================================================================

/// Shared state behind the observability endpoints. `owned_symbols` is
/// the same set the engine maintains.
pub struct Observability {
    pub handle: PrometheusHandle,
    pub node_id: String,
    pub owned_symbols: Arc<RwLock<HashSet<String>>>,
    pub started_at: std::time::Instant,
}

/// Build the observability router: Prometheus text at /metrics, JSON
/// liveness + ownership at /health.
pub fn router(state: Arc<Observability>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/metrics", get(metrics_text))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

async fn metrics_text(State(state): State<Arc<Observability>>) -> impl IntoResponse {
    state.handle.render()
}

async fn health(State(state): State<Arc<Observability>>) -> impl IntoResponse {
    let mut owned: Vec<String> = state.owned_symbols.read().iter().cloned().collect();
    owned.sort();

    Json(serde_json::json!({
        "status": "ok",
        "node_id": state.node_id,
        "owned_symbols": owned,
        "uptime_sec": state.started_at.elapsed().as_secs(),
    }))
}

/// Serve the observability endpoints until the process exits.
pub async fn serve(state: Arc<Observability>, port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind metrics server on {addr}"))?;
    info!(addr = %addr, "metrics server listening");
    axum::serve(listener, router(state))
        .await
        .context("metrics server failed")
}
