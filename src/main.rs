// =============================================================================
// Aurora Pulse — Main Entry Point
// =============================================================================
//
// Distributed market-analytics producer: each process heartbeats into the
// shared KV store, shards the symbol universe via rendezvous hashing with
// fenced writer leases, and publishes per-symbol analytics reports on a
// fast (~250 ms) and a slow (~2 s) cycle.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod calc;
mod config;
mod coordinator;
mod engine;
mod feed;
mod kv;
mod metrics;
mod report;
mod state;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ProducerConfig;
use crate::engine::Engine;
use crate::kv::KvStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Aurora Pulse — Market Analytics Producer          ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config = ProducerConfig::from_env();
    if let Err(e) = config.validate() {
        error!(error = %e, "configuration invalid, refusing to start");
        std::process::exit(1);
    }

    // ── 2. Metrics recorder ──────────────────────────────────────────────
    let prometheus = metrics::install_recorder()?;
    metrics::set_node_heartbeat(&config.node_id, true);
    metrics::set_symbols_assigned(&config.node_id, 0);

    // ── 3. Shared KV store ───────────────────────────────────────────────
    let kv = KvStore::connect(&config.kv_url, config.kv_password.as_deref()).await?;

    // ── 4. Engine ────────────────────────────────────────────────────────
    let metrics_port = config.metrics_port;
    let node_id = config.node_id.clone();
    let engine = Engine::new(config, kv);

    // ── 5. Observability server (/metrics + /health) ─────────────────────
    let observability = Arc::new(metrics::Observability {
        handle: prometheus,
        node_id,
        owned_symbols: engine.owned_symbols_shared(),
        started_at: std::time::Instant::now(),
    });
    tokio::spawn(async move {
        if let Err(e) = metrics::serve(observability, metrics_port).await {
            error!(error = %e, "metrics server failed");
        }
    });

    // ── 6. Start the engine ──────────────────────────────────────────────
    engine.start().await;
    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 7. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, stopping gracefully");

    engine.shutdown().await;

    info!("Aurora Pulse shut down complete.");
    Ok(())
}
