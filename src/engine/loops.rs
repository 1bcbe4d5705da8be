// =============================================================================
// Coordination loops — heartbeat, HRW rebalance, lease renewal
// =============================================================================
//
// Each loop sleeps its interval with ±10% jitter so a fleet started from
// one deploy does not hammer the store in lockstep. Ownership transitions
// go through the controller's async mutex, so a rebalance and a renewal
// can never race on the same symbol.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info};

use crate::engine::{Engine, EngineHooks};
use crate::metrics;

/// Initial delay before the first rebalance so the first heartbeat can
/// establish membership.
const REBALANCE_WARMUP: Duration = Duration::from_millis(500);

fn jittered(base: Duration) -> Duration {
    let jitter: f64 = rand::thread_rng().gen_range(-0.1..0.1);
    base.mul_f64(1.0 + jitter)
}

pub async fn run_heartbeat_loop(engine: Arc<Engine>) {
    info!("heartbeat_loop_started");
    let base = Duration::from_secs_f64(engine.config.heartbeat_interval_sec);

    loop {
        if let Some(membership) = engine.membership() {
            match membership.heartbeat().await {
                Ok(()) => metrics::set_node_heartbeat(&engine.config.node_id, true),
                Err(e) => error!(error = %e, "heartbeat_failed"),
            }
        }
        tokio::time::sleep(jittered(base)).await;
    }
}

pub async fn run_rebalance_loop(engine: Arc<Engine>) {
    info!("rebalance_loop_started");
    tokio::time::sleep(REBALANCE_WARMUP).await;

    let base = Duration::from_secs_f64(engine.config.rebalance_interval_sec);
    let hooks = EngineHooks(engine.clone());

    loop {
        if let Some(controller) = engine.controller() {
            let outcome = controller.lock().await.rebalance(&hooks).await;

            if outcome.acquired > 0 || outcome.released > 0 {
                metrics::inc_rebalances();
                info!(
                    acquired = outcome.acquired,
                    released = outcome.released,
                    total_owned = engine.owned_count(),
                    "rebalance_triggered"
                );
            }
        }
        tokio::time::sleep(jittered(base)).await;
    }
}

pub async fn run_lease_renewal_loop(engine: Arc<Engine>) {
    info!("lease_renewal_loop_started");
    let base = Duration::from_millis(engine.config.lease_renewal_interval_ms());
    let hooks = EngineHooks(engine.clone());

    loop {
        if let Some(controller) = engine.controller() {
            let lost = controller.lock().await.renew_leases(&hooks).await;
            for _ in 0..lost {
                metrics::inc_lease_conflicts();
            }
        }
        tokio::time::sleep(jittered(base)).await;
    }
}
