// =============================================================================
// Symbol assignment controller — HRW planning plus lease-backed execution
// =============================================================================
//
// Planning is a pure function over the membership snapshot and local
// ownership, so it is unit-testable without a store. Execution acquires
// and releases leases; drop hooks always fire BEFORE the lease release so
// downstream observers see the symbol-dropped event while the lease is
// still held.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::coordinator::hrw::select_node;
use crate::coordinator::lease::LeaseManager;
use crate::coordinator::membership::NodeMembership;

/// Ownership lifecycle callbacks, implemented by the engine. Handlers
/// must be quick and non-blocking; they run inside the supervisor's
/// transition section.
pub trait OwnershipHooks: Send + Sync {
    fn on_symbol_acquired(&self, symbol: &str, token: i64);
    fn on_symbol_dropped(&self, symbol: &str);
}

/// Diff between desired and current ownership for one rebalance tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebalancePlan {
    pub acquire: Vec<String>,
    pub release: Vec<String>,
}

impl RebalancePlan {
    pub fn is_empty(&self) -> bool {
        self.acquire.is_empty() && self.release.is_empty()
    }
}

/// Compute this node's acquire/release lists for a membership snapshot.
///
/// Owned symbols get the sticky-owner bonus, and a symbol held for less
/// than `min_hold_ms` is never voluntarily released (flap damping near
/// hash ties).
pub fn plan_rebalance(
    symbols: &[String],
    active_nodes: &[String],
    node_id: &str,
    owned: &HashSet<String>,
    acquired_at: &HashMap<String, Instant>,
    min_hold_ms: u64,
    sticky_pct: f64,
    now: Instant,
) -> RebalancePlan {
    let mut desired: HashSet<String> = HashSet::new();

    for symbol in symbols {
        let currently_owned = owned.contains(symbol);

        if currently_owned {
            if let Some(&acquired) = acquired_at.get(symbol) {
                let held_ms = now.duration_since(acquired).as_millis() as u64;
                if held_ms < min_hold_ms {
                    desired.insert(symbol.clone());
                    continue;
                }
            }
        }

        let current_owner = currently_owned.then_some(node_id);
        if let Some(winner) = select_node(symbol, active_nodes, current_owner, sticky_pct) {
            if winner == node_id {
                desired.insert(symbol.clone());
            }
        }
    }

    let mut acquire: Vec<String> = desired.difference(owned).cloned().collect();
    let mut release: Vec<String> = owned.difference(&desired).cloned().collect();
    acquire.sort();
    release.sort();
    RebalancePlan { acquire, release }
}

/// Outcome counters from one rebalance execution.
#[derive(Debug, Clone, Copy, Default)]
pub struct RebalanceOutcome {
    pub acquired: usize,
    pub released: usize,
}

pub struct AssignmentController {
    membership: Arc<NodeMembership>,
    lease: LeaseManager,
    symbols: Vec<String>,
    lease_ttl_ms: u64,
    min_hold_ms: u64,
    sticky_pct: f64,

    owned: HashSet<String>,
    acquired_at: HashMap<String, Instant>,
}

impl AssignmentController {
    pub fn new(
        membership: Arc<NodeMembership>,
        lease: LeaseManager,
        symbols: Vec<String>,
        lease_ttl_ms: u64,
        min_hold_ms: u64,
        sticky_pct: f64,
    ) -> Self {
        info!(
            node_id = %membership.node_id,
            symbols = symbols.len(),
            lease_ttl_ms,
            "assignment_controller_initialized"
        );
        Self {
            membership,
            lease,
            symbols,
            lease_ttl_ms,
            min_hold_ms,
            sticky_pct,
            owned: HashSet::new(),
            acquired_at: HashMap::new(),
        }
    }

    /// One rebalance tick: discover peers, plan, then execute the diff.
    pub async fn rebalance(&mut self, hooks: &dyn OwnershipHooks) -> RebalanceOutcome {
        let active_nodes = self.membership.active_node_ids().await;
        if active_nodes.is_empty() {
            warn!("rebalance_no_active_nodes");
            return RebalanceOutcome::default();
        }

        let plan = plan_rebalance(
            &self.symbols,
            &active_nodes,
            &self.membership.node_id,
            &self.owned,
            &self.acquired_at,
            self.min_hold_ms,
            self.sticky_pct,
            Instant::now(),
        );

        let mut outcome = RebalanceOutcome::default();

        for symbol in &plan.release {
            self.drop_symbol(symbol, hooks).await;
            outcome.released += 1;
        }

        for symbol in &plan.acquire {
            if self.acquire_symbol(symbol, hooks).await {
                outcome.acquired += 1;
            }
        }

        debug!(
            owned = self.owned.len(),
            acquired = outcome.acquired,
            released = outcome.released,
            "rebalance_complete"
        );
        outcome
    }

    /// Renew every owned lease; a denied renewal means ownership was lost
    /// and the symbol is dropped locally before the next rebalance can
    /// re-acquire it. Returns the number of leases lost.
    pub async fn renew_leases(&mut self, hooks: &dyn OwnershipHooks) -> usize {
        let mut lost = 0;
        for symbol in self.owned.iter().cloned().collect::<Vec<_>>() {
            if !self.lease.renew(&symbol, self.lease_ttl_ms).await {
                warn!(symbol = %symbol, reason = "renewal_failed", "lease_lost");
                self.drop_symbol(&symbol, hooks).await;
                lost += 1;
            }
        }
        lost
    }

    /// Release every owned symbol (shutdown path).
    pub async fn release_all(&mut self, hooks: &dyn OwnershipHooks) {
        info!(owned = self.owned.len(), "assignment_controller_cleanup_start");
        for symbol in self.owned.iter().cloned().collect::<Vec<_>>() {
            self.drop_symbol(&symbol, hooks).await;
        }
    }

    async fn acquire_symbol(&mut self, symbol: &str, hooks: &dyn OwnershipHooks) -> bool {
        match self.lease.acquire(symbol, self.lease_ttl_ms).await {
            Some(token) => {
                self.owned.insert(symbol.to_string());
                self.acquired_at.insert(symbol.to_string(), Instant::now());
                info!(symbol = %symbol, token, node_id = %self.membership.node_id, "symbol_acquired");
                hooks.on_symbol_acquired(symbol, token);
                true
            }
            None => {
                debug!(symbol = %symbol, "symbol_acquisition_denied");
                false
            }
        }
    }

    async fn drop_symbol(&mut self, symbol: &str, hooks: &dyn OwnershipHooks) {
        // Observers see the drop while the lease is still held.
        hooks.on_symbol_dropped(symbol);

        self.lease.release(symbol).await;

        self.owned.remove(symbol);
        self.acquired_at.remove(symbol);
        info!(symbol = %symbol, node_id = %self.membership.node_id, "symbol_released");
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn symbols(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("SYM{i}USDT")).collect()
    }

    #[test]
    fn single_node_plans_to_own_everything() {
        let syms = symbols(10);
        let plan = plan_rebalance(
            &syms,
            &strings(&["a"]),
            "a",
            &HashSet::new(),
            &HashMap::new(),
            2000,
            0.02,
            Instant::now(),
        );
        assert_eq!(plan.acquire.len(), 10);
        assert!(plan.release.is_empty());
    }

    #[test]
    fn steady_state_plans_nothing() {
        let syms = symbols(10);
        let owned: HashSet<String> = syms.iter().cloned().collect();
        let acquired_at: HashMap<String, Instant> = syms
            .iter()
            .map(|s| (s.clone(), Instant::now()))
            .collect();

        let plan = plan_rebalance(
            &syms,
            &strings(&["a"]),
            "a",
            &owned,
            &acquired_at,
            2000,
            0.02,
            Instant::now(),
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn min_hold_prevents_voluntary_release() {
        let syms = symbols(40);
        // Own everything as "a"; then "b" joins. Within min-hold nothing
        // is released.
        let owned: HashSet<String> = syms.iter().cloned().collect();
        let now = Instant::now();
        let acquired_at: HashMap<String, Instant> =
            syms.iter().map(|s| (s.clone(), now)).collect();

        let plan = plan_rebalance(
            &syms,
            &strings(&["a", "b"]),
            "a",
            &owned,
            &acquired_at,
            2000,
            0.02,
            now + Duration::from_millis(100),
        );
        assert!(plan.release.is_empty());

        // After min-hold expires, HRW takes over and some symbols move.
        let plan = plan_rebalance(
            &syms,
            &strings(&["a", "b"]),
            "a",
            &owned,
            &acquired_at,
            2000,
            0.02,
            now + Duration::from_millis(5000),
        );
        assert!(!plan.release.is_empty(), "expected some symbols to move to b");
        assert!(plan.release.len() < syms.len(), "sticky owner should retain most");
    }

    #[test]
    fn unowned_symbols_not_released() {
        let syms = symbols(20);
        let plan = plan_rebalance(
            &syms,
            &strings(&["a", "b"]),
            "a",
            &HashSet::new(),
            &HashMap::new(),
            2000,
            0.02,
            Instant::now(),
        );
        assert!(plan.release.is_empty());
        // Acquire only the HRW-won subset.
        assert!(!plan.acquire.is_empty());
        assert!(plan.acquire.len() < syms.len());
    }

    #[test]
    fn no_nodes_plans_nothing() {
        let syms = symbols(5);
        let owned: HashSet<String> = syms.iter().cloned().collect();
        let plan = plan_rebalance(
            &syms,
            &[],
            "a",
            &owned,
            &HashMap::new(),
            2000,
            0.02,
            Instant::now(),
        );
        assert!(plan.acquire.is_empty());
        // With no live nodes there is no winner, so owned symbols drain.
        assert_eq!(plan.release.len(), 5);
    }

    #[test]
    fn plan_is_deterministic_and_sorted() {
        let syms = symbols(30);
        let a = plan_rebalance(
            &syms,
            &strings(&["a", "b", "c"]),
            "b",
            &HashSet::new(),
            &HashMap::new(),
            2000,
            0.02,
            Instant::now(),
        );
        let b = plan_rebalance(
            &syms,
            &strings(&["a", "b", "c"]),
            "b",
            &HashSet::new(),
            &HashMap::new(),
            2000,
            0.02,
            Instant::now(),
        );
        assert_eq!(a, b);
        let mut sorted = a.acquire.clone();
        sorted.sort();
        assert_eq!(a.acquire, sorted);
    }

    #[test]
    fn two_node_plans_partition_symbols() {
        let syms = symbols(50);
        let plan_a = plan_rebalance(
            &syms,
            &strings(&["a", "b"]),
            "a",
            &HashSet::new(),
            &HashMap::new(),
            2000,
            0.0,
            Instant::now(),
        );
        let plan_b = plan_rebalance(
            &syms,
            &strings(&["a", "b"]),
            "b",
            &HashSet::new(),
            &HashMap::new(),
            2000,
            0.0,
            Instant::now(),
        );

        let set_a: HashSet<_> = plan_a.acquire.iter().collect();
        let set_b: HashSet<_> = plan_b.acquire.iter().collect();
        assert!(set_a.is_disjoint(&set_b));
        assert_eq!(set_a.len() + set_b.len(), syms.len());
    }
}
