// =============================================================================
// Analytics Engine — per-symbol state ownership, event routing, lifecycle
// =============================================================================
//
// The single long-lived object of the producer. All async tasks hold an
// `Arc<Engine>`:
//   - feed tasks route depth/trade events into per-symbol state,
//   - the fast/slow cycle loops build and publish reports,
//   - the coordination loops move symbols in and out of `owned`.
//
// Thread safety: every SymbolState sits behind its own Mutex, so
// mutation per symbol is serialized; ownership collections use RwLocks
// held only for short, non-awaiting sections; ownership TRANSITIONS are
// serialized by the controller's async Mutex.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ProducerConfig;
use crate::coordinator::assignment::{AssignmentController, OwnershipHooks};
use crate::coordinator::lease::LeaseManager;
use crate::coordinator::membership::NodeMembership;
use crate::engine::{cycles, loops};
use crate::feed;
use crate::kv::KvStore;
use crate::metrics;
use crate::report::schema::WriterMode;
use crate::state::SymbolState;
use crate::types::{TickerStats, TradeTick};

/// Writer token stamped when single-instance seeding cannot reach the
/// token counter.
const FALLBACK_WRITER_TOKEN: i64 = 1;

/// WebSocket tasks attached to one owned symbol.
struct FeedHandles {
    depth: JoinHandle<()>,
    trades: JoinHandle<()>,
}

impl FeedHandles {
    fn abort(&self) {
        self.depth.abort();
        self.trades.abort();
    }
}

pub struct Engine {
    pub config: ProducerConfig,
    pub(crate) kv: KvStore,
    pub(crate) lease: LeaseManager,
    pub(crate) mode: WriterMode,

    states: RwLock<HashMap<String, Arc<Mutex<SymbolState>>>>,
    owned: Arc<RwLock<HashSet<String>>>,
    writer_tokens: RwLock<HashMap<String, i64>>,
    tickers: RwLock<HashMap<String, TickerStats>>,
    feeds: Mutex<HashMap<String, FeedHandles>>,

    pub(crate) slow_cycle_running: AtomicBool,
    pub(crate) slow_cycle_skips: AtomicU64,

    membership: Option<Arc<NodeMembership>>,
    controller: Option<tokio::sync::Mutex<AssignmentController>>,

    background: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(config: ProducerConfig, kv: KvStore) -> Arc<Self> {
        let mode = if config.enable_coordination {
            WriterMode::Coordinated
        } else {
            WriterMode::Single
        };

        let lease = LeaseManager::new(kv.clone(), config.node_id.clone());

        let (membership, controller) = if config.enable_coordination {
            let hostname =
                std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
            let metrics_url =
                format!("http://{hostname}:{}/metrics", config.metrics_port);

            let membership = Arc::new(NodeMembership::new(
                kv.clone(),
                config.node_id.clone(),
                hostname,
                std::process::id(),
                metrics_url,
                config.membership_ttl_secs(),
            ));

            let controller = AssignmentController::new(
                membership.clone(),
                LeaseManager::new(kv.clone(), config.node_id.clone()),
                config.symbols.clone(),
                config.lease_ttl_ms,
                config.min_hold_ms,
                config.hrw_sticky_pct,
            );

            (Some(membership), Some(tokio::sync::Mutex::new(controller)))
        } else {
            (None, None)
        };

        Arc::new(Self {
            config,
            kv,
            lease,
            mode,
            states: RwLock::new(HashMap::new()),
            owned: Arc::new(RwLock::new(HashSet::new())),
            writer_tokens: RwLock::new(HashMap::new()),
            tickers: RwLock::new(HashMap::new()),
            feeds: Mutex::new(HashMap::new()),
            slow_cycle_running: AtomicBool::new(false),
            slow_cycle_skips: AtomicU64::new(0),
            membership,
            controller,
            background: Mutex::new(Vec::new()),
        })
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Start the engine: in coordinated mode the three coordination loops
    /// populate ownership incrementally; in single-instance mode every
    /// configured symbol is adopted immediately, with writer tokens
    /// seeded from the shared counter so fencing stays monotonic across
    /// mode switches against the same store.
    pub async fn start(self: &Arc<Self>) {
        if self.config.enable_coordination {
            info!(
                node_id = %self.config.node_id,
                symbols = self.config.symbols.len(),
                "coordinated mode: symbols will be acquired via HRW assignment"
            );
            let mut background = self.background.lock();
            background.push(tokio::spawn(loops::run_heartbeat_loop(self.clone())));
            background.push(tokio::spawn(loops::run_rebalance_loop(self.clone())));
            background.push(tokio::spawn(loops::run_lease_renewal_loop(self.clone())));
        } else {
            info!(
                node_id = %self.config.node_id,
                symbols = ?self.config.symbols,
                "single-instance mode: owning all configured symbols"
            );
            for symbol in self.config.symbols.clone() {
                let token = match self.lease.acquire(&symbol, self.config.lease_ttl_ms).await {
                    Some(token) => token,
                    None => {
                        warn!(symbol = %symbol, "writer_token_seed_failed, using fallback");
                        FALLBACK_WRITER_TOKEN
                    }
                };
                self.adopt_symbol(&symbol, token);
            }
            metrics::set_symbols_assigned(&self.config.node_id, self.owned_count());
        }

        let mut background = self.background.lock();
        background.push(tokio::spawn(cycles::run_fast_cycle_loop(self.clone())));
        background.push(tokio::spawn(cycles::run_slow_cycle_loop(self.clone())));
        background.push(tokio::spawn(feed::ticker::run_ticker_loop(self.clone())));

        info!(
            fast_cycle_ms = self.config.report_period_ms,
            slow_cycle_ms = self.config.slow_period_ms,
            owned_symbols = self.owned_count(),
            coordination = self.config.enable_coordination,
            "engine started"
        );
    }

    /// Stop everything: cancel loops, release leases within a bounded
    /// deadline, tear down feeds, clear state.
    pub async fn shutdown(self: &Arc<Self>) {
        info!("engine_stopping");

        for handle in self.background.lock().drain(..) {
            handle.abort();
        }

        if let Some(controller) = &self.controller {
            let hooks = EngineHooks(self.clone());
            let deadline = Duration::from_millis(self.config.lease_renewal_interval_ms());
            let release = async {
                controller.lock().await.release_all(&hooks).await;
            };
            if tokio::time::timeout(deadline, release).await.is_err() {
                warn!("lease_release_deadline_exceeded");
            }
        } else {
            for symbol in self.owned_symbol_list() {
                self.drop_symbol_local(&symbol);
                self.lease.release(&symbol).await;
            }
        }

        if let Some(membership) = &self.membership {
            if let Err(e) = membership.cleanup().await {
                error!(error = %e, "membership_cleanup_failed");
            }
        }

        for (_, handles) in self.feeds.lock().drain() {
            handles.abort();
        }
        self.states.write().clear();
        self.writer_tokens.write().clear();
        self.owned.write().clear();

        metrics::set_node_heartbeat(&self.config.node_id, false);
        metrics::set_symbols_assigned(&self.config.node_id, 0);
        info!("engine_stopped");
    }

    // ── Event ingestion (called from feed tasks) ────────────────────────

    /// Apply a top-20 depth snapshot. Events for symbols this node does
    /// not own are dropped.
    pub fn on_order_book_deltas(
        &self,
        symbol: &str,
        bids: &[(f64, f64)],
        asks: &[(f64, f64)],
        ts: DateTime<Utc>,
    ) {
        if !self.owns(symbol) {
            debug!(symbol = %symbol, "order_book_deltas_unowned_symbol");
            return;
        }
        if let Some(state) = self.state_for(symbol) {
            state.lock().apply_depth_snapshot(bids, asks, ts);
        }
    }

    /// Apply a trade tick. Events for unowned symbols are dropped.
    pub fn on_trade_tick(&self, symbol: &str, tick: TradeTick) {
        if !self.owns(symbol) {
            debug!(symbol = %symbol, "trade_tick_unowned_symbol");
            return;
        }
        if let Some(state) = self.state_for(symbol) {
            state.lock().add_trade(tick);
        }
    }

    pub fn update_ticker(&self, symbol: &str, stats: TickerStats) {
        self.tickers.write().insert(symbol.to_string(), stats);
    }

    // ── Ownership ───────────────────────────────────────────────────────

    pub fn owns(&self, symbol: &str) -> bool {
        self.owned.read().contains(symbol)
    }

    pub fn owned_symbol_list(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.owned.read().iter().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn owned_count(&self) -> usize {
        self.owned.read().len()
    }

    /// Handle for the /health endpoint: the same set the engine mutates.
    pub fn owned_symbols_shared(&self) -> Arc<RwLock<HashSet<String>>> {
        self.owned.clone()
    }

    pub(crate) fn writer_token(&self, symbol: &str) -> Option<i64> {
        self.writer_tokens.read().get(symbol).copied()
    }

    pub(crate) fn ticker_for(&self, symbol: &str) -> Option<TickerStats> {
        self.tickers.read().get(symbol).copied()
    }

    pub(crate) fn state_for(&self, symbol: &str) -> Option<Arc<Mutex<SymbolState>>> {
        self.states.read().get(symbol).cloned()
    }

    pub(crate) fn membership(&self) -> Option<&Arc<NodeMembership>> {
        self.membership.as_ref()
    }

    pub(crate) fn controller(&self) -> Option<&tokio::sync::Mutex<AssignmentController>> {
        self.controller.as_ref()
    }

    /// Take ownership of a symbol: record the fencing token, warm up (or
    /// reuse) its state, and attach the market-data feeds.
    pub(crate) fn adopt_symbol(self: &Arc<Self>, symbol: &str, token: i64) {
        {
            let mut states = self.states.write();
            // State objects survive drops so re-acquisition starts warm.
            states
                .entry(symbol.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(SymbolState::new(symbol))));
        }
        self.writer_tokens.write().insert(symbol.to_string(), token);
        self.owned.write().insert(symbol.to_string());

        self.spawn_feeds(symbol);
        metrics::inc_ws_resubscribe("symbol_acquired");
        metrics::set_symbols_assigned(&self.config.node_id, self.owned_count());

        info!(
            symbol = %symbol,
            writer_token = token,
            owned_symbols = self.owned_count(),
            "symbol_adopted"
        );
    }

    /// Drop local ownership: detach feeds and purge the token. Symbol
    /// state is retained for warm re-acquisition.
    pub(crate) fn drop_symbol_local(&self, symbol: &str) {
        if let Some(handles) = self.feeds.lock().remove(symbol) {
            handles.abort();
        }
        self.owned.write().remove(symbol);
        self.writer_tokens.write().remove(symbol);
        metrics::set_symbols_assigned(&self.config.node_id, self.owned_count());

        info!(
            symbol = %symbol,
            owned_symbols = self.owned_count(),
            "symbol_dropped"
        );
    }

    fn spawn_feeds(self: &Arc<Self>, symbol: &str) {
        let depth = {
            let engine = self.clone();
            let sym = symbol.to_string();
            tokio::spawn(async move {
                loop {
                    if let Err(e) = feed::depth::run_depth_stream(&sym, &engine).await {
                        error!(symbol = %sym, error = %e, "depth stream error, reconnecting in 5s");
                    }
                    metrics::inc_ws_resubscribe("disconnect");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            })
        };

        let trades = {
            let engine = self.clone();
            let sym = symbol.to_string();
            tokio::spawn(async move {
                loop {
                    if let Err(e) = feed::trades::run_trade_stream(&sym, &engine).await {
                        error!(symbol = %sym, error = %e, "trade stream error, reconnecting in 5s");
                    }
                    metrics::inc_ws_resubscribe("disconnect");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            })
        };

        if let Some(previous) = self
            .feeds
            .lock()
            .insert(symbol.to_string(), FeedHandles { depth, trades })
        {
            previous.abort();
        }
    }
}

/// Ownership hooks adapter: the controller calls back into the engine
/// through this so feed spawning can clone the `Arc`.
pub struct EngineHooks(pub Arc<Engine>);

impl OwnershipHooks for EngineHooks {
    fn on_symbol_acquired(&self, symbol: &str, token: i64) {
        self.0.adopt_symbol(symbol, token);
    }

    fn on_symbol_dropped(&self, symbol: &str) {
        self.0.drop_symbol_local(symbol);
    }
}
