// =============================================================================
// Producer Configuration — env-driven settings validated at startup
// =============================================================================
//
// Every knob is read from the environment (with a PULSE_ prefix) so the
// same binary can run single-instance on a laptop or coordinated in a
// fleet. Validation is fatal: a producer with a bad config must refuse
// to start rather than publish garbage.
// =============================================================================

use anyhow::{bail, Result};
use tracing::info;

/// Fast-cycle period bounds (milliseconds).
const REPORT_PERIOD_MIN_MS: u64 = 100;
const REPORT_PERIOD_MAX_MS: u64 = 1_000;
/// Slow-cycle floor (milliseconds).
const SLOW_PERIOD_MIN_MS: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    // --- Symbols & venue -----------------------------------------------------
    /// Symbol universe this fleet shards across.
    pub symbols: Vec<String>,
    /// Quote-currency suffix every symbol must carry.
    pub quote_suffix: String,
    pub venue: String,

    // --- KV store ------------------------------------------------------------
    pub kv_url: String,
    pub kv_password: Option<String>,

    // --- Cycles --------------------------------------------------------------
    /// Fast cycle period; must be 100-1000 ms.
    pub report_period_ms: u64,
    /// Slow cycle period; must be >= 1000 ms.
    pub slow_period_ms: u64,

    // --- Coordination --------------------------------------------------------
    /// Off => single-instance mode owning every configured symbol.
    pub enable_coordination: bool,
    pub heartbeat_interval_sec: f64,
    pub rebalance_interval_sec: f64,
    /// Lease TTL; must be >= 2x the fast period so a publish can never
    /// straddle a whole lease lifetime.
    pub lease_ttl_ms: u64,
    /// Minimum hold after acquisition before a voluntary release.
    pub min_hold_ms: u64,
    /// Sticky-owner bonus for HRW; must be in [0, 0.1].
    pub hrw_sticky_pct: f64,
    /// Unique node identity; defaults to `<hostname>-<pid>`.
    pub node_id: String,

    // --- Observability & analytics -------------------------------------------
    pub metrics_port: u16,
    /// Price increment for volume-profile binning.
    pub tick_size: f64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

fn default_node_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{host}-{}", std::process::id())
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            quote_suffix: "USDT".to_string(),
            venue: "BINANCE".to_string(),
            kv_url: "redis://localhost:6379".to_string(),
            kv_password: None,
            report_period_ms: 250,
            slow_period_ms: 2_000,
            enable_coordination: false,
            heartbeat_interval_sec: 1.0,
            rebalance_interval_sec: 2.5,
            lease_ttl_ms: 2_000,
            min_hold_ms: 2_000,
            hrw_sticky_pct: 0.02,
            node_id: default_node_id(),
            metrics_port: 9101,
            tick_size: 0.01,
        }
    }
}

impl ProducerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults field by field.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let symbols: Vec<String> = env_or("PULSE_SYMBOLS", "BTCUSDT,ETHUSDT")
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let kv_password = std::env::var("PULSE_KV_PASSWORD")
            .ok()
            .filter(|p| !p.is_empty());

        let config = Self {
            symbols,
            quote_suffix: env_or("PULSE_QUOTE_SUFFIX", &defaults.quote_suffix),
            venue: env_or("PULSE_VENUE", &defaults.venue),
            kv_url: env_or("PULSE_KV_URL", &defaults.kv_url),
            kv_password,
            report_period_ms: env_parse("PULSE_REPORT_PERIOD_MS", defaults.report_period_ms),
            slow_period_ms: env_parse("PULSE_SLOW_PERIOD_MS", defaults.slow_period_ms),
            enable_coordination: env_parse("PULSE_ENABLE_COORDINATION", false),
            heartbeat_interval_sec: env_parse(
                "PULSE_HEARTBEAT_INTERVAL_SEC",
                defaults.heartbeat_interval_sec,
            ),
            rebalance_interval_sec: env_parse(
                "PULSE_REBALANCE_INTERVAL_SEC",
                defaults.rebalance_interval_sec,
            ),
            lease_ttl_ms: env_parse("PULSE_LEASE_TTL_MS", defaults.lease_ttl_ms),
            min_hold_ms: env_parse("PULSE_MIN_HOLD_MS", defaults.min_hold_ms),
            hrw_sticky_pct: env_parse("PULSE_HRW_STICKY_PCT", defaults.hrw_sticky_pct),
            node_id: env_or("PULSE_NODE_ID", &default_node_id()),
            metrics_port: env_parse("PULSE_METRICS_PORT", defaults.metrics_port),
            tick_size: env_parse("PULSE_TICK_SIZE", defaults.tick_size),
        };

        info!(
            symbols = ?config.symbols,
            node_id = %config.node_id,
            coordination = config.enable_coordination,
            report_period_ms = config.report_period_ms,
            "configuration loaded"
        );
        config
    }

    /// Reject configurations the producer must not start with.
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("at least one symbol must be configured");
        }
        for symbol in &self.symbols {
            if !is_valid_symbol(symbol, &self.quote_suffix) {
                bail!(
                    "symbol {symbol} must match ^[A-Z0-9]+{}$",
                    self.quote_suffix
                );
            }
        }

        if !(REPORT_PERIOD_MIN_MS..=REPORT_PERIOD_MAX_MS).contains(&self.report_period_ms) {
            bail!(
                "report_period_ms {} outside {REPORT_PERIOD_MIN_MS}-{REPORT_PERIOD_MAX_MS}",
                self.report_period_ms
            );
        }
        if self.slow_period_ms < SLOW_PERIOD_MIN_MS {
            bail!("slow_period_ms {} below {SLOW_PERIOD_MIN_MS}", self.slow_period_ms);
        }

        if self.lease_ttl_ms < 2 * self.report_period_ms {
            bail!(
                "lease_ttl_ms {} must be >= 2x report_period_ms {}",
                self.lease_ttl_ms,
                self.report_period_ms
            );
        }
        if !(0.0..=0.1).contains(&self.hrw_sticky_pct) {
            bail!("hrw_sticky_pct {} outside [0, 0.1]", self.hrw_sticky_pct);
        }
        if self.heartbeat_interval_sec <= 0.0 || self.rebalance_interval_sec <= 0.0 {
            bail!("heartbeat and rebalance intervals must be positive");
        }
        if self.enable_coordination && self.node_id.is_empty() {
            bail!("node_id is required when coordination is enabled");
        }
        if self.tick_size <= 0.0 {
            bail!("tick_size must be positive");
        }

        Ok(())
    }

    /// Membership TTL: five missed heartbeats mark a node dead.
    pub fn membership_ttl_secs(&self) -> u64 {
        (self.heartbeat_interval_sec * 5.0).ceil() as u64
    }

    /// Lease renewal cadence.
    pub fn lease_renewal_interval_ms(&self) -> u64 {
        self.lease_ttl_ms / 2
    }
}

fn is_valid_symbol(symbol: &str, quote_suffix: &str) -> bool {
    symbol.len() > quote_suffix.len()
        && symbol.ends_with(quote_suffix)
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ProducerConfig::default().validate().is_ok());
    }

    #[test]
    fn default_values() {
        let cfg = ProducerConfig::default();
        assert_eq!(cfg.report_period_ms, 250);
        assert_eq!(cfg.slow_period_ms, 2_000);
        assert!(!cfg.enable_coordination);
        assert_eq!(cfg.lease_ttl_ms, 2_000);
        assert_eq!(cfg.min_hold_ms, 2_000);
        assert_eq!(cfg.hrw_sticky_pct, 0.02);
        assert_eq!(cfg.membership_ttl_secs(), 5);
        assert_eq!(cfg.lease_renewal_interval_ms(), 1_000);
    }

    #[test]
    fn symbol_validation() {
        assert!(is_valid_symbol("BTCUSDT", "USDT"));
        assert!(is_valid_symbol("1000PEPEUSDT", "USDT"));
        assert!(!is_valid_symbol("USDT", "USDT")); // base part required
        assert!(!is_valid_symbol("BTCUSD", "USDT"));
        assert!(!is_valid_symbol("btcusdt", "USDT"));
        assert!(!is_valid_symbol("BTC-USDT", "USDT"));
    }

    #[test]
    fn empty_symbols_rejected() {
        let cfg = ProducerConfig {
            symbols: vec![],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn report_period_bounds_enforced() {
        let mut cfg = ProducerConfig::default();
        cfg.report_period_ms = 50;
        assert!(cfg.validate().is_err());
        cfg.report_period_ms = 1_500;
        assert!(cfg.validate().is_err());
        cfg.report_period_ms = 100;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn lease_ttl_must_cover_two_fast_periods() {
        let mut cfg = ProducerConfig::default();
        cfg.report_period_ms = 1_000;
        cfg.lease_ttl_ms = 1_500;
        assert!(cfg.validate().is_err());
        cfg.lease_ttl_ms = 2_000;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn sticky_pct_bounds_enforced() {
        let mut cfg = ProducerConfig::default();
        cfg.hrw_sticky_pct = 0.2;
        assert!(cfg.validate().is_err());
        cfg.hrw_sticky_pct = -0.01;
        assert!(cfg.validate().is_err());
        cfg.hrw_sticky_pct = 0.1;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn slow_period_floor_enforced() {
        let mut cfg = ProducerConfig::default();
        cfg.slow_period_ms = 500;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn node_id_default_includes_pid() {
        let cfg = ProducerConfig::default();
        assert!(cfg.node_id.ends_with(&std::process::id().to_string()));
    }
}
