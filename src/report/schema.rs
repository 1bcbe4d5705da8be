// =============================================================================
// Market report schema v1.1 — the JSON envelope published per symbol
// =============================================================================
//
// Field order matters for the byte-stable round-trip guarantee: serde
// serializes struct fields in declaration order, so re-publishing an
// unchanged report produces identical bytes.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::calc::anomaly::Anomaly;
use crate::calc::health::MarketStatus;
use crate::calc::liquidity::{LiquidityVacuum, LiquidityWall};
use crate::calc::profile::VolumeProfile;
use crate::types::PriceQty;

pub const SCHEMA_VERSION: &str = "1.1";

/// Which coordination mode stamped this report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterMode {
    Single,
    Coordinated,
}

/// Identity of the producing node, with its fencing token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterInfo {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "writerToken")]
    pub writer_token: i64,
    pub mode: WriterMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionInfo {
    pub status: MarketStatus,
    /// RFC3339 UTC instant of the last ingested event.
    pub last_update: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthBlock {
    pub top20_bid: Vec<PriceQty>,
    pub top20_ask: Vec<PriceQty>,
    pub sum_bid: f64,
    pub sum_ask: f64,
    pub imbalance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowBlock {
    pub orders_per_sec: f64,
    pub net_flow: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthComponents {
    pub spread: f64,
    pub depth: f64,
    pub balance: f64,
    pub flow: f64,
    pub anomalies: f64,
    pub freshness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthBlock {
    pub status: MarketStatus,
    pub score: i64,
    pub components: HealthComponents,
    pub issues: Vec<String>,
}

/// Slow-cycle analytics attached by enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_profile: Option<VolumeProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub walls: Option<Vec<LiquidityWall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vacuums: Option<Vec<LiquidityVacuum>>,
}

/// The complete per-symbol report, fast-cycle fields first, slow-cycle
/// enrichment fields optional at the tail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketReport {
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    pub writer: WriterInfo,
    /// Unix milliseconds of report generation.
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
    pub symbol: String,
    pub venue: String,
    /// RFC3339 UTC with trailing Z.
    pub generated_at: String,
    pub data_age_ms: i64,
    pub ingestion: IngestionInfo,

    pub last_price: f64,
    pub change_24h_pct: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub volume_24h: f64,

    pub best_bid: PriceQty,
    pub best_ask: PriceQty,
    pub spread_bps: f64,
    pub mid_price: f64,
    pub micro_price: f64,

    pub depth: DepthBlock,
    pub flow: FlowBlock,
    pub health: HealthBlock,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<AnalyticsBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<LiquidityBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomalies: Option<Vec<Anomaly>>,
    /// Unix milliseconds of the last slow-cycle enrichment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_cycle_updated_at: Option<i64>,
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_report() -> MarketReport {
        MarketReport {
            schema_version: SCHEMA_VERSION.to_string(),
            writer: WriterInfo {
                node_id: "host-1".to_string(),
                writer_token: 7,
                mode: WriterMode::Coordinated,
            },
            updated_at: 1_700_000_000_000,
            symbol: "BTCUSDT".to_string(),
            venue: "BINANCE".to_string(),
            generated_at: "2024-01-01T00:00:00Z".to_string(),
            data_age_ms: 12,
            ingestion: IngestionInfo {
                status: MarketStatus::Ok,
                last_update: "2024-01-01T00:00:00Z".to_string(),
            },
            last_price: 100.0,
            change_24h_pct: 0.0,
            high_24h: 100.0,
            low_24h: 100.0,
            volume_24h: 0.0,
            best_bid: PriceQty { price: 100.0, qty: 1.0 },
            best_ask: PriceQty { price: 100.5, qty: 2.0 },
            spread_bps: 49.8753,
            mid_price: 100.25,
            micro_price: 100.16666667,
            depth: DepthBlock {
                top20_bid: vec![PriceQty { price: 100.0, qty: 1.0 }],
                top20_ask: vec![PriceQty { price: 100.5, qty: 2.0 }],
                sum_bid: 1.0,
                sum_ask: 2.0,
                imbalance: -0.3333,
            },
            flow: FlowBlock { orders_per_sec: 0.0, net_flow: 0.0 },
            health: HealthBlock {
                status: MarketStatus::Degraded,
                score: 90,
                components: HealthComponents {
                    spread: 0.0,
                    depth: 0.0,
                    balance: 0.0,
                    flow: 0.0,
                    anomalies: 0.0,
                    freshness: 90.0,
                },
                issues: vec!["moderate_imbalance".to_string()],
            },
            analytics: None,
            liquidity: None,
            anomalies: None,
            slow_cycle_updated_at: None,
        }
    }

    #[test]
    fn json_uses_v11_field_names() {
        let json = serde_json::to_value(minimal_report()).unwrap();
        assert_eq!(json["schemaVersion"], "1.1");
        assert_eq!(json["writer"]["nodeId"], "host-1");
        assert_eq!(json["writer"]["writerToken"], 7);
        assert_eq!(json["writer"]["mode"], "coordinated");
        assert_eq!(json["updatedAt"], 1_700_000_000_000i64);
        assert_eq!(json["depth"]["sum_ask"], 2.0);
        assert_eq!(json["ingestion"]["status"], "ok");
    }

    #[test]
    fn optional_blocks_absent_until_enriched() {
        let json = serde_json::to_value(minimal_report()).unwrap();
        assert!(json.get("analytics").is_none());
        assert!(json.get("liquidity").is_none());
        assert!(json.get("anomalies").is_none());
        assert!(json.get("slow_cycle_updated_at").is_none());
    }

    #[test]
    fn round_trip_is_byte_stable() {
        let report = minimal_report();
        let first = serde_json::to_string(&report).unwrap();
        let parsed: MarketReport = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string(&parsed).unwrap();
        assert_eq!(first, second);
        assert_eq!(report, parsed);
    }
}
