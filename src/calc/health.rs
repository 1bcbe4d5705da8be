// =============================================================================
// Market health score — freshness, spread quality, balance, anomalies
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::calc::round_to;

/// Derived freshness indicator published in the report's ingestion block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Ok,
    Degraded,
    Down,
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Degraded => write!(f, "degraded"),
            Self::Down => write!(f, "down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthScore {
    pub status: MarketStatus,
    /// Overall score in [0, 100].
    pub score: f64,
    /// Machine-readable tags for every penalty applied.
    pub issues: Vec<&'static str>,
}

/// Score market health on a 100-point scale.
///
/// Deductions: 40 for missing/stale data (> 2000 ms) or 20 for degraded
/// freshness (1000-2000 ms); 30 for no spread or spread > 100 bps, 15 for
/// 50-100 bps; 20 for |imbalance| >= 0.6, 10 for >= 0.3; 10 when any
/// anomalies are present. Status is `down` on stale/no data, `degraded`
/// when any other penalty applied, `ok` otherwise.
pub fn health_score(
    data_age_ms: Option<i64>,
    spread_bps: Option<f64>,
    imbalance: Option<f64>,
    has_anomalies: bool,
) -> HealthScore {
    let mut score: f64 = 100.0;
    let mut issues: Vec<&'static str> = Vec::new();
    let mut down = false;

    // Freshness (40 points).
    match data_age_ms {
        None => {
            score -= 40.0;
            issues.push("no_data");
            down = true;
        }
        Some(age) if age > 2000 => {
            score -= 40.0;
            issues.push("stale_data");
            down = true;
        }
        Some(age) if age > 1000 => {
            score -= 20.0;
            issues.push("degraded_freshness");
        }
        Some(_) => {}
    }

    // Spread quality (30 points).
    match spread_bps {
        None => {
            score -= 30.0;
            issues.push("no_spread");
        }
        Some(bps) if bps > 100.0 => {
            score -= 30.0;
            issues.push("wide_spread");
        }
        Some(bps) if bps > 50.0 => {
            score -= 15.0;
            issues.push("moderate_spread");
        }
        Some(_) => {}
    }

    // Depth balance (20 points).
    if let Some(imb) = imbalance {
        let abs = imb.abs();
        if abs >= 0.6 {
            score -= 20.0;
            issues.push("severe_imbalance");
        } else if abs >= 0.3 {
            score -= 10.0;
            issues.push("moderate_imbalance");
        }
    }

    // Anomalies (10 points).
    if has_anomalies {
        score -= 10.0;
        issues.push("anomalies_detected");
    }

    let status = if down {
        MarketStatus::Down
    } else if !issues.is_empty() {
        MarketStatus::Degraded
    } else {
        MarketStatus::Ok
    };

    HealthScore {
        status,
        score: round_to(score.clamp(0.0, 100.0), 1),
        issues,
    }
}

/// Freshness-only status for the report's ingestion block.
pub fn ingestion_status(data_age_ms: i64) -> MarketStatus {
    if data_age_ms > 2000 {
        MarketStatus::Down
    } else if data_age_ms > 1000 {
        MarketStatus::Degraded
    } else {
        MarketStatus::Ok
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_inputs_score_100_ok() {
        let h = health_score(Some(50), Some(2.0), Some(0.05), false);
        assert_eq!(h.score, 100.0);
        assert_eq!(h.status, MarketStatus::Ok);
        assert!(h.issues.is_empty());
    }

    #[test]
    fn stale_data_alone_is_down_at_60() {
        let h = health_score(Some(2500), Some(2.0), Some(0.0), false);
        assert_eq!(h.score, 60.0);
        assert_eq!(h.status, MarketStatus::Down);
        assert_eq!(h.issues, vec!["stale_data"]);
    }

    #[test]
    fn no_data_is_down() {
        let h = health_score(None, None, None, false);
        assert_eq!(h.status, MarketStatus::Down);
        assert_eq!(h.score, 30.0); // -40 no_data, -30 no_spread
        assert!(h.issues.contains(&"no_data"));
        assert!(h.issues.contains(&"no_spread"));
    }

    #[test]
    fn wide_spread_with_fresh_data_degrades_to_70() {
        let h = health_score(Some(500), Some(120.0), Some(0.0), false);
        assert_eq!(h.score, 70.0);
        assert_eq!(h.status, MarketStatus::Degraded);
        assert_eq!(h.issues, vec!["wide_spread"]);
    }

    #[test]
    fn moderate_spread_penalty_is_15() {
        let h = health_score(Some(100), Some(75.0), Some(0.0), false);
        assert_eq!(h.score, 85.0);
        assert_eq!(h.status, MarketStatus::Degraded);
    }

    #[test]
    fn spread_boundary_values() {
        // Exactly 50 and exactly 100 do not trip the next tier.
        assert_eq!(health_score(Some(10), Some(50.0), None, false).score, 100.0);
        assert_eq!(health_score(Some(10), Some(100.0), None, false).score, 85.0);
    }

    #[test]
    fn moderate_imbalance_degrades() {
        let h = health_score(Some(100), Some(2.0), Some(-0.3333), false);
        assert_eq!(h.score, 90.0);
        assert_eq!(h.status, MarketStatus::Degraded);
        assert_eq!(h.issues, vec!["moderate_imbalance"]);
    }

    #[test]
    fn severe_imbalance_penalty_is_20() {
        let h = health_score(Some(100), Some(2.0), Some(0.75), false);
        assert_eq!(h.score, 80.0);
        assert!(h.issues.contains(&"severe_imbalance"));
    }

    #[test]
    fn anomalies_subtract_10() {
        let h = health_score(Some(100), Some(2.0), Some(0.0), true);
        assert_eq!(h.score, 90.0);
        assert_eq!(h.status, MarketStatus::Degraded);
    }

    #[test]
    fn degraded_freshness_intermediate_penalty() {
        let h = health_score(Some(1500), Some(2.0), Some(0.0), false);
        assert_eq!(h.score, 80.0);
        assert_eq!(h.status, MarketStatus::Degraded);
        assert_eq!(h.issues, vec!["degraded_freshness"]);
    }

    #[test]
    fn score_clamped_to_zero() {
        let h = health_score(None, None, Some(0.9), true);
        // -40 -30 -20 -10 = 0
        assert_eq!(h.score, 0.0);
        assert_eq!(h.status, MarketStatus::Down);
    }

    #[test]
    fn ingestion_status_thresholds() {
        assert_eq!(ingestion_status(500), MarketStatus::Ok);
        assert_eq!(ingestion_status(1000), MarketStatus::Ok);
        assert_eq!(ingestion_status(1500), MarketStatus::Degraded);
        assert_eq!(ingestion_status(2000), MarketStatus::Degraded);
        assert_eq!(ingestion_status(2500), MarketStatus::Down);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&MarketStatus::Down).unwrap(), "\"down\"");
    }
}
