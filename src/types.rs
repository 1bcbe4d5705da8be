// =============================================================================
// Shared types used across the Aurora Pulse analytics producer
// =============================================================================

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A price level: price and resting quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQty {
    pub price: f64,
    pub qty: f64,
}

impl PriceQty {
    /// Construct a validated level. Both price and quantity must be
    /// strictly positive; qty=0 "remove" markers never become a `PriceQty`.
    pub fn new(price: f64, qty: f64) -> Result<Self> {
        if price <= 0.0 || !price.is_finite() {
            bail!("price must be positive, got {price}");
        }
        if qty <= 0.0 || !qty.is_finite() {
            bail!("quantity must be positive, got {qty}");
        }
        Ok(Self { price, qty })
    }
}

/// Which side of the trade crossed the spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggressorSide {
    Buy,
    Sell,
}

impl std::fmt::Display for AggressorSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// A single executed trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeTick {
    pub ts: DateTime<Utc>,
    pub price: f64,
    /// Base-currency quantity.
    pub volume: f64,
    pub aggressor: AggressorSide,
}

impl TradeTick {
    pub fn new(ts: DateTime<Utc>, price: f64, volume: f64, aggressor: AggressorSide) -> Result<Self> {
        if price <= 0.0 || !price.is_finite() {
            bail!("trade price must be positive, got {price}");
        }
        if volume <= 0.0 || !volume.is_finite() {
            bail!("trade volume must be positive, got {volume}");
        }
        Ok(Self {
            ts,
            price,
            volume,
            aggressor,
        })
    }
}

/// Order book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookSide {
    Bid,
    Ask,
}

impl std::fmt::Display for BookSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bid => write!(f, "bid"),
            Self::Ask => write!(f, "ask"),
        }
    }
}

/// Rolling 24 h statistics fetched from the venue's ticker endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TickerStats {
    pub last_price: f64,
    pub change_24h_pct: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub volume_24h: f64,
}

/// Severity grade shared by walls, vacuums, and anomaly signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}
