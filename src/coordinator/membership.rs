// =============================================================================
// Node membership — heartbeat records with TTL and live-peer discovery
// =============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::kv::{node_key, KvStore, NODES_SEEN_KEY};

/// Entries in the `nodes_seen` helper set older than this are janitored.
const SEEN_MAX_AGE_SECS: f64 = 10.0;

/// A node's self-published membership record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub node_id: String,
    pub hostname: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub metrics_url: String,
    pub last_heartbeat: DateTime<Utc>,
}

/// Publishes this node's liveness and discovers live peers.
pub struct NodeMembership {
    kv: KvStore,
    pub node_id: String,
    hostname: String,
    pid: u32,
    metrics_url: String,
    ttl_secs: u64,
    started_at: DateTime<Utc>,
}

impl NodeMembership {
    pub fn new(
        kv: KvStore,
        node_id: impl Into<String>,
        hostname: impl Into<String>,
        pid: u32,
        metrics_url: impl Into<String>,
        ttl_secs: u64,
    ) -> Self {
        Self {
            kv,
            node_id: node_id.into(),
            hostname: hostname.into(),
            pid,
            metrics_url: metrics_url.into(),
            ttl_secs,
            started_at: Utc::now(),
        }
    }

    /// Upsert this node's record with TTL, refresh the `nodes_seen`
    /// fallback set, and janitor stale set entries. Single attempt; the
    /// next heartbeat tick retries naturally.
    pub async fn heartbeat(&self) -> Result<()> {
        let record = MembershipRecord {
            node_id: self.node_id.clone(),
            hostname: self.hostname.clone(),
            pid: self.pid,
            started_at: self.started_at,
            metrics_url: self.metrics_url.clone(),
            last_heartbeat: Utc::now(),
        };
        let payload = serde_json::to_string(&record).context("serialize membership record")?;

        self.kv
            .set_ex(&node_key(&self.node_id), &payload, self.ttl_secs)
            .await?;

        // Non-authoritative helper set, never consulted for ownership.
        let now_ts = Utc::now().timestamp_millis() as f64 / 1000.0;
        self.kv.zadd(NODES_SEEN_KEY, &self.node_id, now_ts).await?;
        self.kv
            .zremrangebyscore_upto(NODES_SEEN_KEY, now_ts - SEEN_MAX_AGE_SECS)
            .await?;

        debug!(node_id = %self.node_id, "heartbeat_sent");
        Ok(())
    }

    /// All peers whose record exists and whose heartbeat is within TTL.
    pub async fn discover(&self) -> Vec<MembershipRecord> {
        let keys = match self.kv.scan_keys("node:*").await {
            Ok(keys) => keys,
            Err(e) => {
                error!(error = %e, "discovery_failed");
                return Vec::new();
            }
        };

        let mut live = Vec::new();
        let now = Utc::now();
        for key in keys {
            let payload = match self.kv.get(&key).await {
                Ok(Some(payload)) => payload,
                Ok(None) => continue, // expired between SCAN and GET
                Err(e) => {
                    warn!(key = %key, error = %e, "discovery_read_error");
                    continue;
                }
            };

            match serde_json::from_str::<MembershipRecord>(&payload) {
                Ok(record) => {
                    let age = (now - record.last_heartbeat).num_seconds();
                    if age <= self.ttl_secs as i64 {
                        live.push(record);
                    } else {
                        warn!(node_id = %record.node_id, age_sec = age, "discovered_stale_node");
                    }
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "discovery_parse_error");
                }
            }
        }

        debug!(active_count = live.len(), "discovery_complete");
        live
    }

    /// Live peer IDs, in a stable (sorted) order so HRW planning is
    /// deterministic across nodes.
    pub async fn active_node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .discover()
            .await
            .into_iter()
            .map(|r| r.node_id)
            .collect();
        ids.sort();
        ids
    }

    /// Remove this node's record on shutdown so peers converge faster
    /// than TTL expiry.
    pub async fn cleanup(&self) -> Result<()> {
        self.kv.del(&node_key(&self.node_id)).await?;
        self.kv.zrem(NODES_SEEN_KEY, &self.node_id).await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_record_round_trips() {
        let record = MembershipRecord {
            node_id: "host-42".to_string(),
            hostname: "host".to_string(),
            pid: 42,
            started_at: Utc::now(),
            metrics_url: "http://host:9101/metrics".to_string(),
            last_heartbeat: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: MembershipRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.node_id, "host-42");
        assert_eq!(parsed.pid, 42);
        assert_eq!(parsed.last_heartbeat, record.last_heartbeat);
    }
}
