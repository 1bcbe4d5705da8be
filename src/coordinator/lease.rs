// =============================================================================
// Writer leases — fenced, TTL-bound, linearized by server-side scripts
// =============================================================================
//
// All three operations are single Lua scripts so the owner check, the
// token bump, and the TTL set are atomic relative to the key pair.
// Client-side GET-then-SET would race concurrent acquirers.
//
// The token counter key is deliberately left behind on release: fencing
// tokens must keep increasing across every future acquisition of the
// symbol, whoever performs it.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use redis::Script;
use tracing::{debug, error, info, warn};

use crate::kv::{writer_key, writer_token_key, KvStore};

const SCRIPT_TIMEOUT: Duration = Duration::from_secs(5);

/// KEYS[1]=writer, KEYS[2]=token; ARGV[1]=node_id, ARGV[2]=ttl_ms.
/// Returns the new fencing token, or false when another node owns it.
const ACQUIRE_LUA: &str = r#"
local owner = redis.call('GET', KEYS[1])
if owner == false or owner == ARGV[1] then
    local token = redis.call('INCR', KEYS[2])
    redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
    return token
end
return false
"#;

/// KEYS[1]=writer; ARGV[1]=node_id, ARGV[2]=ttl_ms. 1 = renewed.
const RENEW_LUA: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

/// KEYS[1]=writer; ARGV[1]=node_id. 1 = released. Token key survives.
const RELEASE_LUA: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('DEL', KEYS[1])
    return 1
end
return 0
"#;

/// Current lease state for a symbol as read from the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeaseInfo {
    pub owner: Option<String>,
    pub token: Option<i64>,
}

pub struct LeaseManager {
    kv: KvStore,
    pub node_id: String,
    acquire_script: Script,
    renew_script: Script,
    release_script: Script,
}

impl LeaseManager {
    pub fn new(kv: KvStore, node_id: impl Into<String>) -> Self {
        Self {
            kv,
            node_id: node_id.into(),
            acquire_script: Script::new(ACQUIRE_LUA),
            renew_script: Script::new(RENEW_LUA),
            release_script: Script::new(RELEASE_LUA),
        }
    }

    /// Try to acquire the writer lease. Returns the new fencing token on
    /// success, None when a peer holds it or the store errored (the next
    /// rebalance tick retries).
    pub async fn acquire(&self, symbol: &str, ttl_ms: u64) -> Option<i64> {
        let result: Result<Option<i64>> = self
            .invoke(
                self.acquire_script
                    .key(writer_key(symbol))
                    .key(writer_token_key(symbol))
                    .arg(&self.node_id)
                    .arg(ttl_ms),
            )
            .await;

        match result {
            Ok(Some(token)) => {
                info!(symbol = %symbol, node_id = %self.node_id, token, "lease_acquired");
                Some(token)
            }
            Ok(None) => {
                debug!(symbol = %symbol, node_id = %self.node_id, "lease_acquisition_denied");
                None
            }
            Err(e) => {
                error!(symbol = %symbol, error = %e, "lease_acquire_error");
                None
            }
        }
    }

    /// Reset the lease TTL. False means ownership was lost.
    pub async fn renew(&self, symbol: &str, ttl_ms: u64) -> bool {
        let result: Result<i64> = self
            .invoke(
                self.renew_script
                    .key(writer_key(symbol))
                    .arg(&self.node_id)
                    .arg(ttl_ms),
            )
            .await;

        match result {
            Ok(1) => {
                debug!(symbol = %symbol, ttl_ms, "lease_renewed");
                true
            }
            Ok(_) => {
                warn!(symbol = %symbol, node_id = %self.node_id, "lease_renewal_denied");
                false
            }
            Err(e) => {
                error!(symbol = %symbol, error = %e, "lease_renew_error");
                false
            }
        }
    }

    /// Release the lease if we own it. The token counter stays behind.
    pub async fn release(&self, symbol: &str) -> bool {
        let result: Result<i64> = self
            .invoke(
                self.release_script
                    .key(writer_key(symbol))
                    .arg(&self.node_id),
            )
            .await;

        match result {
            Ok(1) => {
                info!(symbol = %symbol, node_id = %self.node_id, "lease_released");
                true
            }
            Ok(_) => {
                warn!(symbol = %symbol, node_id = %self.node_id, "lease_release_denied");
                false
            }
            Err(e) => {
                error!(symbol = %symbol, error = %e, "lease_release_error");
                false
            }
        }
    }

    /// Read the lease owner and token without mutating anything.
    pub async fn lease_info(&self, symbol: &str) -> LeaseInfo {
        let owner = self.kv.get(&writer_key(symbol)).await.unwrap_or_else(|e| {
            error!(symbol = %symbol, error = %e, "lease_owner_read_error");
            None
        });
        let token = self
            .kv
            .get(&writer_token_key(symbol))
            .await
            .unwrap_or_else(|e| {
                error!(symbol = %symbol, error = %e, "lease_token_read_error");
                None
            })
            .and_then(|raw| raw.parse::<i64>().ok());

        LeaseInfo { owner, token }
    }

    async fn invoke<T: redis::FromRedisValue>(
        &self,
        invocation: &mut redis::ScriptInvocation<'_>,
    ) -> Result<T> {
        let mut conn = self.kv.connection();
        tokio::time::timeout(SCRIPT_TIMEOUT, invocation.invoke_async::<_, T>(&mut conn))
            .await
            .context("lease script timed out")?
            .context("lease script failed")
    }
}
