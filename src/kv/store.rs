// =============================================================================
// KV store client — async Redis connection with per-operation timeouts
// =============================================================================
//
// The shared store is the only mutable resource the fleet coordinates
// through. Every operation is bounded: 2 s to connect, 5 s per command.
// The multiplexed ConnectionManager reconnects on its own; callers treat
// errors as transient and rely on their own retry/tick policy.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use tracing::info;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const OP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct KvStore {
    conn: ConnectionManager,
}

impl KvStore {
    /// Connect to the store. An optional password is folded into the URL
    /// when the URL itself carries no credentials.
    pub async fn connect(url: &str, password: Option<&str>) -> Result<Self> {
        let url = match password {
            Some(pass) if !pass.is_empty() && !url.contains('@') => {
                url.replacen("redis://", &format!("redis://:{pass}@"), 1)
            }
            _ => url.to_string(),
        };

        let client = redis::Client::open(url.as_str())
            .with_context(|| format!("invalid kv url {url}"))?;

        let conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .context("kv connect timed out")?
            .context("kv connect failed")?;

        info!(url = %url.split('@').last().unwrap_or(&url), "kv store connected");
        Ok(Self { conn })
    }

    /// Clone of the underlying multiplexed connection, for script callers.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    async fn run<T: redis::FromRedisValue>(&self, cmd: redis::Cmd) -> Result<T> {
        let mut conn = self.conn.clone();
        tokio::time::timeout(OP_TIMEOUT, cmd.query_async::<_, T>(&mut conn))
            .await
            .context("kv operation timed out")?
            .context("kv operation failed")
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.run(cmd).await
    }

    /// SET with an expiry in seconds.
    pub async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("EX").arg(ttl_secs);
        self.run(cmd).await
    }

    /// SET preserving whatever TTL the key already carries.
    pub async fn set_keepttl(&self, key: &str, value: &str) -> Result<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("KEEPTTL");
        self.run(cmd).await
    }

    pub async fn del(&self, key: &str) -> Result<()> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.run(cmd).await
    }

    pub async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key).arg(score).arg(member);
        self.run(cmd).await
    }

    pub async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        let mut cmd = redis::cmd("ZREM");
        cmd.arg(key).arg(member);
        self.run(cmd).await
    }

    /// Remove sorted-set members scored at or below `max_score`.
    pub async fn zremrangebyscore_upto(&self, key: &str, max_score: f64) -> Result<()> {
        let mut cmd = redis::cmd("ZREMRANGEBYSCORE");
        cmd.arg(key).arg("-inf").arg(max_score);
        self.run(cmd).await
    }

    /// Collect all keys matching `pattern` via cursor SCAN.
    pub async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor).arg("MATCH").arg(pattern).arg("COUNT").arg(100);
            let (next, batch): (u64, Vec<String>) = self.run(cmd).await?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }
}
