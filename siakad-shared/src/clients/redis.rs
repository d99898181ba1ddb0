use redis::aio::ConnectionManager;
use redis::Script;

/// Trim, count and (when under the limit) record one hit in a sorted-set window.
/// Returns `{allowed, count, oldest_score}`.
const SLIDING_WINDOW_SCRIPT: &str = r"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', tonumber(ARGV[1]) - tonumber(ARGV[2]))
local count = redis.call('ZCARD', KEYS[1])
local allowed = 0
if count < tonumber(ARGV[3]) then
  redis.call('ZADD', KEYS[1], ARGV[1], ARGV[4])
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
  count = count + 1
  allowed = 1
end
local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
local oldest_score = tonumber(ARGV[1])
if oldest[2] then oldest_score = tonumber(oldest[2]) end
return {allowed, count, oldest_score}
";

/// Result of one sliding-window hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    pub allowed: bool,
    /// Hits inside the window after this call.
    pub count: u64,
    /// Timestamp (ms) of the oldest hit still inside the window.
    pub oldest_ms: i64,
}

#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
}

impl RedisClient {
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!(url = %url, "connected to Redis");
        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    /// Atomic sliding-window hit shared by every process using the same Redis.
    ///
    /// Entries older than `now_ms - window_ms` are evicted; the key expires
    /// one window after its latest hit.
    pub async fn sliding_window_hit(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
        limit: u64,
        member: &str,
    ) -> Result<WindowHit, redis::RedisError> {
        let mut conn = self.conn.clone();
        let (allowed, count, oldest_ms): (i64, u64, i64) = Script::new(SLIDING_WINDOW_SCRIPT)
            .key(key)
            .arg(now_ms)
            .arg(window_ms)
            .arg(limit)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;

        Ok(WindowHit {
            allowed: allowed == 1,
            count,
            oldest_ms,
        })
    }
}
