//! Redis implementation of the fast-store adapters.
//!
//! Every compound mutation is a Lua script so no concurrent caller can
//! interleave between the stock read and the delta write. Queue timestamps
//! come from the Redis `TIME` command, not the host clock.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

use crate::core_types::CommodityId;

use super::{
    delta_key, done_flag_key, payload_key, stock_key, ClaimBatch, CounterStore, Decrement,
    Increment, StoreError, TaskQueue, COUNTER_TTL_SECS, DELTA_KEY_PREFIX, DONE_FLAG_TTL_SECS,
    PROCESSING_KEY, READY_KEY,
};

/// Sentinel returns shared by the counter scripts.
const MISS_SENTINEL: i64 = -1;
const INSUFFICIENT_SENTINEL: i64 = -2;

const DECREMENT_SCRIPT: &str = r#"
local stock_key = KEYS[1]
local delta_key = KEYS[2]
local quantity = tonumber(ARGV[1])
local ttl = tonumber(ARGV[2])

local current_stock = redis.call("GET", stock_key)
if not current_stock then
    return -1
end
current_stock = tonumber(current_stock)
if current_stock < quantity then
    return -2
end
redis.call("DECRBY", stock_key, quantity)
redis.call("INCRBY", delta_key, quantity)
redis.call("EXPIRE", delta_key, ttl)
return current_stock - quantity
"#;

const INCREMENT_SCRIPT: &str = r#"
local stock_key = KEYS[1]
local delta_key = KEYS[2]
local quantity = tonumber(ARGV[1])
local ttl = tonumber(ARGV[2])

local current_stock = redis.call("GET", stock_key)
if not current_stock then
    return -1
end
redis.call("INCRBY", stock_key, quantity)
redis.call("DECRBY", delta_key, quantity)
redis.call("EXPIRE", delta_key, ttl)
return tonumber(current_stock) + quantity
"#;

const TAKE_DELTA_SCRIPT: &str = r#"
local delta_key = KEYS[1]
local ttl = tonumber(ARGV[1])

local delta = redis.call("GET", delta_key)
if not delta then
    return 0
end
delta = tonumber(delta)
if delta == 0 then
    return 0
end
redis.call("SET", delta_key, 0, "EX", ttl)
return delta
"#;

const CLAIM_SCRIPT: &str = r#"
local ready_key = KEYS[1]
local processing_key = KEYS[2]
local now = tonumber(ARGV[1])
local max = tonumber(ARGV[2])
local lease = tonumber(ARGV[3])

local total = redis.call("ZCARD", ready_key)
local due = redis.call("ZRANGEBYSCORE", ready_key, "-inf", now, "LIMIT", 0, max)
for _, id in ipairs(due) do
    redis.call("ZREM", ready_key, id)
    redis.call("ZADD", processing_key, now + lease, id)
end
return {total, due}
"#;

const RECOVER_SCRIPT: &str = r#"
local processing_key = KEYS[1]
local ready_key = KEYS[2]
local now = tonumber(ARGV[1])
local retry = tonumber(ARGV[2])

local expired = redis.call("ZRANGEBYSCORE", processing_key, "-inf", now)
for _, id in ipairs(expired) do
    redis.call("ZREM", processing_key, id)
    redis.call("ZADD", ready_key, now + retry, id)
end
return #expired
"#;

/// Connection-manager-backed store. Cloning is cheap; the manager
/// multiplexes one connection and reconnects on failure.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    decrement: Script,
    increment: Script,
    take_delta: Script,
    claim: Script,
    recover: Script,
}

impl RedisStore {
    /// Connect and verify the server with a ping bounded at five seconds.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;

        let ping = async {
            let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<String, redis::RedisError>(reply)
        };
        match tokio::time::timeout(Duration::from_secs(5), ping).await {
            Ok(reply) => {
                reply?;
            }
            Err(_) => {
                return Err(StoreError::Backend(
                    "redis ping timed out after 5s".to_string(),
                ));
            }
        }

        tracing::info!("Redis connection established");
        Ok(Self {
            conn,
            decrement: Script::new(DECREMENT_SCRIPT),
            increment: Script::new(INCREMENT_SCRIPT),
            take_delta: Script::new(TAKE_DELTA_SCRIPT),
            claim: Script::new(CLAIM_SCRIPT),
            recover: Script::new(RECOVER_SCRIPT),
        })
    }

    /// Unix seconds according to the Redis server.
    async fn server_now(&self) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let (secs, _micros): (i64, i64) = redis::cmd("TIME").query_async(&mut conn).await?;
        Ok(secs)
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn init_stock(&self, id: CommodityId, stock: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(stock_key(id))
            .arg(stock)
            .arg("EX")
            .arg(COUNTER_TTL_SECS)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn decrement_stock(&self, id: CommodityId, qty: i64) -> Result<Decrement, StoreError> {
        let mut conn = self.conn.clone();
        let result: i64 = self
            .decrement
            .key(stock_key(id))
            .key(delta_key(id))
            .arg(qty)
            .arg(COUNTER_TTL_SECS)
            .invoke_async(&mut conn)
            .await?;
        Ok(match result {
            MISS_SENTINEL => Decrement::Miss,
            INSUFFICIENT_SENTINEL => Decrement::Insufficient,
            remaining => Decrement::Ok { remaining },
        })
    }

    async fn increment_stock(&self, id: CommodityId, qty: i64) -> Result<Increment, StoreError> {
        let mut conn = self.conn.clone();
        let result: i64 = self
            .increment
            .key(stock_key(id))
            .key(delta_key(id))
            .arg(qty)
            .arg(COUNTER_TTL_SECS)
            .invoke_async(&mut conn)
            .await?;
        Ok(match result {
            MISS_SENTINEL => Increment::Miss,
            stock => Increment::Ok { stock },
        })
    }

    async fn take_delta(&self, id: CommodityId) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let delta: i64 = self
            .take_delta
            .key(delta_key(id))
            .arg(COUNTER_TTL_SECS)
            .invoke_async(&mut conn)
            .await?;
        Ok(delta)
    }

    async fn put_back_delta(&self, id: CommodityId, delta: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("INCRBY")
            .arg(delta_key(id))
            .arg(delta)
            .ignore()
            .cmd("EXPIRE")
            .arg(delta_key(id))
            .arg(COUNTER_TTL_SECS)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delta_keys(&self) -> Result<Vec<CommodityId>, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = format!("{DELTA_KEY_PREFIX}*");
        let mut ids = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            for key in keys {
                if let Some(id) = key
                    .strip_prefix(DELTA_KEY_PREFIX)
                    .and_then(|s| s.parse::<CommodityId>().ok())
                {
                    ids.push(id);
                }
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(ids)
    }

    async fn delta_value(&self, id: CommodityId) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = redis::cmd("GET")
            .arg(delta_key(id))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn stock_value(&self, id: CommodityId) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = redis::cmd("GET")
            .arg(stock_key(id))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }
}

#[async_trait]
impl TaskQueue for RedisStore {
    async fn enqueue(
        &self,
        task_id: &str,
        payload: &str,
        delay: Duration,
    ) -> Result<(), StoreError> {
        let due = self.server_now().await? + delay.as_secs() as i64;
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(READY_KEY)
            .arg(due)
            .arg(task_id)
            .ignore()
            .cmd("SET")
            .arg(payload_key(task_id))
            .arg(payload)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn claim(&self, max: i64, lease: Duration) -> Result<ClaimBatch, StoreError> {
        let now = self.server_now().await?;
        let mut conn = self.conn.clone();
        let (total, ids): (i64, Vec<String>) = self
            .claim
            .key(READY_KEY)
            .key(PROCESSING_KEY)
            .arg(now)
            .arg(max)
            .arg(lease.as_secs())
            .invoke_async(&mut conn)
            .await?;
        Ok(if !ids.is_empty() {
            ClaimBatch::Claimed(ids)
        } else if total == 0 {
            ClaimBatch::Empty
        } else {
            ClaimBatch::NotDue
        })
    }

    async fn ack(&self, task_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("ZREM")
            .arg(PROCESSING_KEY)
            .arg(task_id)
            .ignore()
            .cmd("DEL")
            .arg(payload_key(task_id))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn recover(&self, retry_delay: Duration) -> Result<u64, StoreError> {
        let now = self.server_now().await?;
        let mut conn = self.conn.clone();
        let moved: u64 = self
            .recover
            .key(PROCESSING_KEY)
            .key(READY_KEY)
            .arg(now)
            .arg(retry_delay.as_secs())
            .invoke_async(&mut conn)
            .await?;
        Ok(moved)
    }

    async fn payload(&self, task_id: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(payload_key(task_id))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn mark_done(&self, task_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(done_flag_key(task_id))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(DONE_FLAG_TTL_SECS)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn unmark_done(&self, task_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL")
            .arg(done_flag_key(task_id))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn is_done(&self, task_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: i64 = redis::cmd("EXISTS")
            .arg(done_flag_key(task_id))
            .query_async(&mut conn)
            .await?;
        Ok(exists == 1)
    }
}
