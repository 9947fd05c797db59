//! Redis 队列
//!
//! 待投递消息放在一个 list 里，被取走的消息连同可见性期限挂在一个
//! zset 上。pull 的 Lua 脚本先把过期的保留消息搬回 list 再弹出
//! 下一条，所以超时重投递不需要独立的后台清理进程。

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{GridlinkError, Result};
use crate::queue::{Queue, QueueMessage};

/// KEYS[1] = 待投递 list，KEYS[2] = 保留 zset（score 为到期毫秒）。
/// ARGV[1] = 当前毫秒，ARGV[2] = 新的到期毫秒。
const PULL_SCRIPT: &str = r#"
local expired = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
for _, body in ipairs(expired) do
  redis.call('ZREM', KEYS[2], body)
  redis.call('RPUSH', KEYS[1], body)
end
local body = redis.call('RPOP', KEYS[1])
if body == false then return false end
redis.call('ZADD', KEYS[2], ARGV[2], body)
return body
"#;

pub struct RedisQueue {
    connection: ConnectionManager,
    pending_key: String,
    claimed_key: String,
    pull_script: redis::Script,
}

impl RedisQueue {
    pub async fn connect(url: &str, name: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| GridlinkError::storage_connection(format!("Invalid redis URL: {e}")))?;
        let connection = client.get_connection_manager().await?;
        debug!("Redis queue '{}' connected", name);
        Ok(Self {
            connection,
            pending_key: format!("queue:{name}:pending"),
            claimed_key: format!("queue:{name}:claimed"),
            pull_script: redis::Script::new(PULL_SCRIPT),
        })
    }

    fn encode(message: &QueueMessage) -> Result<String> {
        Ok(serde_json::to_string(message)?)
    }
}

#[async_trait]
impl Queue for RedisQueue {
    async fn push(&self, payload: serde_json::Value) -> Result<()> {
        let message = QueueMessage {
            receipt: Uuid::new_v4().to_string(),
            payload,
        };
        let body = Self::encode(&message)?;
        let mut conn = self.connection.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.pending_key)
            .arg(body)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn pull(&self, visibility: Duration) -> Result<Option<QueueMessage>> {
        let now_ms = Utc::now().timestamp_millis();
        let deadline_ms = now_ms + visibility.as_millis() as i64;

        let mut conn = self.connection.clone();
        let mut invocation = self.pull_script.key(&self.pending_key);
        invocation.key(&self.claimed_key).arg(now_ms).arg(deadline_ms);
        let body: Option<String> = invocation.invoke_async(&mut conn).await?;

        match body {
            Some(body) => {
                let message: QueueMessage = serde_json::from_str(&body)?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, message: &QueueMessage) -> Result<()> {
        let body = Self::encode(message)?;
        let mut conn = self.connection.clone();
        let removed: i64 = redis::cmd("ZREM")
            .arg(&self.claimed_key)
            .arg(body)
            .query_async(&mut conn)
            .await?;
        if removed == 0 {
            return Err(GridlinkError::queue_operation(format!(
                "Message '{}' is not claimed from this queue.",
                message.receipt
            )));
        }
        Ok(())
    }
}
