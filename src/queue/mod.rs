//! 消息队列边界
//!
//! 至少一次投递的可见性超时队列：push 入队，pull 取出一条并保留
//! 给调用方一段时间，期限内没有 delete 的消息会重新出现给其他
//! 消费者。载荷是 JSON 值，跨进程时无需额外协议。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryQueue;
pub use self::redis::RedisQueue;

/// 取出的消息；回执用于 delete 时定位保留中的那一条
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub receipt: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait Queue: Send + Sync {
    async fn push(&self, payload: serde_json::Value) -> Result<()>;

    /// 取出一条消息并保留 `visibility` 时长；队列为空返回 None。
    ///
    /// HTTP 型队列做不出体面的阻塞拉取，轮询间隔由调用方掌握。
    async fn pull(&self, visibility: Duration) -> Result<Option<QueueMessage>>;

    /// 确认处理完成，消息不再重新投递
    async fn delete(&self, message: &QueueMessage) -> Result<()>;
}
