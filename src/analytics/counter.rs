//! 时间分片计数器
//!
//! 时间轴被切成等宽分片，分片以起始时刻命名；计数器总是落在
//! `(time_shard, key)` 复合 id 上。查询某个回看窗口时枚举窗口内的
//! 全部分片边界（闭区间）一次批量读回求和，代价是
//! `O(lookback / duration)` 次读取，与键的总数无关，精度为一个
//! 分片宽度。

use std::sync::Arc;

use crate::errors::Result;
use crate::storage::{Storage, StorageId, StorageOps, VALUE_FIELD};

pub struct TimeShardedCounter {
    storage: Arc<dyn Storage>,
    shard_duration: i64,
    key_field: String,
    retries: u32,
}

impl TimeShardedCounter {
    pub fn new<F: Into<String>>(
        storage: Arc<dyn Storage>,
        shard_duration: i64,
        key_field: F,
    ) -> Self {
        Self {
            storage,
            shard_duration: shard_duration.max(1),
            key_field: key_field.into(),
            retries: 3,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn shard_of(&self, timestamp: i64) -> i64 {
        timestamp.div_euclid(self.shard_duration) * self.shard_duration
    }

    /// `[shard(now - lookback) .. shard(now)]` 的全部分片边界，含两端
    pub fn shards_between(&self, now: i64, lookback: i64) -> Vec<i64> {
        let first = self.shard_of(now - lookback);
        let last = self.shard_of(now);
        let mut shards = Vec::new();
        let mut shard = first;
        while shard <= last {
            shards.push(shard);
            shard += self.shard_duration;
        }
        shards
    }

    pub fn id_for(&self, shard: i64, key: &str) -> StorageId {
        StorageId::compound([
            ("time_shard".to_string(), shard.to_string()),
            (self.key_field.clone(), key.to_string()),
        ])
    }

    /// 给 `key` 在所属分片上加一，返回该分片内的新计数值
    pub async fn register(&self, timestamp: i64, key: &str) -> Result<i64> {
        let id = self.id_for(self.shard_of(timestamp), key);
        self.storage.increment(&id, 1, self.retries).await
    }

    /// 回看窗口内 `key` 的计数总和，缺失的分片按 0 计
    pub async fn retrieve(&self, key: &str, now: i64, lookback: i64) -> Result<i64> {
        let ids: Vec<StorageId> = self
            .shards_between(now, lookback)
            .into_iter()
            .map(|shard| self.id_for(shard, key))
            .collect();
        let items = self.storage.multi_fetch(&ids).await?;
        Ok(items
            .iter()
            .map(|item| item.get_i64(VALUE_FIELD).unwrap_or(0))
            .sum())
    }
}
