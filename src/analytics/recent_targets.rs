//! 最近添加维度
//!
//! 每条新缩短的 URL 原样存一份并打上微秒时间戳，取最近 N 条时用
//! select 按时间戳倒序截取。需要一个支持 select 的后端。

use std::sync::Arc;

use chrono::Utc;

use crate::errors::Result;
use crate::services::UrlRecord;
use crate::storage::{SortOrder, Storage, StorageId, StoreMode};

const TIMESTAMP_FIELD: &str = "timestamp";

pub struct RecentTargets {
    storage: Arc<dyn Storage>,
}

impl RecentTargets {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn register(&self, record: &UrlRecord) -> Result<()> {
        let mut item = record.to_item();
        item.set(
            TIMESTAMP_FIELD,
            Utc::now().timestamp_micros().to_string(),
        );
        let id = StorageId::scalar(format!("item_{}", record.code));
        self.storage.store(&id, item, StoreMode::Plain).await
    }

    /// 最近 `n` 条记录，新的在前
    pub async fn retrieve(&self, n: usize) -> Result<Vec<UrlRecord>> {
        let items = self
            .storage
            .select(
                &[],
                &[(TIMESTAMP_FIELD.to_string(), SortOrder::Descending)],
                Some(n),
            )
            .await?;
        items.iter().map(UrlRecord::from_item).collect()
    }

    // TODO: purge entries older than a retention window sized to keep at
    // least the largest N anyone queries.
    pub async fn maintain(&self) -> Result<()> {
        Ok(())
    }
}
