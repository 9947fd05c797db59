//! 后台分析更新进程
//!
//! 从队列里拉取新生 URL 的记录，按记录的 host 重建对应命名空间的
//! 维度并登记，成功后删除消息。处理失败只记录日志，消息留在
//! 保留区，可见性超时后会重新投递给别的消费者。

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::analytics::{Analytics, PopularDomains, RecentTargets, Registry};
use crate::config::AnalyticsConfig;
use crate::errors::Result;
use crate::queue::Queue;
use crate::services::UrlRecord;
use crate::storage::{NamespacedStorage, Storage};

/// 各分析维度的裸存储，包装进命名空间前的形态
pub struct AnalyticsStores {
    pub domain_counters: Arc<dyn Storage>,
    pub level_counters: Arc<dyn Storage>,
    pub level_members: Arc<dyn Storage>,
    pub recent_targets: Arc<dyn Storage>,
}

impl AnalyticsStores {
    /// 为某个服务域名装配一套维度
    pub fn for_host(&self, host: &str, config: &AnalyticsConfig) -> Analytics {
        let wrap = |storage: &Arc<dyn Storage>| -> Arc<dyn Storage> {
            Arc::new(NamespacedStorage::new(storage.clone(), host))
        };
        let popular = PopularDomains::with_settings(
            wrap(&self.domain_counters),
            wrap(&self.level_counters),
            wrap(&self.level_members),
            config.shard_duration_secs,
            config.grid_thresholds.clone(),
            config.fanout_factor,
        );
        let recent = RecentTargets::new(wrap(&self.recent_targets));
        Analytics::new(popular, recent)
    }
}

pub struct AnalyticsWorker {
    queue: Arc<dyn Queue>,
    stores: AnalyticsStores,
    config: AnalyticsConfig,
    visibility: Duration,
}

impl AnalyticsWorker {
    pub fn new(
        queue: Arc<dyn Queue>,
        stores: AnalyticsStores,
        config: AnalyticsConfig,
        visibility: Duration,
    ) -> Self {
        Self {
            queue,
            stores,
            config,
            visibility,
        }
    }

    pub fn stores(&self) -> &AnalyticsStores {
        &self.stores
    }

    /// 处理最多一条消息；返回是否真的拿到了消息
    pub async fn process_one(&self) -> Result<bool> {
        let Some(message) = self.queue.pull(self.visibility).await? else {
            return Ok(false);
        };

        let record: UrlRecord = serde_json::from_value(message.payload.clone())?;
        info!("Updating analytics for '{}' ({})", record.code, record.host);

        let analytics = self.stores.for_host(&record.host, &self.config);
        analytics.register(&record).await?;

        self.queue.delete(&message).await?;
        Ok(true)
    }

    /// 轮询循环：空轮次休眠 `poll_interval`，处理失败不中断
    pub async fn run(&self, poll_interval: Duration) {
        info!("Analytics worker started");
        loop {
            match self.process_one().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(poll_interval).await,
                Err(e) => {
                    error!("Failed to process queue message: {}", e);
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }
}
