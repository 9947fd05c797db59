//! 注册表与分析维度
//!
//! 新 URL 诞生后要通知的所有地方都实现 [`Registry`]：分析容器直接
//! 更新各维度，通知器把记录推进队列留给后台进程，黑洞什么都不做。
//! 维度的检索接口各不相同，留在各自的具体类型上。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::Result;
use crate::queue::Queue;
use crate::services::UrlRecord;

pub mod counter;
pub mod popular_domains;
pub mod recent_targets;

pub use self::counter::TimeShardedCounter;
pub use self::popular_domains::{
    DomainCount, PopularDomains, DEFAULT_FANOUT_FACTOR, DEFAULT_GRID_THRESHOLDS,
    DEFAULT_SHARD_DURATION,
};
pub use self::recent_targets::RecentTargets;

/// 接收新生 URL 的登记协议
#[async_trait]
pub trait Registry: Send + Sync {
    async fn register(&self, record: &UrlRecord) -> Result<()>;

    /// 整理维护，通常由后台任务或 cron 调用
    async fn maintain(&self) -> Result<()>;
}

/// 什么也不登记
pub struct Blackhole;

#[async_trait]
impl Registry for Blackhole {
    async fn register(&self, _record: &UrlRecord) -> Result<()> {
        Ok(())
    }

    async fn maintain(&self) -> Result<()> {
        Ok(())
    }
}

/// 维度容器：把登记逐个转发给持有的每个维度
pub struct Analytics {
    popular_domains: PopularDomains,
    recent_targets: RecentTargets,
}

impl Analytics {
    pub fn new(popular_domains: PopularDomains, recent_targets: RecentTargets) -> Self {
        Self {
            popular_domains,
            recent_targets,
        }
    }

    pub fn popular_domains(&self) -> &PopularDomains {
        &self.popular_domains
    }

    pub fn recent_targets(&self) -> &RecentTargets {
        &self.recent_targets
    }
}

#[async_trait]
impl Registry for Analytics {
    async fn register(&self, record: &UrlRecord) -> Result<()> {
        self.popular_domains.register(record).await?;
        self.recent_targets.register(record).await?;
        Ok(())
    }

    async fn maintain(&self) -> Result<()> {
        self.popular_domains.maintain().await?;
        self.recent_targets.maintain().await?;
        Ok(())
    }
}

/// 延迟登记：把记录推进队列，后台 worker 拉取后再走真正的登记路径。
///
/// 网页请求路径上只付一次入队的代价，维度里的热点条目竞争全部
/// 留给后台。
pub struct Notifier {
    queue: Arc<dyn Queue>,
}

impl Notifier {
    pub fn new(queue: Arc<dyn Queue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl Registry for Notifier {
    async fn register(&self, record: &UrlRecord) -> Result<()> {
        let payload = serde_json::to_value(record)?;
        self.queue.push(payload).await?;
        debug!("Queued '{}' for deferred registration", record.code);
        Ok(())
    }

    async fn maintain(&self) -> Result<()> {
        Ok(())
    }
}
