//! 热门域名维度
//!
//! 目标：在只有点读写和有界批量读取的键值存储上回答“过去 T 时间内
//! 被缩短次数最多的 N 个域名”，不做任何全表扫描或服务端聚合。
//!
//! 结构分两半，都按时间分片：
//!
//! * 每个 `(time_shard, domain)` 一个计数器，新 URL 注册时加一。
//! * 一张阈值网格：每个 `(time_shard, grid_level)` 保存该层的成员数
//!   和只追加的成员名单。域名计数越过某层阈值时被登记到那一层。
//!   升层时不从低层删除。高层本来就稀疏，删除省不了什么，而保留
//!   让低层名单永远是高层的超集，读取时选一层读就够了。
//!
//! 网格的第一个阈值设得高于零，是为了避开分片切换瞬间所有写入方
//! 挤在最低层的“预热”踩踏：各域名计数速度不同，到达首层的时刻自然
//! 错开。代价是低流量站点可能整个分片期都进不了网格，这类部署
//! 应该把首层阈值调到 0 或 1。
//!
//! 读取固定只有三次批量读取：层计数 → 选中层的成员名单 → 候选域名
//! 的计数器，与注册过的域名总量无关。
//!
//! 域名计数自增和网格登记是两次独立写入，不是事务，两者之间崩溃
//! 会丢掉一次登记，检索端只是少看到一个候选，可接受。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::analytics::counter::TimeShardedCounter;
use crate::errors::Result;
use crate::services::UrlRecord;
use crate::storage::{Storage, StorageId, StorageOps, VALUE_FIELD};
use crate::utils::url::canonical_domain;

/// 默认网格阈值；首项 0 是层号计算的下界哨兵，第 0 层不落盘
pub const DEFAULT_GRID_THRESHOLDS: &[i64] = &[
    0, 5, 10, 20, 30, 40, 50, 100, 200, 300, 400, 500, 1000, 2000, 3000, 4000, 5000, 10000,
];

/// 默认分片宽度：12 小时
pub const DEFAULT_SHARD_DURATION: i64 = 12 * 60 * 60;

/// 选层时对请求的 N 乘的安全系数，抵消跨分片重复和计数偏差
pub const DEFAULT_FANOUT_FACTOR: i64 = 3;

const MEMBER_SEPARATOR: &str = ":::";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: i64,
}

pub struct PopularDomains {
    domain_storage: Arc<dyn Storage>,
    domain_counters: TimeShardedCounter,
    level_counters: Arc<dyn Storage>,
    level_members: Arc<dyn Storage>,
    thresholds: Vec<i64>,
    fanout_factor: i64,
    retries: u32,
}

impl PopularDomains {
    pub fn new(
        domain_storage: Arc<dyn Storage>,
        level_counters: Arc<dyn Storage>,
        level_members: Arc<dyn Storage>,
    ) -> Self {
        Self::with_settings(
            domain_storage,
            level_counters,
            level_members,
            DEFAULT_SHARD_DURATION,
            DEFAULT_GRID_THRESHOLDS.to_vec(),
            DEFAULT_FANOUT_FACTOR,
        )
    }

    /// 阈值必须严格递增；首项是下界哨兵，通常为 0
    pub fn with_settings(
        domain_storage: Arc<dyn Storage>,
        level_counters: Arc<dyn Storage>,
        level_members: Arc<dyn Storage>,
        shard_duration: i64,
        thresholds: Vec<i64>,
        fanout_factor: i64,
    ) -> Self {
        let domain_counters =
            TimeShardedCounter::new(domain_storage.clone(), shard_duration, "domain");
        Self {
            domain_storage,
            domain_counters,
            level_counters,
            level_members,
            thresholds,
            fanout_factor: fanout_factor.max(1),
            retries: 3,
        }
    }

    /// 计数值所属的层：不超过它的最后一个阈值的下标
    fn level_of(&self, value: i64) -> usize {
        self.thresholds
            .iter()
            .rposition(|threshold| *threshold <= value)
            .unwrap_or(0)
    }

    /// 会被落盘的层号（第 0 层除外）
    fn levels(&self) -> impl Iterator<Item = usize> {
        1..self.thresholds.len()
    }

    fn level_id(&self, shard: i64, level: usize) -> StorageId {
        StorageId::compound([
            ("time_shard", shard.to_string()),
            ("grid_level", level.to_string()),
        ])
    }

    /// 登记一条新缩短的 URL。
    ///
    /// 计数自增后若跨过了阈值，把域名追加进该层的名单并给该层的
    /// 成员数加一。名单先写：两次写入不是事务，先写对检索更要紧
    /// 的那个。
    pub async fn register(&self, record: &UrlRecord) -> Result<()> {
        let domain = canonical_domain(&record.url)?;
        let shard = self.domain_counters.shard_of(record.created_ts);

        let value = self
            .domain_counters
            .register(record.created_ts, &domain)
            .await?;

        let previous_level = self.level_of(value - 1);
        let current_level = self.level_of(value);
        if current_level == previous_level || current_level == 0 {
            return Ok(());
        }

        debug!(
            "Domain '{}' reached grid level {} in shard {}",
            domain, current_level, shard
        );
        let level_id = self.level_id(shard, current_level);
        self.level_members
            .append(&level_id, &format!("{MEMBER_SEPARATOR}{domain}"), self.retries)
            .await?;
        self.level_counters
            .increment(&level_id, 1, self.retries)
            .await?;
        Ok(())
    }

    /// 过去 `lookback` 秒内的前 `n` 个域名及其计数。
    ///
    /// 固定三次批量读取，与域名总量无关。
    pub async fn retrieve(&self, n: usize, now: i64, lookback: i64) -> Result<Vec<DomainCount>> {
        let shards = self.domain_counters.shards_between(now, lookback);

        // 第一趟：所有 (分片, 层) 的成员数
        let level_ids: Vec<StorageId> = shards
            .iter()
            .flat_map(|shard| self.levels().map(|level| self.level_id(*shard, level)))
            .collect();
        let level_items = self.level_counters.multi_fetch(&level_ids).await?;

        let mut members_per_level: BTreeMap<i64, BTreeMap<usize, i64>> = BTreeMap::new();
        for item in &level_items {
            let (Some(shard), Some(level)) =
                (item.get_i64("time_shard"), item.get_i64("grid_level"))
            else {
                continue;
            };
            members_per_level
                .entry(shard)
                .or_default()
                .insert(level as usize, item.get_i64(VALUE_FIELD).unwrap_or(0));
        }

        // 每个分片挑一层：成员数足够的最高层；都不够就取最低的那层，
        // 低层名单是高层的超集，单独读它就覆盖了全部候选
        let wanted = (n as i64) * self.fanout_factor;
        let mut chosen: Vec<StorageId> = Vec::new();
        for (shard, levels) in &members_per_level {
            let best = levels
                .iter()
                .rev()
                .find(|(_, members)| **members >= wanted)
                .or_else(|| levels.iter().next());
            if let Some((level, _)) = best {
                chosen.push(self.level_id(*shard, *level));
            }
        }

        // 第二趟：选中层的成员名单，跨分片合并去重
        let member_items = self.level_members.multi_fetch(&chosen).await?;
        let mut candidates: BTreeSet<String> = BTreeSet::new();
        for item in &member_items {
            let members = item.get(VALUE_FIELD).unwrap_or("");
            candidates.extend(
                members
                    .split(MEMBER_SEPARATOR)
                    .filter(|domain| !domain.is_empty())
                    .map(str::to_string),
            );
        }

        // 第三趟：候选域名在整个窗口上的计数器
        let counter_ids: Vec<StorageId> = candidates
            .iter()
            .flat_map(|domain| {
                shards
                    .iter()
                    .map(|shard| self.domain_counters.id_for(*shard, domain))
            })
            .collect();
        let counter_items = self.domain_storage.multi_fetch(&counter_ids).await?;

        let mut combined: BTreeMap<String, i64> = BTreeMap::new();
        for item in &counter_items {
            let Some(domain) = item.get("domain") else {
                continue;
            };
            *combined.entry(domain.to_string()).or_insert(0) +=
                item.get_i64(VALUE_FIELD).unwrap_or(0);
        }

        // 平局保持映射的迭代顺序，排序是稳定的
        let mut tops: Vec<DomainCount> = combined
            .into_iter()
            .map(|(domain, count)| DomainCount { domain, count })
            .collect();
        tops.sort_by(|a, b| b.count.cmp(&a.count));
        tops.truncate(n);
        Ok(tops)
    }

    // TODO: delete grid rows and domain counters in shards older than the
    // maximum supported lookback; until then the keyspace grows unbounded.
    pub async fn maintain(&self) -> Result<()> {
        Ok(())
    }
}
