//! 存储抽象层
//!
//! 后端只需要提供四个原语：单条读取、批量读取、条件写入和可选的
//! select。没有锁，也没有跨键事务，所有“读-改-写”都通过条件写入
//! 加重试表达，见 `occ` 模块。任何实现了 [`Storage`] 的后端（内存、
//! redis、关系表）都可以直接被序列生成器、计数器和命名空间包装层
//! 复用。

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StorageConfig;
use crate::errors::{GridlinkError, Result};

pub mod chunk;
pub mod id;
pub mod item;
pub mod memory;
pub mod occ;
pub mod redis;
pub mod wrapper;

pub use self::id::{StorageId, NAMESPACE_FIELD};
pub use self::item::Item;
pub use self::memory::MemoryStorage;
pub use self::occ::StorageOps;
pub use self::redis::RedisStorage;
pub use self::wrapper::NamespacedStorage;

/// 批量读取单次请求的条目上限
pub const MULTI_FETCH_LIMIT: usize = 20;

/// 计数器与序列使用的默认值字段
pub const VALUE_FIELD: &str = "value";

/// 写入条件。
///
/// * `Plain`：无条件写入。
/// * `Expect`：指定字段当前必须等于给定值；`None` 表示该字段必须
///   不存在（后端用它表达“属性缺失”的哨兵）。
/// * `Unique`：指定字段当前必须不存在，用于创建。
///
/// 条件不满足时后端返回 ExpectationFailed，由调用方决定是否重试。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreMode {
    Plain,
    Expect {
        field: String,
        value: Option<String>,
    },
    Unique {
        field: String,
    },
}

impl StoreMode {
    pub fn expect<F: Into<String>>(field: F, value: Option<String>) -> Self {
        StoreMode::Expect {
            field: field.into(),
            value,
        }
    }

    pub fn unique<F: Into<String>>(field: F) -> Self {
        StoreMode::Unique {
            field: field.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// 读取一个条目，不存在时返回 ItemAbsent
    async fn fetch(&self, id: &StorageId) -> Result<Item>;

    /// 批量读取。内部按 [`MULTI_FETCH_LIMIT`] 分批请求并拼接结果。
    ///
    /// 只返回找到的子集：部分缺失、全部缺失和空的 id 列表都不是
    /// 错误，结果可能为空。
    async fn multi_fetch(&self, ids: &[StorageId]) -> Result<Vec<Item>>;

    /// 写入条目。提供的字段覆盖同名旧字段，其余旧字段保留。
    ///
    /// 写入时条目会被盖上 id 的字段映射（字符串键放在保留字段
    /// `id` 下），复合 id 的成分字段因此总能从条目里读回来。
    async fn store(&self, id: &StorageId, value: Item, mode: StoreMode) -> Result<()>;

    /// SQL 风格的过滤查询，仅部分后端支持。
    ///
    /// 纯键值后端可以返回 Unsupported；目前只有按时间排序的
    /// recent-targets 维度消费它。
    async fn select(
        &self,
        filters: &[(String, String)],
        sorters: &[(String, SortOrder)],
        limit: Option<usize>,
    ) -> Result<Vec<Item>>;

    fn backend_name(&self) -> String;
}

/// 把 id 的字段映射写进条目，字符串键占用保留字段 `id`
pub(crate) fn stamp_id_fields(id: &StorageId, value: &mut Item) {
    for (field, field_value) in id.fields() {
        value.set(field, field_value);
    }
    value.set("id", id.key());
}

pub struct StorageFactory;

impl StorageFactory {
    /// 按配置创建一个后端实例，`table` 是逻辑表名（如 `urls`、
    /// `sequences`），用于隔离不同用途的数据。
    pub async fn create(config: &StorageConfig, table: &str) -> Result<Arc<dyn Storage>> {
        match config.backend.as_str() {
            "memory" => Ok(Arc::new(MemoryStorage::new()) as Arc<dyn Storage>),
            "redis" => {
                let prefix = format!("{}{}:", config.key_prefix, table);
                let storage = RedisStorage::connect(&config.redis_url, &prefix).await?;
                Ok(Arc::new(storage) as Arc<dyn Storage>)
            }
            other => Err(GridlinkError::storage_plugin_not_found(format!(
                "Unknown storage backend: {other}. Supported: memory, redis"
            ))),
        }
    }
}
