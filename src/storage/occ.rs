//! 乐观并发控制
//!
//! 底层存储没有任何锁，原子性只能靠条件写入：先读当前值，算出新值，
//! 再带着“旧值必须没变”的期望写回。写入被并发修改抢先时后端返回
//! ExpectationFailed，唯一的恢复手段就是从读取那一步重来，次数由调用
//! 方给定的预算限制。[`repeat`] 是这个循环的唯一实现，系统里所有的
//! 创建/更新/自增都经过它。
//!
//! 典型的更新：
//!
//! ```ignore
//! let changes = storage
//!     .update(&id, "value", 3, |item| {
//!         let old = item.get_i64("value").unwrap_or(0);
//!         Ok(Item::from_pairs([("value", (old + 1).to_string())]))
//!     })
//!     .await?;
//! ```

use std::future::Future;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::{GridlinkError, Result};
use crate::storage::{Item, StorageId, StoreMode, Storage, VALUE_FIELD};

/// 重复执行一个动作直到成功或预算耗尽。
///
/// 只有条件写入冲突（ExpectationFailed）会触发重试，并且是立即重试：
/// 冲突说明有别的写入者刚成功，马上重读通常就能通过。其余错误
/// 原样向上传播。`retries` 是总尝试次数：传 1 表示只试一次，0 被
/// 视同 1。预算耗尽时返回最后一次的冲突错误。
pub async fn repeat<T, F, Fut>(retries: u32, mut action: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut remaining = retries.max(1);
    loop {
        remaining -= 1;
        match action().await {
            Err(e) if e.is_conflict() && remaining > 0 => {
                debug!("Conditional write conflicted, {} attempts left", remaining);
            }
            other => return other,
        }
    }
}

/// [`repeat`] 的变体：预算耗尽时吞掉冲突，返回 None 而不是报错。
///
/// 只适合结果可以丢弃的尽力而为写入；默认装配里没有它的使用者，
/// 冲突被吞掉的地方必须是显式选择。
pub async fn ignore<T, F, Fut>(retries: u32, action: F) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match repeat(retries, action).await {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_conflict() => Ok(None),
        Err(e) => Err(e),
    }
}

/// 基于 [`repeat`] 的高层变更原语，对所有 [`Storage`] 实现生效。
///
/// 命名空间包装层也实现了 `Storage`，所以这些方法在包装前后行为
/// 一致：它们只通过 trait 的四个原语访问数据。
#[async_trait]
pub trait StorageOps: Storage {
    /// 创建一个全新的条目，以 `id` 字段不存在作为唯一性条件。
    ///
    /// 每次尝试都重新调用工厂：冲突意味着整个条目（包括 id）重新
    /// 生成，而不是在旧值上打补丁。预算内始终冲突时返回
    /// UniquenessViolation。
    async fn create<F, Fut>(&self, retries: u32, mut factory: F) -> Result<Item>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<(StorageId, Item)>> + Send,
    {
        let mut remaining = retries.max(1);
        loop {
            remaining -= 1;
            let (id, item) = factory().await?;
            match self
                .store(&id, item.clone(), StoreMode::unique("id"))
                .await
            {
                Ok(()) => return Ok(item),
                Err(e) if e.is_conflict() => {
                    if remaining == 0 {
                        return Err(GridlinkError::uniqueness_violation(format!(
                            "The item '{id}' exists already."
                        )));
                    }
                    debug!("Item '{}' exists, regenerating ({} attempts left)", id, remaining);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 读取-变换-条件写入。条目不存在时按空条目处理。
    ///
    /// 期望值取自读取时 `guard_field` 的值（缺失即“必须仍然缺失”），
    /// 返回成功写入的变更字段。
    async fn update<F>(
        &self,
        id: &StorageId,
        guard_field: &str,
        retries: u32,
        apply: F,
    ) -> Result<Item>
    where
        F: Fn(&Item) -> Result<Item> + Send + Sync,
    {
        repeat(retries, || self.try_update(id, guard_field, &apply)).await
    }

    /// 与 [`StorageOps::update`] 相同，但条目必须已存在
    async fn replace<F>(
        &self,
        id: &StorageId,
        guard_field: &str,
        retries: u32,
        apply: F,
    ) -> Result<Item>
    where
        F: Fn(&Item) -> Result<Item> + Send + Sync,
    {
        repeat(retries, || self.try_replace(id, guard_field, &apply)).await
    }

    /// 单次更新尝试，冲突由 [`StorageOps::update`] 的循环处理
    async fn try_update<F>(&self, id: &StorageId, guard_field: &str, apply: &F) -> Result<Item>
    where
        F: Fn(&Item) -> Result<Item> + Send + Sync,
    {
        let item = match self.fetch(id).await {
            Ok(item) => item,
            Err(GridlinkError::ItemAbsent(_)) => Item::new(),
            Err(e) => return Err(e),
        };
        self.write_guarded(id, guard_field, &item, apply).await
    }

    /// 单次替换尝试；条目缺失原样上抛
    async fn try_replace<F>(&self, id: &StorageId, guard_field: &str, apply: &F) -> Result<Item>
    where
        F: Fn(&Item) -> Result<Item> + Send + Sync,
    {
        let item = self.fetch(id).await?;
        self.write_guarded(id, guard_field, &item, apply).await
    }

    #[doc(hidden)]
    async fn write_guarded<F>(
        &self,
        id: &StorageId,
        guard_field: &str,
        item: &Item,
        apply: &F,
    ) -> Result<Item>
    where
        F: Fn(&Item) -> Result<Item> + Send + Sync,
    {
        let expected = item.get(guard_field).map(str::to_string);
        let changes = apply(item)?;
        self.store(
            id,
            changes.clone(),
            StoreMode::expect(guard_field, expected),
        )
        .await?;
        Ok(changes)
    }

    /// 给数值字段加 `step`，返回写入成功后的新值
    async fn increment(&self, id: &StorageId, step: i64, retries: u32) -> Result<i64> {
        let changes = self
            .update(id, VALUE_FIELD, retries, move |item| {
                let old = item.get_i64(VALUE_FIELD).unwrap_or(0);
                Ok(Item::from_pairs([(VALUE_FIELD, (old + step).to_string())]))
            })
            .await?;
        changes.get_i64(VALUE_FIELD).ok_or_else(|| {
            GridlinkError::storage_operation(format!("Counter '{id}' produced a non-numeric value."))
        })
    }

    async fn decrement(&self, id: &StorageId, step: i64, retries: u32) -> Result<i64> {
        self.increment(id, -step, retries).await
    }

    /// 在字符串字段末尾追加，返回追加后的完整值
    async fn append(&self, id: &StorageId, suffix: &str, retries: u32) -> Result<String> {
        self.concat(id, suffix, retries, false).await
    }

    /// 在字符串字段开头插入，返回插入后的完整值
    async fn prepend(&self, id: &StorageId, prefix: &str, retries: u32) -> Result<String> {
        self.concat(id, prefix, retries, true).await
    }

    #[doc(hidden)]
    async fn concat(
        &self,
        id: &StorageId,
        piece: &str,
        retries: u32,
        front: bool,
    ) -> Result<String> {
        let changes = self
            .update(id, VALUE_FIELD, retries, move |item| {
                let old = item.get(VALUE_FIELD).unwrap_or("");
                let joined = if front {
                    format!("{piece}{old}")
                } else {
                    format!("{old}{piece}")
                };
                Ok(Item::from_pairs([(VALUE_FIELD, joined)]))
            })
            .await?;
        Ok(changes.get(VALUE_FIELD).unwrap_or("").to_string())
    }
}

impl<S: Storage + ?Sized> StorageOps for S {}
