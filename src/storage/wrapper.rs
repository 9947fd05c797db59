//! 命名空间隔离层
//!
//! 把多租户（按服务域名）隔离做成任意 Storage 的透明包装：所有 id
//! 在进入内层前被改写为携带保留 `host` 字段的复合 id，select 查询
//! 追加 host 等值过滤。上层组件（序列、计数器、维度）完全感知不到
//! 包装的存在：它们只依赖 id 的两种投影，从不假设内部结构。

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::storage::{Item, SortOrder, Storage, StorageId, StoreMode, NAMESPACE_FIELD};

pub struct NamespacedStorage {
    inner: Arc<dyn Storage>,
    namespace: String,
}

impl NamespacedStorage {
    pub fn new<N: Into<String>>(inner: Arc<dyn Storage>, namespace: N) -> Self {
        Self {
            inner,
            namespace: namespace.into(),
        }
    }

    fn wrap(&self, id: &StorageId) -> StorageId {
        id.namespaced(NAMESPACE_FIELD, self.namespace.clone())
    }
}

#[async_trait]
impl Storage for NamespacedStorage {
    async fn fetch(&self, id: &StorageId) -> Result<Item> {
        self.inner.fetch(&self.wrap(id)).await
    }

    async fn multi_fetch(&self, ids: &[StorageId]) -> Result<Vec<Item>> {
        let wrapped: Vec<StorageId> = ids.iter().map(|id| self.wrap(id)).collect();
        self.inner.multi_fetch(&wrapped).await
    }

    async fn store(&self, id: &StorageId, value: Item, mode: StoreMode) -> Result<()> {
        self.inner.store(&self.wrap(id), value, mode).await
    }

    async fn select(
        &self,
        filters: &[(String, String)],
        sorters: &[(String, SortOrder)],
        limit: Option<usize>,
    ) -> Result<Vec<Item>> {
        let mut scoped = filters.to_vec();
        scoped.push((NAMESPACE_FIELD.to_string(), self.namespace.clone()));
        self.inner.select(&scoped, sorters, limit).await
    }

    fn backend_name(&self) -> String {
        format!("namespaced({})", self.inner.backend_name())
    }
}
