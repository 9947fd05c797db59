//! 内存后端
//!
//! 既是测试替身也是单进程部署的真实后端。每个实例持有自己的数据，
//! 由调用方显式注入，不存在进程级的共享状态。另外记录各原语的
//! 调用次数，测试用它验证读放大的上界。

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::errors::{GridlinkError, Result};
use crate::storage::{
    chunk, stamp_id_fields, Item, SortOrder, Storage, StorageId, StoreMode, MULTI_FETCH_LIMIT,
};

#[derive(Debug, Default)]
struct OpCounters {
    fetches: AtomicUsize,
    multi_fetches: AtomicUsize,
    multi_fetch_batches: AtomicUsize,
    stores: AtomicUsize,
    selects: AtomicUsize,
}

/// 某一时刻的调用计数快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    pub fetches: usize,
    pub multi_fetches: usize,
    pub multi_fetch_batches: usize,
    pub stores: usize,
    pub selects: usize,
}

#[derive(Default)]
pub struct MemoryStorage {
    data: DashMap<String, Item>,
    counters: OpCounters,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            fetches: self.counters.fetches.load(Ordering::Relaxed),
            multi_fetches: self.counters.multi_fetches.load(Ordering::Relaxed),
            multi_fetch_batches: self.counters.multi_fetch_batches.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            selects: self.counters.selects.load(Ordering::Relaxed),
        }
    }

    fn check_mode(current: Option<&Item>, mode: &StoreMode, key: &str) -> Result<()> {
        match mode {
            StoreMode::Plain => Ok(()),
            StoreMode::Expect { field, value } => {
                let actual = current.and_then(|item| item.get(field));
                if actual == value.as_deref() {
                    Ok(())
                } else {
                    Err(GridlinkError::expectation_failed(format!(
                        "Store expectation failed for item '{key}'."
                    )))
                }
            }
            StoreMode::Unique { field } => {
                if current.is_none_or(|item| !item.contains(field)) {
                    Ok(())
                } else {
                    Err(GridlinkError::expectation_failed(format!(
                        "Store expectation failed for item '{key}'."
                    )))
                }
            }
        }
    }

    /// 写入新字段前清掉同名字段的旧分片，避免重组时混入陈旧数据
    fn merge_fields(existing: &mut Item, incoming: Item) {
        for (name, _) in incoming.iter() {
            let base = name.split_once('#').map(|(b, _)| b).unwrap_or(name);
            let stale: Vec<String> = existing
                .iter()
                .filter(|(k, _)| *k == base || k.starts_with(&format!("{base}#")))
                .map(|(k, _)| k.to_string())
                .collect();
            for key in stale {
                existing.remove(&key);
            }
        }
        existing.merge(incoming);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn fetch(&self, id: &StorageId) -> Result<Item> {
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        match self.data.get(&id.key()) {
            Some(entry) => Ok(chunk::rejoin_fields(entry.value().clone())),
            None => Err(GridlinkError::item_absent(format!(
                "The item '{id}' is not found."
            ))),
        }
    }

    async fn multi_fetch(&self, ids: &[StorageId]) -> Result<Vec<Item>> {
        self.counters.multi_fetches.fetch_add(1, Ordering::Relaxed);
        let mut result = Vec::new();
        for batch in ids.chunks(MULTI_FETCH_LIMIT) {
            self.counters
                .multi_fetch_batches
                .fetch_add(1, Ordering::Relaxed);
            for id in batch {
                if let Some(entry) = self.data.get(&id.key()) {
                    result.push(chunk::rejoin_fields(entry.value().clone()));
                }
            }
        }
        Ok(result)
    }

    async fn store(&self, id: &StorageId, mut value: Item, mode: StoreMode) -> Result<()> {
        self.counters.stores.fetch_add(1, Ordering::Relaxed);
        stamp_id_fields(id, &mut value);
        let split = chunk::split_fields(&value);
        let key = id.key();

        // entry 持有分段锁，条件检查和写入对同一条目是原子的
        match self.data.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let current = chunk::rejoin_fields(occupied.get().clone());
                Self::check_mode(Some(&current), &mode, &key)?;
                Self::merge_fields(occupied.get_mut(), split);
            }
            Entry::Vacant(vacant) => {
                Self::check_mode(None, &mode, &key)?;
                vacant.insert(split);
            }
        }
        Ok(())
    }

    async fn select(
        &self,
        filters: &[(String, String)],
        sorters: &[(String, SortOrder)],
        limit: Option<usize>,
    ) -> Result<Vec<Item>> {
        self.counters.selects.fetch_add(1, Ordering::Relaxed);
        let mut matched: Vec<Item> = self
            .data
            .iter()
            .map(|entry| chunk::rejoin_fields(entry.value().clone()))
            .filter(|item| {
                filters
                    .iter()
                    .all(|(field, value)| item.get(field) == Some(value.as_str()))
                    && sorters.iter().all(|(field, _)| item.contains(field))
            })
            .collect();

        matched.sort_by(|a, b| {
            for (field, order) in sorters {
                let left = a.get(field).unwrap_or("");
                let right = b.get(field).unwrap_or("");
                let ordering = match order {
                    SortOrder::Ascending => left.cmp(right),
                    SortOrder::Descending => right.cmp(left),
                };
                if ordering != CmpOrdering::Equal {
                    return ordering;
                }
            }
            CmpOrdering::Equal
        });

        if let Some(limit) = limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn backend_name(&self) -> String {
        "memory".to_string()
    }
}
