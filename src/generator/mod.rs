//! 短码生成器
//!
//! 生成器只负责产出 id 字符串，不关心它们的用途，也不保证跨生成器
//! 的全局唯一；存储层的唯一性条件才是最终防线。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;
use crate::storage::{Storage, StorageId};

pub mod sequence;

pub use self::sequence::{default_alphabet, ProhibitFn, Sequence, DIGITS, LOWERS, SPECIAL, UPPERS};

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self) -> Result<String>;
}

/// 非持久的数字生成器，只适合原型和测试。
///
/// 计数器属于实例本身，测试夹具各自注入，互不串扰。
#[derive(Debug, Default)]
pub struct FakeGenerator {
    counter: AtomicU64,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Generator for FakeGenerator {
    async fn generate(&self) -> Result<String> {
        let next = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(next.to_string())
    }
}

/// 把最近一次产出的值存在一个固定条目下的持久生成器。
///
/// 所有调用方都在同一个条目上做条件写入，高负载下这里就是瓶颈。
pub struct CentralizedGenerator {
    sequence: Sequence,
}

impl CentralizedGenerator {
    pub fn new(storage: Arc<dyn Storage>, id: impl Into<StorageId>) -> Self {
        Self {
            sequence: Sequence::new(storage, id),
        }
    }

    pub fn with_sequence(sequence: Sequence) -> Self {
        Self { sequence }
    }
}

#[async_trait]
impl Generator for CentralizedGenerator {
    async fn generate(&self) -> Result<String> {
        self.sequence.generate().await
    }
}
