//! 进程内队列，测试与单机部署用

use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::errors::Result;
use crate::queue::{Queue, QueueMessage};

struct Entry {
    receipt: String,
    payload: serde_json::Value,
    visible_at: Instant,
}

#[derive(Default)]
pub struct MemoryQueue {
    entries: Mutex<Vec<Entry>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn push(&self, payload: serde_json::Value) -> Result<()> {
        self.entries.lock().push(Entry {
            receipt: Uuid::new_v4().to_string(),
            payload,
            visible_at: Instant::now(),
        });
        Ok(())
    }

    async fn pull(&self, visibility: Duration) -> Result<Option<QueueMessage>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        for entry in entries.iter_mut() {
            if entry.visible_at <= now {
                entry.visible_at = now + visibility;
                return Ok(Some(QueueMessage {
                    receipt: entry.receipt.clone(),
                    payload: entry.payload.clone(),
                }));
            }
        }
        Ok(None)
    }

    async fn delete(&self, message: &QueueMessage) -> Result<()> {
        self.entries
            .lock()
            .retain(|entry| entry.receipt != message.receipt);
        Ok(())
    }
}
