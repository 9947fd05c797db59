//! Redis 后端
//!
//! 条目保存为 hash，条件写入用一段 Lua 脚本在服务端完成“比较 +
//! 写入”，对并发调用方是原子的。批量读取用 pipeline 按 20 个一批
//! 发送。select 不支持，这是纯键值后端允许的取舍。

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use tracing::debug;

use crate::errors::{GridlinkError, Result};
use crate::storage::{
    chunk, stamp_id_fields, Item, SortOrder, Storage, StorageId, StoreMode, MULTI_FETCH_LIMIT,
};

/// 先校验期望（字段等于给定值，或字段缺失），再清掉将被覆盖字段的
/// 陈旧分片，最后写入全部字段。返回 0 表示期望未满足。
///
/// 期望比较的是原始属性，所以作为写入条件的字段必须在单个分片内。
const STORE_SCRIPT: &str = r#"
local mode = ARGV[1]
if mode == 'expect' then
  local cur = redis.call('HGET', KEYS[1], ARGV[2])
  if cur == false or cur ~= ARGV[3] then return 0 end
elseif mode == 'absent' then
  if redis.call('HEXISTS', KEYS[1], ARGV[2]) == 1 then return 0 end
end
local existing = redis.call('HKEYS', KEYS[1])
local i = 4
while i <= #ARGV do
  local base = ARGV[i]
  local pos = string.find(base, '#', 1, true)
  if pos then base = string.sub(base, 1, pos - 1) end
  for _, key in ipairs(existing) do
    if key == base or string.sub(key, 1, #base + 1) == base .. '#' then
      redis.call('HDEL', KEYS[1], key)
    end
  end
  i = i + 2
end
i = 4
while i <= #ARGV do
  redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
  i = i + 2
end
return 1
"#;

pub struct RedisStorage {
    connection: ConnectionManager,
    key_prefix: String,
    store_script: redis::Script,
}

impl RedisStorage {
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| GridlinkError::storage_connection(format!("Invalid redis URL: {e}")))?;
        let connection = client.get_connection_manager().await?;
        debug!("Redis storage connected with prefix '{}'", key_prefix);
        Ok(Self {
            connection,
            key_prefix: key_prefix.to_string(),
            store_script: redis::Script::new(STORE_SCRIPT),
        })
    }

    fn make_key(&self, id: &StorageId) -> String {
        format!("{}{}", self.key_prefix, id.key())
    }

    fn to_item(raw: HashMap<String, String>) -> Item {
        chunk::rejoin_fields(raw.into_iter().collect())
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn fetch(&self, id: &StorageId) -> Result<Item> {
        let mut conn = self.connection.clone();
        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.make_key(id))
            .query_async(&mut conn)
            .await?;
        if raw.is_empty() {
            return Err(GridlinkError::item_absent(format!(
                "The item '{id}' is not found."
            )));
        }
        Ok(Self::to_item(raw))
    }

    async fn multi_fetch(&self, ids: &[StorageId]) -> Result<Vec<Item>> {
        let mut conn = self.connection.clone();
        let mut result = Vec::new();
        for batch in ids.chunks(MULTI_FETCH_LIMIT) {
            let mut pipe = redis::pipe();
            for id in batch {
                pipe.cmd("HGETALL").arg(self.make_key(id));
            }
            let raws: Vec<HashMap<String, String>> = pipe.query_async(&mut conn).await?;
            result.extend(
                raws.into_iter()
                    .filter(|raw| !raw.is_empty())
                    .map(Self::to_item),
            );
        }
        Ok(result)
    }

    async fn store(&self, id: &StorageId, mut value: Item, mode: StoreMode) -> Result<()> {
        stamp_id_fields(id, &mut value);
        let split = chunk::split_fields(&value);

        let (mode_name, field, expected) = match &mode {
            StoreMode::Plain => ("plain", "", String::new()),
            StoreMode::Expect {
                field,
                value: Some(expected),
            } => ("expect", field.as_str(), expected.clone()),
            StoreMode::Expect { field, value: None } => ("absent", field.as_str(), String::new()),
            StoreMode::Unique { field } => ("absent", field.as_str(), String::new()),
        };

        let mut invocation = self.store_script.key(self.make_key(id));
        invocation.arg(mode_name).arg(field).arg(expected);
        for (name, field_value) in split.iter() {
            invocation.arg(name).arg(field_value);
        }

        let mut conn = self.connection.clone();
        let accepted: i64 = invocation.invoke_async(&mut conn).await?;
        if accepted == 0 {
            return Err(GridlinkError::expectation_failed(format!(
                "Store expectation failed for item '{id}'."
            )));
        }
        Ok(())
    }

    async fn select(
        &self,
        _filters: &[(String, String)],
        _sorters: &[(String, SortOrder)],
        _limit: Option<usize>,
    ) -> Result<Vec<Item>> {
        Err(GridlinkError::unsupported(
            "The redis backend does not support select; use a select-capable backend for range dimensions.",
        ))
    }

    fn backend_name(&self) -> String {
        "redis".to_string()
    }
}
