//! 存储 ID 抽象
//!
//! 一个 ID 同时支持两种投影：字符串形式（键值后端的物理键）和字段映射
//! 形式（关系后端的复合主键）。两个 ID 相等当且仅当字段映射相等。

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// 保留字段名，命名空间包装层会占用它
pub const NAMESPACE_FIELD: &str = "host";

/// 有序的字段/值对集合。
///
/// 标量 ID 只有一个 `id` 字段；复合 ID（如 `(time_shard, domain)`）按
/// 构造顺序保存字段，字符串投影是各字段值用 `_` 连接的结果。
#[derive(Debug, Clone)]
pub struct StorageId {
    parts: Vec<(String, String)>,
}

impl StorageId {
    pub fn scalar<V: Into<String>>(value: V) -> Self {
        Self {
            parts: vec![("id".to_string(), value.into())],
        }
    }

    pub fn compound<I, K, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            parts: parts
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// 字符串投影：各字段值按顺序用 `_` 连接
    pub fn key(&self) -> String {
        self.parts
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join("_")
    }

    /// 字段映射投影
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parts.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.parts
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// 在最前面加入命名空间字段；同名字段若已存在则被替换。
    ///
    /// 字符串投影随之变为 `namespace + "_" + 原投影`。
    pub fn namespaced<V: Into<String>>(&self, field: &str, value: V) -> Self {
        let mut parts: Vec<(String, String)> = vec![(field.to_string(), value.into())];
        parts.extend(
            self.parts
                .iter()
                .filter(|(k, _)| k != field)
                .cloned(),
        );
        Self { parts }
    }

    fn field_map(&self) -> BTreeMap<&str, &str> {
        self.fields().collect()
    }
}

impl PartialEq for StorageId {
    fn eq(&self, other: &Self) -> bool {
        self.field_map() == other.field_map()
    }
}

impl Eq for StorageId {}

impl Hash for StorageId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for (k, v) in self.field_map() {
            k.hash(state);
            v.hash(state);
        }
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl From<&str> for StorageId {
    fn from(value: &str) -> Self {
        Self::scalar(value)
    }
}

impl From<String> for StorageId {
    fn from(value: String) -> Self {
        Self::scalar(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_projections() {
        let id = StorageId::scalar("abc");
        assert_eq!(id.key(), "abc");
        assert_eq!(id.field("id"), Some("abc"));
    }

    #[test]
    fn compound_projections() {
        let id = StorageId::compound([("time_shard", "43200"), ("domain", "example.com")]);
        assert_eq!(id.key(), "43200_example.com");
        assert_eq!(id.field("domain"), Some("example.com"));
    }

    #[test]
    fn namespacing_prefixes_key_and_field_map() {
        let id = StorageId::compound([("time_shard", "0"), ("grid_level", "2")])
            .namespaced(NAMESPACE_FIELD, "sho.rt");
        assert_eq!(id.key(), "sho.rt_0_2");
        assert_eq!(id.field(NAMESPACE_FIELD), Some("sho.rt"));
        assert_eq!(id.field("grid_level"), Some("2"));
    }

    #[test]
    fn namespacing_replaces_existing_field() {
        let id = StorageId::compound([("host", "old"), ("id", "x")]).namespaced("host", "new");
        assert_eq!(id.field("host"), Some("new"));
        assert_eq!(id.key(), "new_x");
    }

    #[test]
    fn equality_is_field_map_equality() {
        let a = StorageId::compound([("time_shard", "0"), ("domain", "a.com")]);
        let b = StorageId::compound([("domain", "a.com"), ("time_shard", "0")]);
        assert_eq!(a, b);
        assert_ne!(a, StorageId::compound([("time_shard", "0"), ("domain", "b.com")]));
    }
}
