//! 字母表序列
//!
//! 在存储里的一个固定条目上维护双射 base-k 计数器：每个字符串都是
//! 一个合法的计数值，后继由末位字符在字母表里进位得到。并发调用方
//! 通过条件写入串行化，这一个热点键就是整个系统的生成吞吐上限，
//! 是有意保留的简单设计。

use std::sync::Arc;

use crate::errors::{GridlinkError, Result};
use crate::storage::{Item, Storage, StorageId, StorageOps, VALUE_FIELD};

pub const LOWERS: &str = "abcdefghijklmnopqrstuvwxyz";
pub const UPPERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const DIGITS: &str = "0123456789";
/// 这些标点在 URL 路径里无需转义
pub const SPECIAL: &str = "$-_.+!*'(),";

/// 默认字母表：小写 + 大写 + 数字 + 安全标点
pub fn default_alphabet() -> String {
    format!("{LOWERS}{UPPERS}{DIGITS}{SPECIAL}")
}

/// 判定某个产出值是否被禁止使用
pub type ProhibitFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

pub struct Sequence {
    storage: Arc<dyn Storage>,
    id: StorageId,
    letters: Vec<char>,
    min_length: usize,
    max_length: usize,
    retries: u32,
    prohibit: Option<ProhibitFn>,
}

impl Sequence {
    pub fn new<I: Into<StorageId>>(storage: Arc<dyn Storage>, id: I) -> Self {
        Self {
            storage,
            id: id.into(),
            letters: default_alphabet().chars().collect(),
            min_length: 1,
            max_length: 1024,
            retries: 3,
            prohibit: None,
        }
    }

    /// 字母表必须非空且无重复字符
    pub fn with_letters(mut self, letters: &str) -> Self {
        self.letters = letters.chars().collect();
        assert!(!self.letters.is_empty(), "sequence alphabet must not be empty");
        self
    }

    pub fn with_lengths(mut self, min_length: usize, max_length: usize) -> Self {
        self.min_length = min_length.max(1);
        self.max_length = max_length;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// 被禁止的值会被跳过：继续取后继直到不再命中。
    ///
    /// 如果序列空间里有一整段连续值都命中谓词，生成就退化为逐个
    /// 迭代整段，这是已知的最坏情况开销，调用方定义谓词时要心里有数。
    pub fn with_prohibit(mut self, prohibit: ProhibitFn) -> Self {
        self.prohibit = Some(prohibit);
        self
    }

    /// 推进序列并返回新产出的值。
    ///
    /// 冲突重试耗尽时返回 ExpectationFailed；长度越过上限时返回
    /// SequenceDepleted，后者是终态，不参与重试。
    pub async fn generate(&self) -> Result<String> {
        let changes = self
            .storage
            .update(&self.id, VALUE_FIELD, self.retries, |item| {
                let next = self.advance(item.get(VALUE_FIELD))?;
                Ok(Item::from_pairs([(VALUE_FIELD, next)]))
            })
            .await?;
        changes
            .get(VALUE_FIELD)
            .map(str::to_string)
            .ok_or_else(|| {
                GridlinkError::storage_operation(format!(
                    "Sequence '{}' update produced no value.",
                    self.id
                ))
            })
    }

    fn advance(&self, current: Option<&str>) -> Result<String> {
        let mut candidate = match current {
            None | Some("") => self.letters[0].to_string().repeat(self.min_length),
            Some(value) => self.successor(value)?,
        };
        while self.prohibit.as_deref().is_some_and(|p| p(&candidate)) {
            candidate = self.successor(&candidate)?;
        }
        Ok(candidate)
    }

    /// 双射 base-k 后继：末位进一；溢出则向前进位；进位越过首位时
    /// 在最前面补上字母表首字符，长度加一。
    fn successor(&self, value: &str) -> Result<String> {
        let mut chars: Vec<char> = value.chars().collect();
        let mut index = chars.len();
        loop {
            if index == 0 {
                chars.insert(0, self.letters[0]);
                break;
            }
            // 字母表之外的字符视同表尾字符，直接进位
            let pos = self
                .letters
                .iter()
                .position(|&c| c == chars[index - 1])
                .unwrap_or(self.letters.len() - 1);
            if pos + 1 < self.letters.len() {
                chars[index - 1] = self.letters[pos + 1];
                break;
            }
            chars[index - 1] = self.letters[0];
            index -= 1;
        }
        if chars.len() > self.max_length {
            return Err(GridlinkError::sequence_depleted(format!(
                "Sequence '{}' is depleted.",
                self.id
            )));
        }
        Ok(chars.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn sequence(letters: &str) -> Sequence {
        Sequence::new(Arc::new(MemoryStorage::new()), "seq").with_letters(letters)
    }

    #[test]
    fn successor_carries_through_the_alphabet() {
        let seq = sequence("ab");
        assert_eq!(seq.successor("a").unwrap(), "b");
        assert_eq!(seq.successor("b").unwrap(), "aa");
        assert_eq!(seq.successor("aa").unwrap(), "ab");
        assert_eq!(seq.successor("ab").unwrap(), "ba");
        assert_eq!(seq.successor("bb").unwrap(), "aaa");
    }

    #[test]
    fn successor_treats_foreign_characters_as_final() {
        let seq = sequence("ab");
        assert_eq!(seq.successor("a?").unwrap(), "ba");
    }

    #[test]
    fn depletion_is_terminal() {
        let seq = sequence("ab").with_lengths(1, 2);
        assert!(matches!(
            seq.successor("bb"),
            Err(GridlinkError::SequenceDepleted(_))
        ));
    }
}
