//! 长属性的切分与重组
//!
//! 键值后端对单个属性有 1024 字节的上限。超长的值在写入时被切成
//! `字段名#字节偏移` 形式的编号分片，读取时按偏移重组回原值。
//! 分片对上层完全透明；字段名中的 `#` 因此是保留字符。

use crate::storage::Item;

/// 单个属性的最大字节数
pub const CHUNK_LIMIT: usize = 1024;

const CHUNK_MARKER: char = '#';

/// 把超过上限的字段展开为编号分片
pub fn split_fields(item: &Item) -> Item {
    let mut out = Item::new();
    for (name, value) in item.iter() {
        if value.len() <= CHUNK_LIMIT {
            out.set(name, value);
            continue;
        }
        for (offset, piece) in split_value(value) {
            out.set(format!("{name}{CHUNK_MARKER}{offset}"), piece);
        }
    }
    out
}

/// 把编号分片折叠回完整字段值
pub fn rejoin_fields(raw: Item) -> Item {
    let mut plain = Item::new();
    // 字段名 -> (偏移, 分片) 列表
    let mut chunked: Vec<(String, Vec<(usize, String)>)> = Vec::new();

    for (name, value) in raw.into_iter() {
        let parsed = name
            .split_once(CHUNK_MARKER)
            .and_then(|(base, offset)| offset.parse::<usize>().ok().map(|o| (base.to_string(), o)));
        match parsed {
            Some((base, offset)) => {
                match chunked.iter_mut().find(|(b, _)| *b == base) {
                    Some((_, pieces)) => pieces.push((offset, value)),
                    None => chunked.push((base, vec![(offset, value)])),
                }
            }
            None => plain.set(name, value),
        }
    }

    for (base, mut pieces) in chunked {
        // 偏移必须按数值排序，字典序会把 10240 排在 2048 前面
        pieces.sort_by_key(|(offset, _)| *offset);
        let joined: String = pieces.into_iter().map(|(_, piece)| piece).collect();
        plain.set(base, joined);
    }
    plain
}

/// 按字节预算切分，但不拆开多字节字符
fn split_value(value: &str) -> Vec<(usize, String)> {
    let mut pieces = Vec::new();
    let mut offset = 0;
    let mut current = String::new();
    for ch in value.chars() {
        if current.len() + ch.len_utf8() > CHUNK_LIMIT {
            let piece_len = current.len();
            pieces.push((offset, std::mem::take(&mut current)));
            offset += piece_len;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        pieces.push((offset, current));
    }
    pieces
}
