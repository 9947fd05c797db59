//! 缩短与解析
//!
//! Shortener 只是把生成器、URL 存储和注册表装配到一起的薄壳。它对
//! 多域名部署一无所知，那由外面的命名空间包装层完成。

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analytics::Registry;
use crate::errors::{GridlinkError, Result};
use crate::generator::Generator;
use crate::storage::{Item, Storage, StorageId, StorageOps};
use crate::utils::url::validate_target;

/// 一条缩短记录。创建后不再变更，解析时按 code 取回。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub code: String,
    pub url: String,
    pub host: String,
    pub created_ts: i64,
    #[serde(default)]
    pub remote_addr: Option<String>,
    #[serde(default)]
    pub remote_port: Option<u16>,
}

impl UrlRecord {
    pub fn shortcut(&self) -> String {
        format!("http://{}/{}", self.host, self.code)
    }

    pub fn to_item(&self) -> Item {
        let mut item = Item::from_pairs([
            ("code", self.code.clone()),
            ("url", self.url.clone()),
            ("host", self.host.clone()),
            ("created_ts", self.created_ts.to_string()),
        ]);
        if let Some(addr) = &self.remote_addr {
            item.set("remote_addr", addr.clone());
        }
        if let Some(port) = self.remote_port {
            item.set("remote_port", port.to_string());
        }
        item
    }

    pub fn from_item(item: &Item) -> Result<Self> {
        let field = |name: &str| {
            item.get(name).map(str::to_string).ok_or_else(|| {
                GridlinkError::serialization(format!("Url record has no '{name}' field."))
            })
        };
        Ok(Self {
            code: field("code")?,
            url: field("url")?,
            host: field("host")?,
            created_ts: item.get_i64("created_ts").unwrap_or(0),
            remote_addr: item.get("remote_addr").map(str::to_string),
            remote_port: item.get("remote_port").and_then(|p| p.parse().ok()),
        })
    }
}

pub struct Shortener {
    storage: Arc<dyn Storage>,
    generator: Arc<dyn Generator>,
    registry: Arc<dyn Registry>,
    host: String,
    retries: u32,
}

impl Shortener {
    pub fn new(
        storage: Arc<dyn Storage>,
        generator: Arc<dyn Generator>,
        registry: Arc<dyn Registry>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            generator,
            registry,
            host: host.into(),
            retries: 10,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// 按 code 解析一条记录；不存在返回 IdAbsent
    pub async fn resolve(&self, code: &str) -> Result<UrlRecord> {
        match self.storage.fetch(&StorageId::scalar(code)).await {
            Ok(item) => UrlRecord::from_item(&item),
            Err(GridlinkError::ItemAbsent(_)) => Err(GridlinkError::id_absent(format!(
                "Such url does not exist: '{code}'."
            ))),
            Err(e) => Err(e),
        }
    }

    /// 缩短一条长 URL，保存并登记后返回完整记录。
    ///
    /// 生成器保证的只是自己产出内部不重复；存储里可能早有手工指定
    /// 或旧算法留下的同名 code，唯一的可靠检查就是带条件写入试着存，
    /// 冲突时重新生成。调用方自己指定 code 时只试一次，冲突即返回
    /// IdAlreadyExists。
    pub async fn shorten(
        &self,
        url: &str,
        wanted_code: Option<&str>,
        remote_addr: Option<String>,
        remote_port: Option<u16>,
    ) -> Result<UrlRecord> {
        validate_target(url)?;

        let retries = if wanted_code.is_some() { 1 } else { self.retries };
        let generator = self.generator.as_ref();
        let host = self.host.as_str();
        let remote_addr = &remote_addr;
        let created = self
            .storage
            .create(retries, move || async move {
                let code = match wanted_code {
                    Some(code) => code.to_string(),
                    None => generator.generate().await?,
                };
                let record = UrlRecord {
                    code: code.clone(),
                    url: url.to_string(),
                    host: host.to_string(),
                    created_ts: Utc::now().timestamp(),
                    remote_addr: remote_addr.clone(),
                    remote_port,
                };
                Ok((StorageId::scalar(code), record.to_item()))
            })
            .await;

        let item = match created {
            Ok(item) => item,
            Err(GridlinkError::UniquenessViolation(msg)) => {
                return Err(match wanted_code {
                    Some(code) => GridlinkError::id_already_exists(format!(
                        "The id '{code}' exists already, try another one."
                    )),
                    None => GridlinkError::UniquenessViolation(msg),
                });
            }
            Err(e) => return Err(e),
        };

        let record = UrlRecord::from_item(&item)?;
        info!("Shortened '{}' as '{}'", record.url, record.shortcut());

        // 登记到注册表：直连分析时立即更新，通知器则只入队
        self.registry.register(&record).await?;
        Ok(record)
    }
}
