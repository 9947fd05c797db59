use std::env;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::analytics::{DEFAULT_FANOUT_FACTOR, DEFAULT_GRID_THRESHOLDS, DEFAULT_SHARD_DURATION};

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sequence: SequenceConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// 对外的短链域名，同时是命名空间令牌
    #[serde(default = "default_service_host")]
    pub host: String,
    /// 生成 code 冲突时的总尝试次数
    #[serde(default = "default_create_retries")]
    pub create_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    #[serde(default = "default_sequence_id")]
    pub id: String,
    /// 空字符串表示使用内置字母表
    #[serde(default)]
    pub letters: String,
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_sequence_retries")]
    pub retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_shard_duration")]
    pub shard_duration_secs: i64,
    #[serde(default = "default_grid_thresholds")]
    pub grid_thresholds: Vec<i64>,
    #[serde(default = "default_fanout_factor")]
    pub fanout_factor: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_backend")]
    pub backend: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_queue_name")]
    pub name: String,
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_service_host() -> String {
    "localhost:8080".to_string()
}

fn default_create_retries() -> u32 {
    10
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_key_prefix() -> String {
    "gridlink:".to_string()
}

fn default_sequence_id() -> String {
    "centralized".to_string()
}

fn default_min_length() -> usize {
    1
}

fn default_max_length() -> usize {
    1024
}

fn default_sequence_retries() -> u32 {
    3
}

fn default_shard_duration() -> i64 {
    DEFAULT_SHARD_DURATION
}

fn default_grid_thresholds() -> Vec<i64> {
    DEFAULT_GRID_THRESHOLDS.to_vec()
}

fn default_fanout_factor() -> i64 {
    DEFAULT_FANOUT_FACTOR
}

fn default_queue_backend() -> String {
    "memory".to_string()
}

fn default_queue_name() -> String {
    "urls".to_string()
}

fn default_visibility_timeout() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    1000
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_service_host(),
            create_retries: default_create_retries(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            id: default_sequence_id(),
            letters: String::new(),
            min_length: default_min_length(),
            max_length: default_max_length(),
            retries: default_sequence_retries(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            shard_duration_secs: default_shard_duration(),
            grid_thresholds: default_grid_thresholds(),
            fanout_factor: default_fanout_factor(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: default_queue_backend(),
            redis_url: default_redis_url(),
            name: default_queue_name(),
            visibility_timeout_secs: default_visibility_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file with environment variable fallback
    pub fn load() -> Self {
        let mut config = Self::load_from_file();
        config.override_with_env();
        config
    }

    fn load_from_file() -> Self {
        let config_paths = ["gridlink.toml", "config.toml", "/etc/gridlink/config.toml"];

        for path in &config_paths {
            if Path::new(path).exists() {
                debug!("Loading config from: {}", path);
                match fs::read_to_string(path) {
                    Ok(content) => match toml::from_str::<AppConfig>(&content) {
                        Ok(config) => return config,
                        Err(e) => warn!("Failed to parse config file {}: {}", path, e),
                    },
                    Err(e) => warn!("Failed to read config file {}: {}", path, e),
                }
            }
        }

        debug!("No config file found, using defaults");
        Self::default()
    }

    fn override_with_env(&mut self) {
        if let Ok(host) = env::var("GRIDLINK_HOST") {
            self.service.host = host;
        }
        if let Ok(retries) = env::var("CREATE_RETRIES") {
            match retries.parse() {
                Ok(retries) => self.service.create_retries = retries,
                Err(_) => error!("Invalid CREATE_RETRIES: {}", retries),
            }
        }

        if let Ok(backend) = env::var("STORAGE_BACKEND") {
            self.storage.backend = backend;
        }
        if let Ok(url) = env::var("REDIS_URL") {
            self.storage.redis_url = url.clone();
            self.queue.redis_url = url;
        }
        if let Ok(prefix) = env::var("REDIS_KEY_PREFIX") {
            self.storage.key_prefix = prefix;
        }

        if let Ok(id) = env::var("SEQUENCE_ID") {
            self.sequence.id = id;
        }
        if let Ok(letters) = env::var("SEQUENCE_LETTERS") {
            self.sequence.letters = letters;
        }

        if let Ok(duration) = env::var("SHARD_DURATION_SECS") {
            match duration.parse() {
                Ok(duration) => self.analytics.shard_duration_secs = duration,
                Err(_) => error!("Invalid SHARD_DURATION_SECS: {}", duration),
            }
        }
        if let Ok(fanout) = env::var("FANOUT_FACTOR") {
            match fanout.parse() {
                Ok(fanout) => self.analytics.fanout_factor = fanout,
                Err(_) => error!("Invalid FANOUT_FACTOR: {}", fanout),
            }
        }

        if let Ok(backend) = env::var("QUEUE_BACKEND") {
            self.queue.backend = backend;
        }
        if let Ok(name) = env::var("QUEUE_NAME") {
            self.queue.name = name;
        }
        if let Ok(timeout) = env::var("QUEUE_VISIBILITY_TIMEOUT") {
            match timeout.parse() {
                Ok(timeout) => self.queue.visibility_timeout_secs = timeout,
                Err(_) => error!("Invalid QUEUE_VISIBILITY_TIMEOUT: {}", timeout),
            }
        }
    }
}

/// 进程级配置；首次调用时加载
pub fn get_config() -> &'static AppConfig {
    CONFIG.get_or_init(AppConfig::load)
}
