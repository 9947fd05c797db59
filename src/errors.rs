use std::fmt;

#[derive(Debug, Clone)]
pub enum GridlinkError {
    ItemAbsent(String),
    ExpectationFailed(String),
    UniquenessViolation(String),
    SequenceDepleted(String),
    BadUrl(String),
    IdAbsent(String),
    IdAlreadyExists(String),
    Unsupported(String),
    StorageConnection(String),
    StorageOperation(String),
    StoragePluginNotFound(String),
    QueueOperation(String),
    Serialization(String),
    Configuration(String),
}

impl GridlinkError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            GridlinkError::ItemAbsent(_) => "E001",
            GridlinkError::ExpectationFailed(_) => "E002",
            GridlinkError::UniquenessViolation(_) => "E003",
            GridlinkError::SequenceDepleted(_) => "E004",
            GridlinkError::BadUrl(_) => "E005",
            GridlinkError::IdAbsent(_) => "E006",
            GridlinkError::IdAlreadyExists(_) => "E007",
            GridlinkError::Unsupported(_) => "E008",
            GridlinkError::StorageConnection(_) => "E009",
            GridlinkError::StorageOperation(_) => "E010",
            GridlinkError::StoragePluginNotFound(_) => "E011",
            GridlinkError::QueueOperation(_) => "E012",
            GridlinkError::Serialization(_) => "E013",
            GridlinkError::Configuration(_) => "E014",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            GridlinkError::ItemAbsent(_) => "Item Absent",
            GridlinkError::ExpectationFailed(_) => "Expectation Failed",
            GridlinkError::UniquenessViolation(_) => "Uniqueness Violation",
            GridlinkError::SequenceDepleted(_) => "Sequence Depleted",
            GridlinkError::BadUrl(_) => "Bad URL",
            GridlinkError::IdAbsent(_) => "Id Absent",
            GridlinkError::IdAlreadyExists(_) => "Id Already Exists",
            GridlinkError::Unsupported(_) => "Operation Unsupported",
            GridlinkError::StorageConnection(_) => "Storage Connection Error",
            GridlinkError::StorageOperation(_) => "Storage Operation Error",
            GridlinkError::StoragePluginNotFound(_) => "Storage Plugin Not Found",
            GridlinkError::QueueOperation(_) => "Queue Operation Error",
            GridlinkError::Serialization(_) => "Serialization Error",
            GridlinkError::Configuration(_) => "Configuration Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            GridlinkError::ItemAbsent(msg)
            | GridlinkError::ExpectationFailed(msg)
            | GridlinkError::UniquenessViolation(msg)
            | GridlinkError::SequenceDepleted(msg)
            | GridlinkError::BadUrl(msg)
            | GridlinkError::IdAbsent(msg)
            | GridlinkError::IdAlreadyExists(msg)
            | GridlinkError::Unsupported(msg)
            | GridlinkError::StorageConnection(msg)
            | GridlinkError::StorageOperation(msg)
            | GridlinkError::StoragePluginNotFound(msg)
            | GridlinkError::QueueOperation(msg)
            | GridlinkError::Serialization(msg)
            | GridlinkError::Configuration(msg) => msg,
        }
    }

    /// 条件写入冲突可以在重试循环中恢复，其余错误不行
    pub fn is_conflict(&self) -> bool {
        matches!(self, GridlinkError::ExpectationFailed(_))
    }

    /// 格式化为简洁输出（用于 CLI 模式）
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for GridlinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for GridlinkError {}

// 便捷的构造函数
impl GridlinkError {
    pub fn item_absent<T: Into<String>>(msg: T) -> Self {
        GridlinkError::ItemAbsent(msg.into())
    }

    pub fn expectation_failed<T: Into<String>>(msg: T) -> Self {
        GridlinkError::ExpectationFailed(msg.into())
    }

    pub fn uniqueness_violation<T: Into<String>>(msg: T) -> Self {
        GridlinkError::UniquenessViolation(msg.into())
    }

    pub fn sequence_depleted<T: Into<String>>(msg: T) -> Self {
        GridlinkError::SequenceDepleted(msg.into())
    }

    pub fn bad_url<T: Into<String>>(msg: T) -> Self {
        GridlinkError::BadUrl(msg.into())
    }

    pub fn id_absent<T: Into<String>>(msg: T) -> Self {
        GridlinkError::IdAbsent(msg.into())
    }

    pub fn id_already_exists<T: Into<String>>(msg: T) -> Self {
        GridlinkError::IdAlreadyExists(msg.into())
    }

    pub fn unsupported<T: Into<String>>(msg: T) -> Self {
        GridlinkError::Unsupported(msg.into())
    }

    pub fn storage_connection<T: Into<String>>(msg: T) -> Self {
        GridlinkError::StorageConnection(msg.into())
    }

    pub fn storage_operation<T: Into<String>>(msg: T) -> Self {
        GridlinkError::StorageOperation(msg.into())
    }

    pub fn storage_plugin_not_found<T: Into<String>>(msg: T) -> Self {
        GridlinkError::StoragePluginNotFound(msg.into())
    }

    pub fn queue_operation<T: Into<String>>(msg: T) -> Self {
        GridlinkError::QueueOperation(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        GridlinkError::Serialization(msg.into())
    }

    pub fn configuration<T: Into<String>>(msg: T) -> Self {
        GridlinkError::Configuration(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<serde_json::Error> for GridlinkError {
    fn from(err: serde_json::Error) -> Self {
        GridlinkError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for GridlinkError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_timeout() {
            GridlinkError::StorageConnection(err.to_string())
        } else {
            GridlinkError::StorageOperation(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, GridlinkError>;
