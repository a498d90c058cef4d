//! 错误处理模块
//!
//! 定义翻译库中使用的错误类型和错误处理机制。
//!
//! 单个文本片段的翻译失败会在编排层被吸收（回退为原文并计数），
//! 只有缓存文件 I/O 错误和用户取消会传播到最上层调用者。

use std::path::PathBuf;

use thiserror::Error;

/// 翻译错误类型
///
/// # 变体说明
///
/// * `Connectivity` - 翻译服务不可达或超时，批量流程会转入启发式回退
/// * `EmptyResult` - 服务返回了空结果，按单条失败处理
/// * `Api` - 服务返回非 2xx 状态码
/// * `Http` - 其他 HTTP 传输错误
/// * `Serialization` - 缓存文件损坏或无法序列化
/// * `Filesystem` - 缓存文件读写失败
/// * `Config` - 配置错误
/// * `Parse` - 文档解析错误
/// * `Cancelled` - 调用方取消或超过截止时间
#[derive(Debug, Error)]
pub enum TranslationError {
    /// 翻译服务不可达
    #[error("无法连接翻译服务: {0}")]
    Connectivity(String),

    /// 翻译服务没有返回任何候选结果
    #[error("翻译服务返回了空的翻译结果")]
    EmptyResult,

    /// API 响应错误
    #[error("API错误 {code}: {message}")]
    Api {
        /// HTTP 状态码
        code: u16,
        /// 错误消息
        message: String,
    },

    /// HTTP 请求错误
    #[error("HTTP错误: {0}")]
    Http(reqwest::Error),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 文件系统错误
    #[error("文件系统错误 {}: {source}", .path.display())]
    Filesystem {
        /// 出错的文件路径
        path: PathBuf,
        /// 底层 I/O 错误
        #[source]
        source: std::io::Error,
    },

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 解析错误
    #[error("解析错误: {0}")]
    Parse(String),

    /// 操作被取消
    #[error("操作已取消")]
    Cancelled,
}

impl TranslationError {
    /// 构造文件系统错误
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TranslationError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// 是否为连接性错误（服务整体不可达）
    pub fn is_connectivity(&self) -> bool {
        matches!(self, TranslationError::Connectivity(_))
    }

    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::Connectivity(_) => true,
            TranslationError::Http(_) => true,
            TranslationError::Api { code, .. } => *code == 429 || *code >= 500,
            TranslationError::EmptyResult => false,
            TranslationError::Serialization(_) => false,
            TranslationError::Filesystem { .. } => false,
            TranslationError::Config(_) => false,
            TranslationError::Parse(_) => false,
            TranslationError::Cancelled => false,
        }
    }
}

impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() {
            TranslationError::Connectivity(error.to_string())
        } else {
            TranslationError::Http(error)
        }
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::Config(error.to_string())
    }
}

impl From<toml::ser::Error> for TranslationError {
    fn from(error: toml::ser::Error) -> Self {
        TranslationError::Config(error.to_string())
    }
}

/// 翻译结果类型别名
///
/// 简化返回类型，使用 `TranslationError` 作为错误类型。
///
/// # 示例
///
/// ```rust
/// use blog_translator::{Result, TranslationError};
///
/// fn example_function() -> Result<String> {
///     Err(TranslationError::EmptyResult)
/// }
///
/// assert!(example_function().is_err());
/// ```
pub type Result<T> = std::result::Result<T, TranslationError>;
