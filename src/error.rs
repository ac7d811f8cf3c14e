//! 错误类型
//!
//! 按流水线阶段划分：提取 / 渲染 / API / 写入 / 配置。
//!
//! 单篇文献的失败在编排层被捕获并记录为 [`DocumentFailure`]，批次继续；
//! 只有会让剩余所有文献必然失败的错误（认证失败、输入目录不可读、输出目录不可写）
//! 才会被升级为批次致命错误。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// PDF 文本提取错误
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// 文件无法打开或不是有效的 PDF
    #[error("无法打开 PDF ({path}): {message}")]
    Unreadable { path: String, message: String },

    /// 单页提取失败
    #[error("第 {page} 页文本提取失败: {message}")]
    PageFailed { page: u32, message: String },

    /// 没有文本层（扫描件或纯图片）
    #[error("PDF 中没有可提取的文本 (可能是扫描件): {path}")]
    NoText { path: String },

    /// 提取任务被中断
    #[error("提取任务异常终止: {0}")]
    TaskFailed(String),
}

/// 提示词模板渲染错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("模板包含未知占位符: {{{0}}}")]
    UnknownPlaceholder(String),

    #[error("模板缺少必需的占位符: {{{0}}}")]
    MissingPlaceholder(String),

    #[error("模板第 {0} 个字符处的花括号未闭合")]
    UnbalancedBrace(usize),
}

/// API 失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiFailureKind {
    /// 请求超时
    Timeout,
    /// 凭证无效，重试和换文献都无济于事
    AuthError,
    /// 请求频率限制
    RateLimited,
    /// 响应无法使用（格式错误、内容为空、请求被拒绝）
    MalformedResponse,
    /// 连接失败或服务端错误
    NetworkError,
}

impl ApiFailureKind {
    /// 是否值得用同一个请求再试一次
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ApiFailureKind::Timeout | ApiFailureKind::RateLimited | ApiFailureKind::NetworkError
        )
    }

    /// 是否会让整个批次中止
    pub fn is_batch_fatal(self) -> bool {
        matches!(self, ApiFailureKind::AuthError)
    }
}

impl fmt::Display for ApiFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApiFailureKind::Timeout => "请求超时",
            ApiFailureKind::AuthError => "认证失败",
            ApiFailureKind::RateLimited => "频率限制",
            ApiFailureKind::MalformedResponse => "响应格式错误",
            ApiFailureKind::NetworkError => "网络错误",
        };
        f.write_str(name)
    }
}

/// API 调用失败（已分类）
#[derive(Debug, Clone, Error)]
#[error("{kind} (共尝试 {attempts} 次): {message}")]
pub struct ApiFailure {
    pub kind: ApiFailureKind,
    pub message: String,
    pub attempts: u32,
    /// 服务端通过 Retry-After 给出的等待时间
    pub retry_after: Option<Duration>,
}

impl ApiFailure {
    pub fn new(kind: ApiFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts: 1,
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ApiFailureKind::Timeout, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ApiFailureKind::AuthError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ApiFailureKind::RateLimited, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ApiFailureKind::MalformedResponse, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiFailureKind::NetworkError, message)
    }
}

/// 结果写入错误
#[derive(Debug, Error)]
pub enum WriteError {
    /// 目标目录本身不可写，之后的文献也一定会失败
    #[error("输出目录不可写 ({}): {source}", path.display())]
    DirectoryUnwritable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// 单个文件写入失败
    #[error("写入文件失败 ({}): {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("序列化批次报告失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl WriteError {
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, WriteError::DirectoryUnwritable { .. })
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件未找到: {}", .0.display())]
    NotFound(PathBuf),

    #[error("读取配置文件失败 ({}): {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("配置文件格式错误 ({}): {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("配置项 {field} 无效: {reason}")]
    Invalid { field: String, reason: String },

    #[error("请在配置文件中设置有效的 API 密钥 (api.api_key 或环境变量 LLM_API_KEY)")]
    MissingApiKey,

    #[error("提示词模板文件读取失败 ({}): {source}", path.display())]
    TemplateUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("提示词模板 {name} 无效: {source}")]
    InvalidTemplate { name: String, source: RenderError },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 单篇文献失败所在的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Extraction,
    Render,
    Api,
    Write,
    /// 处理任务异常终止
    Task,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureStage::Extraction => "文本提取",
            FailureStage::Render => "提示词渲染",
            FailureStage::Api => "AI 分析",
            FailureStage::Write => "结果写入",
            FailureStage::Task => "任务执行",
        };
        f.write_str(name)
    }
}

/// 编排层记录的单篇文献失败
///
/// 只保存阶段和原因字符串，不携带底层错误对象
#[derive(Debug, Clone, Error)]
#[error("[{stage}] {reason}")]
pub struct DocumentFailure {
    pub stage: FailureStage,
    pub reason: String,
    pub batch_fatal: bool,
}

impl DocumentFailure {
    pub fn new(stage: FailureStage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
            batch_fatal: false,
        }
    }
}

impl From<ExtractionError> for DocumentFailure {
    fn from(err: ExtractionError) -> Self {
        DocumentFailure::new(FailureStage::Extraction, err.to_string())
    }
}

impl From<RenderError> for DocumentFailure {
    fn from(err: RenderError) -> Self {
        DocumentFailure::new(FailureStage::Render, err.to_string())
    }
}

impl From<ApiFailure> for DocumentFailure {
    fn from(err: ApiFailure) -> Self {
        DocumentFailure {
            stage: FailureStage::Api,
            batch_fatal: err.kind.is_batch_fatal(),
            reason: err.to_string(),
        }
    }
}

impl From<WriteError> for DocumentFailure {
    fn from(err: WriteError) -> Self {
        DocumentFailure {
            stage: FailureStage::Write,
            batch_fatal: err.is_batch_fatal(),
            reason: err.to_string(),
        }
    }
}

/// 应用程序顶层错误
#[derive(Debug, Error)]
pub enum AppError {
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    #[error("输入目录中没有找到 PDF 文件: {}", .0.display())]
    NoDocuments(PathBuf),

    #[error("文件错误: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
