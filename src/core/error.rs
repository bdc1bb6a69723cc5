use thiserror::Error;
use std::fmt;
use std::io;
use std::sync::Arc;

/// 下载错误
///
/// 错误需要在任务之间共享（同一个 URL 的所有调用方看到同一个结果），
/// 因此实现了 `Clone`，IO 错误放在 `Arc` 里。
#[derive(Error, Debug, Clone)]
pub enum DownloadError {
    #[error("网络错误: {0}")]
    NetworkError(String),

    #[error("IO错误: {0}")]
    IoError(Arc<io::Error>),

    #[error("下载超时")]
    Timeout,

    #[error("服务器错误: {0}")]
    ServerError(String),

    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("无效的坐标: {0}")]
    InvalidCoordinate(String),

    #[error("不支持的协议: {0}")]
    UnsupportedProtocol(String),

    #[error("资源不存在: {0}")]
    NotFound(String),

    #[error("链式下载没有进展: {0}")]
    CyclicRewrite(String),

    #[error("重试次数超过限制 ({attempts} 次): {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<DownloadError>,
    },

    #[error("调度器拒绝任务: {0}")]
    SchedulerRejected(String),

    #[error("下载管理器已关闭")]
    Shutdown,

    #[error("任务已经完成，不能再次设置结果: {0}")]
    AlreadyCompleted(String),
}

impl DownloadError {
    /// 瞬时错误：网络抖动、IO 失败、超时、5xx
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DownloadError::NetworkError(_) |
            DownloadError::IoError(_) |
            DownloadError::Timeout |
            DownloadError::ServerError(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }

    /// 区分"从未成功"和"重试若干次后放弃"
    pub fn is_retries_exhausted(&self) -> bool {
        matches!(self, DownloadError::RetriesExhausted { .. })
    }

    /// 取出最底层的原因（对 `RetriesExhausted` 展开）
    pub fn root_cause(&self) -> &DownloadError {
        match self {
            DownloadError::RetriesExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn io(error: io::Error) -> Self {
        DownloadError::IoError(Arc::new(error))
    }
}

impl From<io::Error> for DownloadError {
    fn from(error: io::Error) -> Self {
        DownloadError::io(error)
    }
}

/// 一个下载失败的记录
#[derive(Debug, Clone)]
pub struct Failure {
    pub url: String,
    pub error: DownloadError,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.url, self.error)
    }
}

/// `Downloader::wait` 返回的聚合错误，包含本批次所有失败
#[derive(Debug, Clone)]
pub struct AggregateError {
    pub failures: Vec<Failure>,
}

impl AggregateError {
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.url.as_str())
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} 个下载失败", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  - {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

pub type DownloadResult<T> = Result<T, DownloadError>;
