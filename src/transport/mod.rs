//! 传输层：把直接地址变成本地文件

mod file;
mod http;

use std::path::{Path, PathBuf};

use url::Url;

use crate::core::error::{DownloadError, DownloadResult};
use crate::core::locator;

pub use file::FileTransport;
pub use http::HttpTransport;

/// 获取一个直接地址，返回本地文件路径
///
/// 实现要能被多个线程同时调用。瞬时错误（网络、超时、服务端）会被重试，
/// 其他错误直接结束任务。
pub trait Transport: Send + Sync {
    fn fetch(&self, url: &str) -> DownloadResult<PathBuf>;
}

/// 按协议分发的传输层
///
/// 包装地址（`wrap:file:///a.jar$...`）按被包装的地址获取。
pub struct SchemeTransport {
    file: FileTransport,
    http: Option<HttpTransport>,
}

impl SchemeTransport {
    pub fn new(http: Option<HttpTransport>) -> Self {
        Self { file: FileTransport, http }
    }

    /// 只支持本地文件
    pub fn local_only() -> Self {
        Self::new(None)
    }
}

impl Transport for SchemeTransport {
    fn fetch(&self, url: &str) -> DownloadResult<PathBuf> {
        let direct = locator::unwrap_direct(url);
        if direct != url {
            log::debug!("包装地址 {} 按 {} 获取", url, direct);
        }
        if Path::new(direct).is_absolute() {
            return self.file.fetch(direct);
        }

        let parsed = Url::parse(direct)
            .map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", direct, e)))?;
        match parsed.scheme() {
            "file" => self.file.fetch(direct),
            "http" | "https" => match &self.http {
                Some(http) => http.fetch(direct),
                None => Err(DownloadError::UnsupportedProtocol(parsed.scheme().to_string())),
            },
            other => Err(DownloadError::UnsupportedProtocol(other.to_string())),
        }
    }
}
