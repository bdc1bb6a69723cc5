use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use url::Url;

use crate::core::error::{DownloadError, DownloadResult};
use super::Transport;

/// 本地文件：不复制，直接返回原路径
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTransport;

impl FileTransport {
    fn to_path(url: &str) -> DownloadResult<PathBuf> {
        if Path::new(url).is_absolute() {
            return Ok(PathBuf::from(url));
        }
        let parsed = Url::parse(url).map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", url, e)))?;
        if parsed.scheme() != "file" {
            return Err(DownloadError::UnsupportedProtocol(parsed.scheme().to_string()));
        }
        parsed
            .to_file_path()
            .map_err(|_| DownloadError::InvalidUrl(url.to_string()))
    }
}

impl Transport for FileTransport {
    fn fetch(&self, url: &str) -> DownloadResult<PathBuf> {
        let path = Self::to_path(url)?;
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(DownloadError::NotFound(format!("{} 不是文件", path.display()))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(DownloadError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
