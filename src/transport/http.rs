use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use url::Url;
use uuid::Uuid;

use crate::core::error::{DownloadError, DownloadResult};
use super::Transport;

/// HTTP(S) 下载到暂存目录
///
/// 先写 `.part` 临时文件，完整写完后再改名，暂存目录里不会留下半个文件。
/// 每次获取的临时文件名都不同，同一个地址被并发获取时互不干扰。
pub struct HttpTransport {
    client: Client,
    staging_dir: PathBuf,
}

impl HttpTransport {
    pub fn new(staging_dir: impl Into<PathBuf>, timeout: Duration, user_agent: &str) -> DownloadResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| DownloadError::NetworkError(format!("创建HTTP客户端失败: {}", e)))?;
        // 返回的路径会被写进 file:// 地址，必须是绝对路径
        let staging_dir = std::path::absolute(staging_dir.into())?;
        Ok(Self { client, staging_dir })
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// 同名文件来自不同地址时不能互相覆盖，文件名前加地址哈希
    fn staging_path(&self, url: &Url) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        url.as_str().hash(&mut hasher);
        let name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or("download");
        self.staging_dir.join(format!("{:016x}-{}", hasher.finish(), name))
    }

    fn partial_path(&self, target: &Path) -> PathBuf {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.staging_dir.join(format!(".{}.{}.part", name, Uuid::new_v4().simple()))
    }
}

fn write_partial(response: &mut Response, partial: &Path, target: &Path) -> DownloadResult<u64> {
    let written = {
        let mut file = File::create(partial)?;
        response.copy_to(&mut file).map_err(classify)?
    };
    fs::rename(partial, target)?;
    Ok(written)
}

fn classify(error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::Timeout
    } else {
        DownloadError::NetworkError(error.to_string())
    }
}

fn check_status(status: StatusCode, url: &Url) -> DownloadResult<()> {
    if status.is_success() {
        return Ok(());
    }
    let message = format!("{} {}", status, url);
    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        Err(DownloadError::NotFound(message))
    } else if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        Err(DownloadError::ServerError(message))
    } else {
        Err(DownloadError::InvalidUrl(message))
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str) -> DownloadResult<PathBuf> {
        let parsed = Url::parse(url).map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", url, e)))?;
        let mut response = self.client.get(parsed.clone()).send().map_err(classify)?;
        check_status(response.status(), &parsed)?;

        fs::create_dir_all(&self.staging_dir)?;
        let target = self.staging_path(&parsed);
        let partial = self.partial_path(&target);
        let written = match write_partial(&mut response, &partial, &target) {
            Ok(written) => written,
            Err(e) => {
                let _ = fs::remove_file(&partial);
                return Err(e);
            }
        };

        log::debug!("{} 已下载 {} 字节到 {}", url, written, target.display());
        Ok(target)
    }
}
