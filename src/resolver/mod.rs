//! 坐标解析：先查本地仓库，再查远程仓库

use std::path::PathBuf;
use std::sync::Arc;

use crate::core::error::{DownloadError, DownloadResult};
use crate::core::locator::Coordinate;
use crate::transport::Transport;

/// 把坐标解析成本地文件
pub trait Resolver: Send + Sync {
    fn resolve(&self, coordinate: &Coordinate) -> DownloadResult<PathBuf>;
}

/// 按仓库布局查找坐标
///
/// 本地仓库按顺序检查文件是否存在；都没有时依次从远程仓库下载。
/// 所有远程仓库都失败时，只要有一个是瞬时错误就返回瞬时错误，交给重试。
pub struct RepositoryResolver {
    local: Vec<PathBuf>,
    remote: Vec<String>,
    transport: Arc<dyn Transport>,
}

impl RepositoryResolver {
    pub fn new(local: Vec<PathBuf>, remote: Vec<String>, transport: Arc<dyn Transport>) -> Self {
        Self { local, remote, transport }
    }
}

impl Resolver for RepositoryResolver {
    fn resolve(&self, coordinate: &Coordinate) -> DownloadResult<PathBuf> {
        let relative = coordinate.repository_path();

        for repository in &self.local {
            let candidate = repository.join(&relative);
            if candidate.is_file() {
                log::debug!("{} 在本地仓库 {} 中找到", coordinate, repository.display());
                return Ok(candidate);
            }
        }

        let mut transient = None;
        for base in &self.remote {
            let url = format!("{}/{}", base.trim_end_matches('/'), relative);
            match self.transport.fetch(&url) {
                Ok(path) => return Ok(path),
                Err(e) if e.is_retryable() => {
                    log::warn!("远程仓库 {} 暂时不可用: {}", base, e);
                    transient = Some(e);
                }
                Err(e) => log::debug!("{} 不在 {} 中: {}", coordinate, base, e),
            }
        }

        Err(transient.unwrap_or_else(|| DownloadError::NotFound(coordinate.to_string())))
    }
}
