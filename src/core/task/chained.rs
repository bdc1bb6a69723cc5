use std::path::PathBuf;
use std::sync::Arc;

use crate::core::downloader::Downloader;
use crate::core::error::DownloadResult;
use crate::core::locator::WrappedLocator;
use super::promise::Task;

/// 包装地址的下载任务
///
/// 先下载内层坐标，再把外层地址里的坐标换成本地文件引用，
/// 然后下载改写后的地址。两次下载都走同一个 `Downloader`，
/// 所以共享管理器的去重和缓存。
///
/// `chain` 记录从最外层到当前任务的所有包装地址，改写结果回到链上
/// 任何一个地址都会以 `CyclicRewrite` 结束，不会互相等待。
pub struct ChainedTask {
    task: Arc<Task>,
    locator: WrappedLocator,
    downloader: Downloader,
    chain: Vec<String>,
}

impl ChainedTask {
    pub fn new(
        task: Arc<Task>,
        locator: WrappedLocator,
        downloader: Downloader,
        mut chain: Vec<String>,
    ) -> Arc<Self> {
        chain.push(task.url().to_string());
        Arc::new(Self { task, locator, downloader, chain })
    }

    /// 开始下载内层地址；不阻塞
    pub fn start(self: &Arc<Self>) {
        log::debug!("{} 先下载内层 {}", self.locator.original(), self.locator.inner());
        let this = Arc::clone(self);
        self.downloader
            .download_with(self.locator.inner(), move |inner| this.on_inner_done(inner));
    }

    fn on_inner_done(self: &Arc<Self>, inner: &Task) {
        let local = match inner.wait() {
            Ok(path) => path,
            Err(e) => return self.finish(Err(e)),
        };

        let rewritten = self.locator.rewrite(&local);
        if let Err(e) = self.locator.check_progress(&rewritten, &self.chain) {
            log::error!("{} 改写后没有进展: {}", self.locator.original(), rewritten);
            return self.finish(Err(e));
        }

        log::debug!("{} 改写为 {}", self.locator.original(), rewritten);
        let this = Arc::clone(self);
        self.downloader.download_in_chain(&rewritten, self.chain.clone(), move |next| {
            this.finish(next.wait())
        });
    }

    fn finish(&self, result: DownloadResult<PathBuf>) {
        if let Err(e) = self.task.finish(result) {
            log::error!("{}", e);
        }
    }
}
