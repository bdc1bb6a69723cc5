use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use uuid::Uuid;

use crate::core::error::{AggregateError, Failure};
use crate::core::manager::ManagerInner;
use crate::core::task::Task;

#[derive(Default)]
struct BatchState {
    pending: usize,
    requested: usize,
    failures: Vec<Failure>,
}

struct DownloaderInner {
    id: Uuid,
    manager: Arc<ManagerInner>,
    state: Mutex<BatchState>,
    idle: Condvar,
}

/// 一批下载请求的句柄
///
/// 自己记录未完成数量和失败列表，`wait()` 阻塞到这一批全部结束。
/// 同一个管理器下的多个 `Downloader` 互不影响，但共享去重和缓存。
#[derive(Clone)]
pub struct Downloader {
    inner: Arc<DownloaderInner>,
}

impl Downloader {
    pub(crate) fn new(manager: Arc<ManagerInner>) -> Self {
        Self {
            inner: Arc::new(DownloaderInner {
                id: Uuid::new_v4(),
                manager,
                state: Mutex::new(BatchState::default()),
                idle: Condvar::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// 提交下载，不阻塞
    pub fn download(&self, url: &str) -> Arc<Task> {
        ManagerInner::download(&self.inner.manager, self, url, Vec::new(), None)
    }

    /// 提交下载，并在这个地址结束时调用 `callback`
    ///
    /// 回调在全局监听器之前执行，执行完之后才会计入本批次的完成数。
    pub fn download_with<F>(&self, url: &str, callback: F) -> Arc<Task>
    where
        F: FnOnce(&Task) + Send + 'static,
    {
        ManagerInner::download(&self.inner.manager, self, url, Vec::new(), Some(Box::new(callback)))
    }

    /// 包装地址改写后的下载，`chain` 是已经经过的包装地址
    pub(crate) fn download_in_chain<F>(&self, url: &str, chain: Vec<String>, callback: F) -> Arc<Task>
    where
        F: FnOnce(&Task) + Send + 'static,
    {
        ManagerInner::download(&self.inner.manager, self, url, chain, Some(Box::new(callback)))
    }

    /// 本批次尚未结束的下载数
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending
    }

    /// 本批次一共提交过的下载数
    pub fn requested(&self) -> usize {
        self.inner.state.lock().requested
    }

    /// 阻塞直到本批次没有未完成的下载；有失败时汇总返回
    pub fn wait(&self) -> Result<(), AggregateError> {
        let mut state = self.inner.state.lock();
        while state.pending > 0 {
            self.inner.idle.wait(&mut state);
        }
        Self::outcome(&state)
    }

    /// 带超时的 `wait`；超时返回 `None`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<(), AggregateError>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while state.pending > 0 {
            if self.inner.idle.wait_until(&mut state, deadline).timed_out() && state.pending > 0 {
                return None;
            }
        }
        Some(Self::outcome(&state))
    }

    fn outcome(state: &BatchState) -> Result<(), AggregateError> {
        if state.failures.is_empty() {
            Ok(())
        } else {
            Err(AggregateError { failures: state.failures.clone() })
        }
    }

    pub(crate) fn begin(&self) {
        let mut state = self.inner.state.lock();
        state.pending += 1;
        state.requested += 1;
    }

    pub(crate) fn end(&self, task: &Task) {
        let mut state = self.inner.state.lock();
        if let Some(error) = task.error() {
            state.failures.push(Failure { url: task.url().to_string(), error });
        }
        state.pending = state.pending.saturating_sub(1);
        if state.pending == 0 {
            self.inner.idle.notify_all();
        }
    }
}
