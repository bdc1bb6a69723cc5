//! 调度器：执行任务、延迟执行任务、关闭后拒绝新任务

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::core::error::DownloadError;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync {
    /// 尽快执行
    fn run(&self, job: Job) -> Result<(), DownloadError>;

    /// 延迟 `delay` 后执行，返回可取消的句柄
    fn run_after(&self, job: Job, delay: Duration) -> Result<ScheduledHandle, DownloadError>;

    /// 之后提交的任务都会被拒绝；已经排队的延迟任务由持有句柄的一方取消
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// 延迟任务句柄
///
/// 定时器触发和取消通过同一个标志竞争，只有一方能成功：
/// `cancel()` 返回 `true` 表示任务一定不会再执行。
#[derive(Clone, Default)]
pub struct ScheduledHandle {
    claimed: Arc<AtomicBool>,
    abort: Arc<Mutex<Option<AbortHandle>>>,
}

impl ScheduledHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 执行方调用；返回 `false` 表示已被取消
    pub fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::SeqCst)
    }

    pub fn cancel(&self) -> bool {
        if !self.claim() {
            return false;
        }
        if let Some(abort) = self.abort.lock().take() {
            abort.abort();
        }
        true
    }

    pub fn is_finished(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }

    fn attach(&self, abort: AbortHandle) {
        *self.abort.lock() = Some(abort);
    }
}

/// 基于 tokio 运行时的调度器
///
/// 下载尝试是阻塞调用，放到 `spawn_blocking` 线程池里执行。
/// 运行时由调用方持有，调度器只保存 `Handle`。
pub struct TokioScheduler {
    handle: Handle,
    closed: AtomicBool,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> Result<(), DownloadError> {
        if self.is_closed() {
            return Err(DownloadError::SchedulerRejected("调度器已关闭".to_string()));
        }
        Ok(())
    }
}

impl Scheduler for TokioScheduler {
    fn run(&self, job: Job) -> Result<(), DownloadError> {
        self.check_open()?;
        self.handle.spawn_blocking(job);
        Ok(())
    }

    fn run_after(&self, job: Job, delay: Duration) -> Result<ScheduledHandle, DownloadError> {
        self.check_open()?;
        let scheduled = ScheduledHandle::new();
        let timer = scheduled.clone();
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if timer.claim() {
                if let Err(e) = tokio::task::spawn_blocking(job).await {
                    log::error!("延迟任务异常退出: {}", e);
                }
            }
        });
        scheduled.attach(join.abort_handle());
        Ok(scheduled)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
