//! 下载管理器：按地址去重、缓存结果、分发完成通知

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::downloader::Downloader;
use crate::core::locator::{self, Coordinate, Locator};
use crate::core::scheduler::Scheduler;
use crate::core::task::{Attempt, ChainedTask, RetryPolicy, RetryableTask, Task};
use crate::resolver::Resolver;
use crate::transport::Transport;

/// 全局完成监听器，对每个下载请求调用一次
pub type GlobalListener = Arc<dyn Fn(&Task) + Send + Sync>;

/// 单个请求的完成回调
pub(crate) type ItemCallback = Box<dyn FnOnce(&Task) + Send>;

/// `add_listener` 返回的标识，用于移除监听器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct InFlight {
    task: Arc<Task>,
    retry: Option<Arc<RetryableTask>>,
}

#[derive(Default)]
struct Registry {
    in_flight: HashMap<String, InFlight>,
    completed: HashMap<String, Arc<Task>>,
    pending: usize,
}

enum Body {
    Retry(Arc<RetryableTask>),
    Chained(Arc<ChainedTask>),
}

pub(crate) struct ManagerInner {
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn Resolver>,
    scheduler: Arc<dyn Scheduler>,
    policy: RetryPolicy,
    registry: Mutex<Registry>,
    listeners: Mutex<Vec<(ListenerId, GlobalListener)>>,
    next_listener: AtomicU64,
}

/// 下载管理器
///
/// 同一个规范化地址同时只有一个任务在执行，结束后结果（包括失败）
/// 一直保留在缓存里，后续请求直接复用。
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<ManagerInner>,
}

impl DownloadManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn Resolver>,
        scheduler: Arc<dyn Scheduler>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                transport,
                resolver,
                scheduler,
                policy,
                registry: Mutex::new(Registry::default()),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// 新建一个独立计数的批次
    pub fn create_downloader(&self) -> Downloader {
        Downloader::new(Arc::clone(&self.inner))
    }

    /// 所有批次中尚未结束的请求数
    pub fn pending(&self) -> usize {
        self.inner.registry.lock().pending
    }

    #[cfg(test)]
    pub(crate) fn in_flight_count(&self) -> usize {
        self.inner.registry.lock().in_flight.len()
    }

    #[cfg(test)]
    pub(crate) fn completed_count(&self) -> usize {
        self.inner.registry.lock().completed.len()
    }

    /// 按地址查找任务，地址会先规范化
    pub fn task(&self, url: &str) -> Option<Arc<Task>> {
        let url = locator::normalize(url);
        let registry = self.inner.registry.lock();
        registry
            .in_flight
            .get(&url)
            .map(|entry| Arc::clone(&entry.task))
            .or_else(|| registry.completed.get(&url).cloned())
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Task) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::SeqCst));
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// 关闭调度器并取消所有等待中的重试，返回取消的数量
    ///
    /// 正在执行的尝试会跑完，之后的重试会被调度器拒绝，
    /// 所以关闭后每个任务最终都会结束。
    pub fn shutdown(&self) -> usize {
        self.inner.scheduler.close();
        let retries: Vec<Arc<RetryableTask>> = self
            .inner
            .registry
            .lock()
            .in_flight
            .values()
            .filter_map(|entry| entry.retry.clone())
            .collect();

        let cancelled = retries.iter().filter(|retry| retry.cancel()).count();
        log::info!("下载管理器已关闭，取消 {} 个等待中的重试", cancelled);
        cancelled
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.scheduler.is_closed()
    }
}

impl ManagerInner {
    pub(crate) fn download(
        this: &Arc<Self>,
        downloader: &Downloader,
        url: &str,
        chain: Vec<String>,
        callback: Option<ItemCallback>,
    ) -> Arc<Task> {
        let url = locator::normalize(url);
        let (task, body) = {
            let mut registry = this.registry.lock();
            registry.pending += 1;
            if let Some(task) = registry.completed.get(&url) {
                log::debug!("命中缓存: {}", url);
                (Arc::clone(task), None)
            } else if let Some(entry) = registry.in_flight.get(&url) {
                log::debug!("合并到进行中的下载: {}", url);
                (Arc::clone(&entry.task), None)
            } else {
                let task = Arc::new(Task::new(url.clone()));
                let body = this.create_body(&task, downloader, chain);
                let retry = match &body {
                    Body::Retry(retry) => Some(Arc::clone(retry)),
                    Body::Chained(_) => None,
                };
                registry
                    .in_flight
                    .insert(url.clone(), InFlight { task: Arc::clone(&task), retry });
                (task, Some(body))
            }
        };

        downloader.begin();
        let manager = Arc::clone(this);
        let owner = downloader.clone();
        task.add_listener(Box::new(move |done: &Task| manager.on_complete(&owner, done, callback)));

        if let Some(body) = body {
            log::info!("开始下载: {}", url);
            this.start(&task, body);
        }
        task
    }

    fn create_body(&self, task: &Arc<Task>, downloader: &Downloader, chain: Vec<String>) -> Body {
        let url = task.url().to_string();
        let attempt: Attempt = match Locator::classify(&url) {
            Locator::Wrapped(wrapped) => {
                return Body::Chained(ChainedTask::new(
                    Arc::clone(task),
                    wrapped,
                    downloader.clone(),
                    chain,
                ));
            }
            Locator::Coordinate(coordinate) => {
                let resolver = Arc::clone(&self.resolver);
                Box::new(move || resolver.resolve(&Coordinate::parse(&coordinate)?))
            }
            Locator::Direct(direct) => {
                let transport = Arc::clone(&self.transport);
                Box::new(move || transport.fetch(&direct))
            }
        };
        Body::Retry(RetryableTask::new(
            Arc::clone(task),
            attempt,
            self.policy.clone(),
            Arc::clone(&self.scheduler),
        ))
    }

    fn start(&self, task: &Arc<Task>, body: Body) {
        match body {
            Body::Retry(retry) => retry.start(),
            Body::Chained(chained) => {
                let job = Box::new(move || chained.start());
                if let Err(e) = self.scheduler.run(job) {
                    if let Err(e) = task.fail(e) {
                        log::error!("{}", e);
                    }
                }
            }
        }
    }

    fn on_complete(&self, downloader: &Downloader, task: &Task, callback: Option<ItemCallback>) {
        {
            let mut registry = self.registry.lock();
            if let Some(entry) = registry.in_flight.remove(task.url()) {
                registry.completed.insert(task.url().to_string(), entry.task);
            }
            registry.pending = registry.pending.saturating_sub(1);
        }

        match task.error() {
            None => log::debug!("下载完成: {}", task.url()),
            Some(e) => log::debug!("下载失败: {} - {}", task.url(), e),
        }

        if let Some(callback) = callback {
            callback(task);
        }
        let listeners: Vec<GlobalListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(task);
        }

        downloader.end(task);
    }
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.inner.registry.lock();
        f.debug_struct("DownloadManager")
            .field("in_flight", &registry.in_flight.len())
            .field("completed", &registry.completed.len())
            .field("pending", &registry.pending)
            .finish()
    }
}
