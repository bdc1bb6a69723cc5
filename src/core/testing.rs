//! 测试用的调度器、传输层和解析器

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use rand::Rng;

use crate::core::error::{DownloadError, DownloadResult};
use crate::core::locator::Coordinate;
use crate::core::scheduler::{Job, ScheduledHandle, Scheduler};
use crate::resolver::Resolver;
use crate::transport::Transport;

/// 记录每次延迟，忽略延迟直接在新线程上执行
///
/// `holding_delayed()` 模式下延迟任务不执行，只保存起来等待取消。
/// `closing_on_delay()` 在此基础上接受延迟任务后立即关闭自己。
pub struct RecordingScheduler {
    delays: Mutex<Vec<Duration>>,
    held: Mutex<Vec<(Job, ScheduledHandle)>>,
    changed: Condvar,
    hold_delayed: bool,
    close_on_delay: bool,
    closed: AtomicBool,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self {
            delays: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            changed: Condvar::new(),
            hold_delayed: false,
            close_on_delay: false,
            closed: AtomicBool::new(false),
        }
    }

    pub fn holding_delayed() -> Self {
        Self { hold_delayed: true, ..Self::new() }
    }

    pub fn closing_on_delay() -> Self {
        Self { hold_delayed: true, close_on_delay: true, ..Self::new() }
    }

    /// 保存的延迟任务是否都已被取消
    pub fn held_cancelled(&self) -> bool {
        let held = self.held.lock();
        !held.is_empty() && held.iter().all(|(_, handle)| handle.is_finished())
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }

    pub fn wait_for_delayed(&self, count: usize) {
        let mut delays = self.delays.lock();
        while delays.len() < count {
            self.changed.wait_for(&mut delays, Duration::from_millis(50));
        }
    }

    fn check_open(&self) -> Result<(), DownloadError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DownloadError::SchedulerRejected("closed".to_string()));
        }
        Ok(())
    }
}

impl Scheduler for RecordingScheduler {
    fn run(&self, job: Job) -> Result<(), DownloadError> {
        self.check_open()?;
        thread::spawn(job);
        Ok(())
    }

    fn run_after(&self, job: Job, delay: Duration) -> Result<ScheduledHandle, DownloadError> {
        self.check_open()?;
        let handle = ScheduledHandle::new();
        if self.hold_delayed {
            self.held.lock().push((job, handle.clone()));
        } else {
            let timer = handle.clone();
            thread::spawn(move || {
                if timer.claim() {
                    job();
                }
            });
        }
        self.delays.lock().push(delay);
        self.changed.notify_all();
        if self.close_on_delay {
            self.close();
        }
        Ok(handle)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn default_path(url: &str) -> PathBuf {
    PathBuf::from(format!("/staging/{}", url.replace(['/', ':', '$', '?'], "_")))
}

/// 按脚本返回结果并统计调用次数的传输层
///
/// 脚本里的结果依次弹出，最后一个会一直重复；没有脚本的地址直接成功。
#[derive(Default)]
pub struct FakeTransport {
    scripts: Mutex<HashMap<String, VecDeque<DownloadResult<PathBuf>>>>,
    calls: Mutex<Vec<String>>,
    latency: Option<Duration>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次获取随机等待 0..max
    pub fn with_latency(max: Duration) -> Self {
        Self { latency: Some(max), ..Self::default() }
    }

    pub fn script(&self, url: &str, outcomes: Vec<DownloadResult<PathBuf>>) {
        self.scripts.lock().insert(url.to_string(), outcomes.into());
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|u| u.as_str() == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

fn next_outcome(
    scripts: &Mutex<HashMap<String, VecDeque<DownloadResult<PathBuf>>>>,
    key: &str,
) -> Option<DownloadResult<PathBuf>> {
    let mut scripts = scripts.lock();
    let queue = scripts.get_mut(key)?;
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

impl Transport for FakeTransport {
    fn fetch(&self, url: &str) -> DownloadResult<PathBuf> {
        self.calls.lock().push(url.to_string());
        if let Some(max) = self.latency {
            let millis = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
            thread::sleep(Duration::from_millis(millis));
        }
        next_outcome(&self.scripts, url).unwrap_or_else(|| Ok(default_path(url)))
    }
}

/// 坐标到本地文件的固定映射；未映射的坐标返回 `NotFound`
#[derive(Default)]
pub struct FakeResolver {
    scripts: Mutex<HashMap<String, VecDeque<DownloadResult<PathBuf>>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&self, coordinate: &str, path: impl Into<PathBuf>) {
        self.script(coordinate, vec![Ok(path.into())]);
    }

    pub fn script(&self, coordinate: &str, outcomes: Vec<DownloadResult<PathBuf>>) {
        self.scripts.lock().insert(coordinate.to_string(), outcomes.into());
    }

    pub fn calls(&self, coordinate: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == coordinate).count()
    }
}

impl Resolver for FakeResolver {
    fn resolve(&self, coordinate: &Coordinate) -> DownloadResult<PathBuf> {
        let key = coordinate.to_string();
        self.calls.lock().push(key.clone());
        next_outcome(&self.scripts, &key)
            .unwrap_or_else(|| Err(DownloadError::NotFound(key)))
    }
}
