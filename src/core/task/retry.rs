use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;

use crate::core::error::{DownloadError, DownloadResult};
use crate::core::scheduler::{ScheduledHandle, Scheduler};
use super::promise::Task;

/// 重试策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64, // 抖动因子，避免重试风暴
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 1.5,
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// 第 `attempts` 次尝试失败后是否还能重试
    pub fn should_retry(&self, error: &DownloadError, attempts: u32) -> bool {
        error.is_retryable() && attempts < self.max_attempts
    }

    /// 在上一次延迟的基础上乘以退避系数，再加 ±jitter 的抖动，按毫秒取整
    pub fn next_delay(&self, previous: Duration) -> Duration {
        let scaled = previous.as_secs_f64() * 1000.0 * self.backoff_multiplier;
        let jitter = if self.jitter_factor > 0.0 {
            rand::thread_rng().gen_range(-self.jitter_factor..=self.jitter_factor)
        } else {
            0.0
        };
        let millis = (scaled * (1.0 + jitter)).round().max(0.0) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }
}

/// 单次尝试：成功返回本地文件，失败按 `is_retryable` 区分瞬时/致命
pub type Attempt = Box<dyn Fn() -> DownloadResult<PathBuf> + Send + Sync>;

/// 重试统计信息
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub attempts: u32,
    pub delays: Vec<Duration>,
    pub last_error: Option<DownloadError>,
}

struct RetryState {
    attempts: u32,
    delay: Duration,
    delays: Vec<Duration>,
    last_error: Option<DownloadError>,
    pending: Option<ScheduledHandle>,
    scheduled: u64,
}

/// 带退避重试的下载任务
///
/// 只有调度器回调会触发 `run`，同一个任务不会有两次尝试并发执行。
pub struct RetryableTask {
    task: Arc<Task>,
    attempt: Attempt,
    policy: RetryPolicy,
    scheduler: Arc<dyn Scheduler>,
    state: Mutex<RetryState>,
}

impl RetryableTask {
    pub fn new(
        task: Arc<Task>,
        attempt: Attempt,
        policy: RetryPolicy,
        scheduler: Arc<dyn Scheduler>,
    ) -> Arc<Self> {
        let delay = policy.base_delay;
        Arc::new(Self {
            task,
            attempt,
            policy,
            scheduler,
            state: Mutex::new(RetryState {
                attempts: 0,
                delay,
                delays: Vec::new(),
                last_error: None,
                pending: None,
                scheduled: 0,
            }),
        })
    }

    /// 交给调度器执行第一次尝试
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        if let Err(e) = self.scheduler.run(Box::new(move || this.run())) {
            self.finish(Err(e));
        }
    }

    /// 执行一次尝试，由调度器调用
    pub fn run(self: &Arc<Self>) {
        self.state.lock().pending = None;
        if self.task.is_done() {
            return;
        }

        match (self.attempt)() {
            Ok(path) => self.finish(Ok(path)),
            Err(error) if error.is_retryable() => self.retry_or_give_up(error),
            Err(error) => {
                log::debug!("{} 致命错误，不再重试: {}", self.task.url(), error);
                self.state.lock().attempts += 1;
                self.finish(Err(error))
            }
        }
    }

    fn retry_or_give_up(self: &Arc<Self>, error: DownloadError) {
        let next = {
            let mut state = self.state.lock();
            state.attempts += 1;
            state.last_error = Some(error.clone());
            if self.policy.should_retry(&error, state.attempts) {
                state.delay = self.policy.next_delay(state.delay);
                let delay = state.delay;
                state.delays.push(delay);
                state.scheduled += 1;
                Ok((state.attempts, delay, state.scheduled))
            } else {
                Err(state.attempts)
            }
        };

        match next {
            Ok((attempts, delay, ticket)) => {
                log::warn!(
                    "{} 第 {} 次尝试失败: {}，{} 毫秒后重试",
                    self.task.url(),
                    attempts,
                    error,
                    delay.as_millis()
                );
                let this = Arc::clone(self);
                match self.scheduler.run_after(Box::new(move || this.run()), delay) {
                    Ok(handle) => {
                        // 定时器可能已经触发并安排了下一次重试，只保存最新的句柄
                        let stored = {
                            let mut state = self.state.lock();
                            let latest = state.scheduled == ticket && !handle.is_finished();
                            if latest {
                                state.pending = Some(handle);
                            }
                            latest
                        };
                        // 保存句柄之前调度器可能已经关闭，关闭方取消时看不到这个句柄
                        if stored && self.scheduler.is_closed() {
                            self.cancel();
                        }
                    }
                    Err(rejected) => self.finish(Err(rejected)),
                }
            }
            Err(attempts) => {
                log::error!("{} 重试 {} 次后放弃: {}", self.task.url(), attempts, error);
                self.finish(Err(DownloadError::RetriesExhausted {
                    attempts,
                    source: Box::new(error),
                }));
            }
        }
    }

    /// 取消尚未执行的重试并以 `Shutdown` 结束任务；没有待执行的重试时返回 `false`
    pub fn cancel(&self) -> bool {
        let pending = self.state.lock().pending.take();
        match pending {
            Some(handle) if handle.cancel() => {
                log::debug!("取消 {} 的待执行重试", self.task.url());
                self.finish(Err(DownloadError::Shutdown));
                true
            }
            _ => false,
        }
    }

    pub fn stats(&self) -> RetryStats {
        let state = self.state.lock();
        RetryStats {
            attempts: state.attempts,
            delays: state.delays.clone(),
            last_error: state.last_error.clone(),
        }
    }

    fn finish(&self, result: DownloadResult<PathBuf>) {
        if let Err(e) = self.task.finish(result) {
            log::error!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::RecordingScheduler;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn scripted(failures_before_success: u32, counter: Arc<AtomicU32>) -> Attempt {
        Box::new(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= failures_before_success {
                Err(DownloadError::NetworkError(format!("attempt {}", n)))
            } else {
                Ok(PathBuf::from("/tmp/ok"))
            }
        })
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.backoff_multiplier, 1.5);
        assert_eq!(policy.jitter_factor, 0.25);
    }

    #[test]
    fn test_next_delay_within_jitter_bounds() {
        let policy = RetryPolicy::default();
        let previous = Duration::from_millis(1000);
        for _ in 0..200 {
            let delay = policy.next_delay(previous).as_millis();
            assert!((1125..=1875).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[test]
    fn test_next_delay_is_clamped() {
        let policy = RetryPolicy { max_delay: Duration::from_millis(300), ..RetryPolicy::default() };
        assert!(policy.next_delay(Duration::from_secs(10)) <= Duration::from_millis(300));
    }

    #[test]
    fn test_always_failing_attempt_stops_at_max_attempts() {
        let scheduler = Arc::new(RecordingScheduler::new());
        let counter = Arc::new(AtomicU32::new(0));
        let task = Arc::new(Task::new("http://example.com/a"));
        let retryable = RetryableTask::new(
            task.clone(),
            scripted(u32::MAX, counter.clone()),
            RetryPolicy::default(),
            scheduler.clone(),
        );

        retryable.start();
        let result = task.wait();

        assert_eq!(counter.load(Ordering::SeqCst), 5);
        match result {
            Err(DownloadError::RetriesExhausted { attempts, source }) => {
                assert_eq!(attempts, 5);
                assert!(matches!(*source, DownloadError::NetworkError(_)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(scheduler.delays().len(), 4);
        assert_eq!(retryable.stats().attempts, 5);
    }

    #[test]
    fn test_success_on_third_attempt() {
        let scheduler = Arc::new(RecordingScheduler::new());
        let counter = Arc::new(AtomicU32::new(0));
        let task = Arc::new(Task::new("http://example.com/a"));
        let retryable = RetryableTask::new(
            task.clone(),
            scripted(2, counter.clone()),
            RetryPolicy::default(),
            scheduler.clone(),
        );

        retryable.start();
        assert_eq!(task.wait().unwrap(), PathBuf::from("/tmp/ok"));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.delays().len(), 2);
    }

    #[test]
    fn test_backoff_delays_grow_within_bounds() {
        let scheduler = Arc::new(RecordingScheduler::new());
        let counter = Arc::new(AtomicU32::new(0));
        let task = Arc::new(Task::new("http://example.com/a"));
        let policy = RetryPolicy { max_attempts: 8, ..RetryPolicy::default() };
        let retryable = RetryableTask::new(
            task.clone(),
            scripted(u32::MAX, counter),
            policy.clone(),
            scheduler.clone(),
        );

        retryable.start();
        let _ = task.wait();

        let mut previous = policy.base_delay.as_millis() as f64;
        let delays = scheduler.delays();
        assert_eq!(delays.len(), 7);
        for delay in delays {
            let delay = delay.as_millis() as f64;
            let low = previous * policy.backoff_multiplier * 0.75 - 1.0;
            let high = previous * policy.backoff_multiplier * 1.25 + 1.0;
            assert!(delay >= low && delay <= high, "{} not in [{}, {}]", delay, low, high);
            previous = delay;
        }
    }

    #[test]
    fn test_fatal_error_skips_retry() {
        let scheduler = Arc::new(RecordingScheduler::new());
        let counter = Arc::new(AtomicU32::new(0));
        let task = Arc::new(Task::new("mvn:bad"));
        let calls = counter.clone();
        let retryable = RetryableTask::new(
            task.clone(),
            Box::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DownloadError::InvalidCoordinate("mvn:bad".to_string()))
            }),
            RetryPolicy::default(),
            scheduler.clone(),
        );

        retryable.start();
        assert!(matches!(task.wait(), Err(DownloadError::InvalidCoordinate(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(scheduler.delays().is_empty());
    }

    #[test]
    fn test_rejected_retry_fails_task() {
        let scheduler = Arc::new(RecordingScheduler::new());
        let task = Arc::new(Task::new("http://example.com/a"));
        let closer = scheduler.clone();
        let retryable = RetryableTask::new(
            task.clone(),
            Box::new(move || {
                // 第一次尝试期间调度器被关闭
                closer.close();
                Err(DownloadError::Timeout)
            }),
            RetryPolicy::default(),
            scheduler.clone(),
        );

        retryable.start();
        assert!(matches!(task.wait(), Err(DownloadError::SchedulerRejected(_))));
    }

    #[test]
    fn test_retry_scheduled_while_closing_is_cancelled() {
        // 调度器接受了延迟任务之后、句柄保存之前被关闭
        let scheduler = Arc::new(RecordingScheduler::closing_on_delay());
        let counter = Arc::new(AtomicU32::new(0));
        let task = Arc::new(Task::new("http://example.com/a"));
        let retryable = RetryableTask::new(
            task.clone(),
            scripted(u32::MAX, counter.clone()),
            RetryPolicy::default(),
            scheduler.clone(),
        );

        retryable.start();
        assert!(matches!(task.wait(), Err(DownloadError::Shutdown)));
        assert_eq!(scheduler.delays().len(), 1);
        assert!(scheduler.held_cancelled());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!retryable.cancel());
    }

    #[test]
    fn test_cancel_pending_retry() {
        let scheduler = Arc::new(RecordingScheduler::holding_delayed());
        let task = Arc::new(Task::new("http://example.com/a"));
        let retryable = RetryableTask::new(
            task.clone(),
            Box::new(|| Err(DownloadError::Timeout)),
            RetryPolicy::default(),
            scheduler.clone(),
        );

        retryable.start();
        scheduler.wait_for_delayed(1);
        assert!(retryable.cancel());
        assert!(matches!(task.wait(), Err(DownloadError::Shutdown)));
        assert!(!retryable.cancel());
    }
}
