//! Core: 下载任务的去重管理、重试调度、地址分类、错误处理等核心逻辑模块

pub mod downloader;
pub mod error;
pub mod locator;
pub mod manager;
pub mod scheduler;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

// 只导出主流程和其它模块实际用到的类型
pub use downloader::Downloader;
pub use error::{AggregateError, DownloadError, DownloadResult, Failure};
pub use locator::{Coordinate, Locator, WrappedLocator};
pub use manager::{DownloadManager, GlobalListener, ListenerId};
pub use scheduler::{Scheduler, TokioScheduler};
pub use task::{RetryPolicy, Task, TaskStatus};
