//! `task` 模块包含了与单个下载任务相关的所有逻辑
//!
//! 主要包括：
//! - `promise`: 一次性写入的结果 `Task`
//! - `state`: 任务状态 `TaskStatus`
//! - `retry`: 带退避的重试任务
//! - `chained`: 包装地址的两段式下载

pub mod promise;
pub mod state;
pub mod retry;
pub mod chained;

pub use promise::{Listener, Task};
pub use state::TaskStatus;
pub use retry::{Attempt, RetryPolicy, RetryStats, RetryableTask};
pub use chained::ChainedTask;
