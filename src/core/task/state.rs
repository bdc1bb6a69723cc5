use serde::{Serialize, Deserialize};

/// 下载任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_done(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}
