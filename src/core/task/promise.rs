use std::fmt;
use std::mem;
use std::path::PathBuf;

use parking_lot::{Condvar, Mutex};
use uuid::Uuid;

use crate::core::error::{DownloadError, DownloadResult};
use super::state::TaskStatus;

/// 完成回调，每个回调只会被调用一次
pub type Listener = Box<dyn FnOnce(&Task) + Send>;

enum Slot {
    Pending(Vec<Listener>),
    Done(DownloadResult<PathBuf>),
}

/// 一次性写入的下载结果
///
/// 结果只能设置一次。已完成后注册的回调会在调用线程上立即执行，
/// 之前注册的回调按注册顺序在完成时执行，执行时不持有内部锁。
pub struct Task {
    id: Uuid,
    url: String,
    slot: Mutex<Slot>,
    done: Condvar,
}

impl Task {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            slot: Mutex::new(Slot::Pending(Vec::new())),
            done: Condvar::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> TaskStatus {
        match &*self.slot.lock() {
            Slot::Pending(_) => TaskStatus::Pending,
            Slot::Done(Ok(_)) => TaskStatus::Completed,
            Slot::Done(Err(_)) => TaskStatus::Failed,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status().is_done()
    }

    /// 注册完成回调；已完成时立即执行
    pub fn add_listener(&self, listener: Listener) {
        {
            let mut slot = self.slot.lock();
            if let Slot::Pending(listeners) = &mut *slot {
                listeners.push(listener);
                return;
            }
        }
        listener(self);
    }

    pub fn complete(&self, path: PathBuf) -> DownloadResult<()> {
        self.finish(Ok(path))
    }

    pub fn fail(&self, error: DownloadError) -> DownloadResult<()> {
        self.finish(Err(error))
    }

    /// 设置结果并通知所有回调；重复设置返回 `AlreadyCompleted`，原结果保持不变
    pub fn finish(&self, result: DownloadResult<PathBuf>) -> DownloadResult<()> {
        let listeners = {
            let mut slot = self.slot.lock();
            if let Slot::Done(_) = &*slot {
                log::error!("任务 {} 重复设置结果", self.url);
                return Err(DownloadError::AlreadyCompleted(self.url.clone()));
            }
            match mem::replace(&mut *slot, Slot::Done(result)) {
                Slot::Pending(listeners) => listeners,
                Slot::Done(_) => Vec::new(),
            }
        };
        self.done.notify_all();

        for listener in listeners {
            listener(self);
        }
        Ok(())
    }

    /// 当前结果；未完成时为 `None`
    pub fn result(&self) -> Option<DownloadResult<PathBuf>> {
        match &*self.slot.lock() {
            Slot::Pending(_) => None,
            Slot::Done(result) => Some(result.clone()),
        }
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.result().and_then(Result::ok)
    }

    pub fn error(&self) -> Option<DownloadError> {
        self.result().and_then(Result::err)
    }

    /// 阻塞等待结果
    pub fn wait(&self) -> DownloadResult<PathBuf> {
        let mut slot = self.slot.lock();
        loop {
            if let Slot::Done(result) = &*slot {
                return result.clone();
            }
            self.done.wait(&mut slot);
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("status", &self.status())
            .finish()
    }
}
