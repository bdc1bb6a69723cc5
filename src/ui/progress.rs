use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::core::task::Task;

// 结构体：ProgressManager
// 按完成的地址数显示进度
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::with_template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        bar.set_style(style);
        Self { bar }
    }

    /// 不输出任何内容，JSON 模式下使用
    pub fn hidden(total: u64) -> Self {
        let manager = Self::new(total);
        manager.bar.set_draw_target(ProgressDrawTarget::hidden());
        manager
    }

    /// 一个地址结束
    pub fn task_done(&self, task: &Task) {
        match task.error() {
            None => self.bar.set_message(format!("✓ {}", task.url())),
            Some(e) => self.bar.println(format!("✗ {} - {}", task.url(), e)),
        }
        self.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
