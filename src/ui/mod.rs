mod progress;

use std::fmt;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::core::task::{Task, TaskStatus};
pub use progress::ProgressManager;

pub fn print_success(message: &str) {
    println!("✓ {}", message);
}

pub fn print_error(message: &str) {
    eprintln!("✗ {}", message);
}

/// 单个地址的结果
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub url: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportEntry {
    pub fn from_task(task: &Task) -> Self {
        Self {
            url: task.url().to_string(),
            status: task.status(),
            path: task.path().map(|p| p.display().to_string()),
            error: task.error().map(|e| e.to_string()),
        }
    }
}

/// 一次运行的报告，`--json` 时原样输出
#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub started_at: DateTime<Local>,
    pub elapsed_ms: u64,
    pub entries: Vec<ReportEntry>,
}

impl DownloadReport {
    pub fn new(started_at: DateTime<Local>, elapsed: Duration, tasks: &[Arc<Task>]) -> Self {
        Self {
            started_at,
            elapsed_ms: elapsed.as_millis() as u64,
            entries: tasks.iter().map(|task| ReportEntry::from_task(task)).collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn summary(&self) -> DownloadSummary {
        let success_count = self
            .entries
            .iter()
            .filter(|e| e.status == TaskStatus::Completed)
            .count();
        let total_size = self
            .entries
            .iter()
            .filter_map(|e| e.path.as_ref())
            .filter_map(|path| fs::metadata(path).ok())
            .map(|meta| meta.len())
            .sum();
        DownloadSummary {
            total_files: self.entries.len(),
            total_size,
            elapsed_time: Duration::from_millis(self.elapsed_ms),
            success_count,
            failed_count: self.entries.len() - success_count,
        }
    }
}

pub struct DownloadSummary {
    pub total_files: usize,
    pub total_size: u64,
    pub elapsed_time: Duration,
    pub success_count: usize,
    pub failed_count: usize,
}

impl fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n下载摘要:")?;
        writeln!(f, "总文件数: {}", self.total_files)?;
        writeln!(f, "总大小: {}", format_size(self.total_size))?;
        writeln!(f, "耗时: {:.2}秒", self.elapsed_time.as_secs_f64())?;
        writeln!(f, "成功: {}", self.success_count)?;
        writeln!(f, "失败: {}", self.failed_count)?;
        Ok(())
    }
}

fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::DownloadError;
    use tempfile::tempdir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_report_and_summary() {
        let dir = tempdir().unwrap();
        let jar = dir.path().join("a.jar");
        fs::write(&jar, vec![0u8; 2048]).unwrap();

        let ok = Arc::new(Task::new("file:///a.jar"));
        ok.complete(jar).unwrap();
        let failed = Arc::new(Task::new("mvn:org.foo/missing/1.0"));
        failed.fail(DownloadError::NotFound("mvn:org.foo/missing/1.0".to_string())).unwrap();

        let report = DownloadReport::new(Local::now(), Duration::from_millis(1500), &[ok, failed]);
        let summary = report.summary();
        assert_eq!(summary.total_files, 2);
        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.failed_count, 1);
        assert_eq!(summary.total_size, 2048);
        assert!(summary.to_string().contains("总大小: 2.00 KB"));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["elapsed_ms"], 1500);
        assert_eq!(json["entries"][0]["status"], "Completed");
        assert_eq!(json["entries"][1]["status"], "Failed");
        assert!(json["entries"][1]["error"].as_str().unwrap().contains("资源不存在"));
        assert!(json["entries"][1].get("path").is_none());
    }
}
