use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{bail, Context, Result};
use log::LevelFilter;
use crate::core::task::RetryPolicy;

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 远程文件的暂存目录
    pub staging_dir: String,
    /// 本地仓库目录，按顺序查找
    pub local_repositories: Vec<String>,
    /// 远程仓库地址，按顺序查找
    pub remote_repositories: Vec<String>,
    /// 执行下载的线程数
    pub worker_threads: usize,
    /// 网络超时时间（秒）
    pub timeout: u64,
    /// User-Agent
    pub user_agent: String,
    /// 最多尝试次数（包括第一次）
    pub max_attempts: u32,
    /// 初始重试延迟（毫秒）
    pub retry_delay_ms: u64,
    /// 最大重试延迟（毫秒）
    pub retry_max_delay_ms: u64,
    /// 退避系数
    pub backoff_multiplier: f64,
    /// 抖动因子
    pub jitter_factor: f64,
    /// 日志级别：error / warn / info / debug / trace
    pub log_level: String,
    /// 日志文件，为空时输出到标准错误
    pub log_file: Option<String>,
    /// 日志文件最大字节数，超过后轮转
    pub log_max_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            staging_dir: "./staging".to_string(),
            local_repositories: Vec::new(),
            remote_repositories: vec!["https://repo1.maven.org/maven2".to_string()],
            worker_threads: 4,
            timeout: 30,
            user_agent: format!("artidown/{}", env!("CARGO_PKG_VERSION")),
            max_attempts: policy.max_attempts,
            retry_delay_ms: policy.base_delay.as_millis() as u64,
            retry_max_delay_ms: policy.max_delay.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
            jitter_factor: policy.jitter_factor,
            log_level: "info".to_string(),
            log_file: None,
            log_max_size: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// 加载配置文件；不存在时写入带说明的默认配置
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            let config = Config::default();
            config.save_with_tutorial(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("配置文件格式错误: {}", path))?;
        Ok(config)
    }

    /// 保存带教程的配置文件（唯一写入方法）
    pub fn save_with_tutorial(&self, path: &str) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("无法创建配置目录: {}", parent.display()))?;
        }
        let config_content = toml::to_string_pretty(self).context("无法序列化配置")?;
        let full_content = format!("{}\n{}", TUTORIAL, config_content);
        fs::write(path, full_content).with_context(|| format!("无法保存配置文件: {}", path))?;
        Ok(())
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<()> {
        if self.staging_dir.trim().is_empty() {
            bail!("暂存目录不能为空");
        }
        if self.worker_threads == 0 {
            bail!("线程数必须大于0");
        }
        if self.timeout == 0 {
            bail!("超时时间必须大于0");
        }
        if self.max_attempts == 0 {
            bail!("尝试次数必须大于0");
        }
        if self.retry_max_delay_ms < self.retry_delay_ms {
            bail!("最大重试延迟不能小于初始重试延迟");
        }
        if self.backoff_multiplier < 1.0 {
            bail!("退避系数不能小于1");
        }
        if !(0.0..1.0).contains(&self.jitter_factor) {
            bail!("抖动因子必须在 [0, 1) 之间");
        }
        if self.log_level.parse::<LevelFilter>().is_err() {
            bail!("无效的日志级别: {}", self.log_level);
        }
        for repository in &self.remote_repositories {
            if url::Url::parse(repository).is_err() {
                bail!("无效的远程仓库地址: {}", repository);
            }
        }
        Ok(())
    }

    /// 合并命令行参数到配置
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        // 命令行参数覆盖配置文件
        if let Some(staging_dir) = &args.staging_dir {
            self.staging_dir = staging_dir.clone();
        }

        // -r 追加的仓库排在配置文件之前
        let (remote, local): (Vec<&String>, Vec<&String>) = args
            .repositories
            .iter()
            .partition(|repo| repo.contains("://"));
        if !local.is_empty() {
            let mut merged: Vec<String> = local.into_iter().cloned().collect();
            merged.append(&mut self.local_repositories);
            self.local_repositories = merged;
        }
        if !remote.is_empty() {
            let mut merged: Vec<String> = remote.into_iter().cloned().collect();
            merged.append(&mut self.remote_repositories);
            self.remote_repositories = merged;
        }

        if let Some(max_attempts) = args.max_attempts {
            self.max_attempts = max_attempts;
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
        }
    }

    pub fn level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }

    pub fn local_repository_paths(&self) -> Vec<PathBuf> {
        self.local_repositories.iter().map(PathBuf::from).collect()
    }

    /// 获取配置摘要信息
    pub fn get_summary(&self) -> String {
        let list = |items: &[String]| {
            if items.is_empty() { "无".to_string() } else { items.join(", ") }
        };
        format!(
            "配置摘要:\n\
            - 暂存目录: {}\n\
            - 本地仓库: {}\n\
            - 远程仓库: {}\n\
            - 线程数: {}\n\
            - 超时时间: {} 秒\n\
            - 最多尝试: {} 次\n\
            - 重试延迟: {} ~ {} 毫秒\n\
            - 日志: {} ({})",
            self.staging_dir,
            list(&self.local_repositories),
            list(&self.remote_repositories),
            self.worker_threads,
            self.timeout,
            self.max_attempts,
            self.retry_delay_ms,
            self.retry_max_delay_ms,
            self.log_file.as_deref().unwrap_or("标准错误"),
            self.log_level
        )
    }
}

const TUTORIAL: &str = r#"# artidown 配置文件
# ====================
#
# 这是一个 TOML 格式的配置文件，用于配置 artidown 的行为。
#
# 配置文件位置：
# - Windows: %APPDATA%/artidown/artidown.toml
# - macOS: ~/Library/Application Support/artidown/artidown.toml
# - Linux: ~/.config/artidown/artidown.toml
#
# 命令行参数会覆盖配置文件中的设置，优先级：命令行 > 配置文件 > 默认值
#
# 使用示例：
#   artidown mvn:org.slf4j/slf4j-api/2.0.9                  # 从仓库解析坐标
#   artidown file:///opt/libs/a.jar                          # 本地文件
#   artidown 'wrap:mvn:commons-io/commons-io/2.15.1$Bundle-Name=io'
#   artidown -f urls.txt --json                              # 批量下载，输出 JSON 报告
#   artidown -r ~/.m2/repository mvn:org.foo/bar/1.0         # 追加本地仓库
#
# ==================== 配置项说明 ====================
#
# staging_dir          远程文件下载到这里
# local_repositories   本地仓库目录，按顺序查找
# remote_repositories  远程仓库地址，本地找不到时按顺序下载
# worker_threads       执行下载的线程数
# timeout              网络超时（秒）
# max_attempts         每个地址最多尝试次数，只有网络、超时、服务端错误会重试
# retry_delay_ms       初始重试延迟，之后每次乘以 backoff_multiplier，再加 ±jitter_factor 的抖动
# retry_max_delay_ms   重试延迟上限
# log_level            error / warn / info / debug / trace
# log_file             日志文件，不设置时输出到标准错误
# log_max_size         日志文件超过这个字节数后轮转为 <log_file>.backup
#
# ==================== 故障排除 ====================
#
# 问题：经常下载失败
# 解决：增加 max_attempts 或 timeout 值
#
# 问题：坐标找不到
# 解决：检查 remote_repositories，或用 -r 追加仓库
"#;
