//! CLI: 命令行接口和参数解析模块
//!
//! ## 支持的命令
//!
//! - 下载：`artidown <url>...`
//! - 批量下载：`artidown -f urls.txt`
//! - 编辑配置：`artidown -e`
//! - 指定配置：`artidown -c config.toml <url>`
//! - 追加仓库：`artidown -r ~/.m2/repository <url>`
//!
//! ## 平台支持
//!
//! - Windows: `%APPDATA%/artidown/artidown.toml`
//! - macOS: `~/Library/Application Support/artidown/artidown.toml`
//! - Linux: `~/.config/artidown/artidown.toml`

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::env;
use std::fs;
use crate::config::Config;
use crate::utils::validator::is_valid_url;

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/artidown/artidown.toml", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/artidown/artidown.toml", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/artidown/artidown.toml", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // 优先 $EDITOR，其次 xdg-open，最后 nano
        if let Ok(editor) = env::var("EDITOR") {
            if std::process::Command::new(editor).arg(config_path).status().is_ok() {
                return;
            }
        }
        if std::process::Command::new("xdg-open").arg(config_path).status().is_err() {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

/// artidown 命令行参数
///
/// 示例用法：
///   artidown mvn:org.slf4j/slf4j-api/2.0.9
///   artidown -e  # 编辑配置文件
///   artidown -f urls.txt --json
///
/// 更多用法请加 --help 查看
#[derive(Parser, Debug, Clone)]
#[command(
    name = "artidown",
    author = "panzhifu",
    version = env!("CARGO_PKG_VERSION"),
    about = "并发制品下载工具",
    long_about = "按地址去重的并发下载工具，支持仓库坐标、包装地址和带退避的重试。\n\n示例：\n  artidown mvn:org.slf4j/slf4j-api/2.0.9\n  artidown 'wrap:mvn:commons-io/commons-io/2.15.1$Bundle-Name=io'\n  artidown -f urls.txt --json\n  artidown -e\n"
)]
pub struct Args {
    /// 要下载的地址列表
    #[arg(required = false, help = "要下载的地址，可以同时指定多个。")]
    pub urls: Vec<String>,

    /// 包含地址列表的文件路径
    #[arg(short, long, help = "包含地址列表的文件路径，每行一个，# 开头为注释。")]
    pub file: Option<String>,

    /// 配置文件路径，默认为平台推荐路径
    #[arg(short = 'c', long, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    /// 编辑配置文件（-e 或 --edit）
    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    /// 暂存目录
    #[arg(long, short = 'd', help = "远程文件的暂存目录，覆盖配置文件中的设置。")]
    pub staging_dir: Option<String>,

    /// 追加仓库，可以重复
    #[arg(long = "repository", short = 'r', help = "追加仓库：本地目录或远程地址，可以重复指定。")]
    pub repositories: Vec<String>,

    /// 最多尝试次数
    #[arg(long, help = "每个地址最多尝试次数，覆盖配置文件中的设置。")]
    pub max_attempts: Option<u32>,

    /// 以 JSON 格式输出结果
    #[arg(long, help = "以 JSON 格式输出下载报告。")]
    pub json: bool,
}

impl Args {
    /// 解析命令行参数并加载配置
    pub fn parse_args() -> Result<(Self, Config)> {
        let args = Args::parse();

        if args.edit_config {
            // 先保证文件存在再打开
            Config::load(&args.config)?;
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        let config = args.load_config()?;
        Ok((args, config))
    }

    /// 加载或创建配置文件，合并命令行参数并校验
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(&self.config)?;
        config.merge_from_args(self);
        config.validate().context("配置无效")?;
        Ok(config)
    }

    /// 合并命令行和文件中的地址
    pub fn get_urls(&self) -> Result<Vec<String>> {
        let mut urls = Vec::new();

        for url in &self.urls {
            if !is_valid_url(url) {
                bail!("无效的地址: {}", url);
            }
            urls.push(url.trim().to_string());
        }

        if let Some(file_path) = &self.file {
            let content = fs::read_to_string(file_path)
                .with_context(|| format!("无法读取地址文件: {}", file_path))?;

            // 按行读取，忽略空行和注释
            for (number, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if !is_valid_url(line) {
                    bail!("{} 第 {} 行不是有效地址: {}", file_path, number + 1, line);
                }
                urls.push(line.to_string());
            }
        }

        if urls.is_empty() {
            bail!("未提供任何地址。请通过命令行参数或文件提供至少一个地址。");
        }

        Ok(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from(["artidown", "--json", "mvn:org.foo/bar/1.0"]).unwrap();
        assert!(args.json);
        assert_eq!(args.urls, vec!["mvn:org.foo/bar/1.0".to_string()]);
        assert_eq!(args.max_attempts, None);
    }

    #[test]
    fn test_config_loading() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("artidown.toml");
        let args = Args::try_parse_from([
            "artidown",
            "-c",
            path.to_str().unwrap(),
            "--max-attempts",
            "2",
            "file:///tmp/a.jar",
        ])
        .unwrap();

        let config = args.load_config().unwrap();
        assert_eq!(config.max_attempts, 2);
        assert!(path.exists());
    }

    #[test]
    fn test_url_file_parsing() {
        let dir = tempdir().unwrap();
        let list = dir.path().join("urls.txt");
        let content = "# 这是一个注释\nmvn:org.foo/bar/1.0\n\n  https://example.com/a.jar  \n";
        fs::write(&list, content).unwrap();

        let args = Args::try_parse_from(["artidown", "-f", list.to_str().unwrap(), "file:///tmp/b.jar"]).unwrap();
        let urls = args.get_urls().unwrap();
        assert_eq!(
            urls,
            vec![
                "file:///tmp/b.jar".to_string(),
                "mvn:org.foo/bar/1.0".to_string(),
                "https://example.com/a.jar".to_string(),
            ]
        );
    }

    #[test]
    fn test_invalid_line_is_reported() {
        let dir = tempdir().unwrap();
        let list = dir.path().join("urls.txt");
        fs::write(&list, "mvn:org.foo/bar/1.0\nnot a url\n").unwrap();

        let args = Args::try_parse_from(["artidown", "-f", list.to_str().unwrap()]).unwrap();
        let error = args.get_urls().unwrap_err().to_string();
        assert!(error.contains("第 2 行"), "{}", error);
    }

    #[test]
    fn test_no_urls_is_an_error() {
        let args = Args::try_parse_from(["artidown"]).unwrap();
        assert!(args.get_urls().is_err());
    }
}
