use chrono::Local; // 用于获取本地时间
use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::Config;

struct LogFile {
    writer: BufWriter<File>,
    current_size: u64,
}

/// 写文件的日志器，超过大小后轮转为 `<file>.backup`
pub struct FileLogger {
    file: Mutex<LogFile>,
    level: LevelFilter,
    file_path: String,
    max_size: u64, // 最大文件大小 (bytes)
}

fn open_append(file_path: &str) -> std::io::Result<(BufWriter<File>, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(file_path)?;
    let size = file.metadata()?.len();
    Ok((BufWriter::new(file), size))
}

impl FileLogger {
    pub fn new(file_path: &str, level: LevelFilter, max_size: u64) -> Result<Self, std::io::Error> {
        // 确保日志目录存在
        if let Some(parent) = Path::new(file_path).parent() {
            fs::create_dir_all(parent)?;
        }
        let (writer, current_size) = open_append(file_path)?;

        Ok(Self {
            file: Mutex::new(LogFile { writer, current_size }),
            level,
            file_path: file_path.to_string(),
            max_size,
        })
    }

    /// 检查并执行日志轮转
    fn check_rotation(&self, file: &mut LogFile) -> Result<(), std::io::Error> {
        if file.current_size <= self.max_size {
            return Ok(());
        }
        file.writer.flush()?;

        let backup_path = format!("{}.backup", self.file_path);
        if Path::new(&backup_path).exists() {
            fs::remove_file(&backup_path)?;
        }
        fs::rename(&self.file_path, &backup_path)?;

        let (writer, current_size) = open_append(&self.file_path)?;
        file.writer = writer;
        file.current_size = current_size;
        Ok(())
    }

    fn write_entry(&self, entry: &str) -> Result<(), std::io::Error> {
        let mut file = self.file.lock();
        self.check_rotation(&mut file)?;
        file.writer.write_all(entry.as_bytes())?;
        file.current_size += entry.len() as u64;
        file.writer.flush()
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = format!(
            "{} [{}] {} - {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );
        if let Err(e) = self.write_entry(&entry) {
            eprintln!("日志写入失败: {}", e);
        }
    }

    fn flush(&self) {
        let _ = self.file.lock().writer.flush();
    }
}

/// 按配置安装全局日志器：配置了日志文件时写文件，否则用 env_logger 输出到标准错误
pub fn init(config: &Config) -> anyhow::Result<()> {
    let level = config.level_filter();
    match &config.log_file {
        Some(path) => {
            let logger = FileLogger::new(path, level, config.log_max_size)?;
            log::set_boxed_logger(Box::new(logger))?;
            log::set_max_level(level);
        }
        None => {
            env_logger::Builder::new()
                .filter_level(level)
                .parse_default_env()
                .try_init()?;
        }
    }
    Ok(())
}
