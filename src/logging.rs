//! 日志模块 - 提供文件日志和大小管理功能

use crate::config::{load_section, save_section};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

/// 日志文件名
const LOG_FILE: &str = "s3sync.log";

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否启用日志记录
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最大日志文件大小（MB）
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5 // 默认 5MB
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
        }
    }
}

impl LogConfig {
    /// 从配置文件加载日志配置
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "log").unwrap_or_default()
    }

    /// 保存日志配置
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        save_section(config_dir, "log", self)
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

type SharedWriter = Arc<Mutex<Option<BufWriter<File>>>>;

fn lock(writer: &SharedWriter) -> io::Result<MutexGuard<'_, Option<BufWriter<File>>>> {
    writer
        .lock()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer poisoned"))
}

/// 带大小限制的日志写入器
#[derive(Clone)]
pub struct SizeRotatingWriter {
    file_path: PathBuf,
    max_size: u64,
    writer: SharedWriter,
}

impl SizeRotatingWriter {
    pub fn new(log_dir: &Path, max_size_mb: u32) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;

        let file_path = log_dir.join(LOG_FILE);
        let max_size = (max_size_mb as u64) * 1024 * 1024;

        let writer = Self::open_file(&file_path, max_size)?;

        Ok(Self {
            file_path,
            max_size,
            writer: Arc::new(Mutex::new(Some(writer))),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn open_file(file_path: &Path, max_size: u64) -> io::Result<BufWriter<File>> {
        // 检查现有文件大小，如果超过限制则轮转
        if Self::exceeds(file_path, max_size) {
            Self::rotate_log(file_path)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        Ok(BufWriter::new(file))
    }

    fn exceeds(file_path: &Path, max_size: u64) -> bool {
        fs::metadata(file_path)
            .map(|m| m.len() > max_size)
            .unwrap_or(false)
    }

    /// 轮转日志文件：s3sync.log -> s3sync.log.old
    fn rotate_log(file_path: &Path) -> io::Result<()> {
        let backup_path = file_path.with_extension("log.old");

        if backup_path.exists() {
            fs::remove_file(&backup_path)?;
        }

        fs::rename(file_path, &backup_path)
    }

    /// 关闭当前文件，轮转后重新打开
    fn reopen(writer: &SharedWriter, file_path: &Path, max_size: u64) -> io::Result<()> {
        let mut guard = lock(writer)?;
        if let Some(mut w) = guard.take() {
            let _ = w.flush();
        }
        Self::rotate_log(file_path)?;
        *guard = Some(Self::open_file(file_path, max_size)?);
        Ok(())
    }

    /// 检查并轮转日志
    fn check_and_rotate(&self) -> io::Result<()> {
        if Self::exceeds(&self.file_path, self.max_size) {
            Self::reopen(&self.writer, &self.file_path, self.max_size)?;
        }
        Ok(())
    }
}

/// 日志写入器包装
pub struct LogWriter {
    inner: SharedWriter,
    file_path: PathBuf,
    max_size: u64,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = {
            let mut guard = lock(&self.inner)?;
            let writer = guard
                .as_mut()
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "Writer not available"))?;
            let n = writer.write(buf)?;
            writer.flush()?;
            n
        };

        if SizeRotatingWriter::exceeds(&self.file_path, self.max_size) {
            let _ = SizeRotatingWriter::reopen(&self.inner, &self.file_path, self.max_size);
        }

        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match lock(&self.inner)?.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SizeRotatingWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        // 在创建写入器前检查轮转
        let _ = self.check_and_rotate();

        LogWriter {
            inner: self.writer.clone(),
            file_path: self.file_path.clone(),
            max_size: self.max_size,
        }
    }
}

/// 获取日志目录路径（配置目录下的 logs）
pub fn get_log_dir() -> PathBuf {
    crate::dirs::app_config_dir().join("logs")
}

/// 初始化日志系统
///
/// 日志始终写入文件；`debug` 为 true 时同时输出到 stderr。
/// stderr 默认只留给用户可见的诊断信息。
pub fn init_logging(debug: bool) {
    let config_dir = crate::dirs::app_config_dir();
    let config = LogConfig::load(&config_dir);

    if !config.enabled && !debug {
        // 日志已禁用，只初始化一个空的 subscriber
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return;
    }

    let level = if debug {
        tracing::Level::DEBUG
    } else {
        config.tracing_level()
    };
    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["aws_smithy_runtime=warn", "aws_config=warn", "hyper=warn"] {
        if let Ok(d) = directive.parse() {
            env_filter = env_filter.add_directive(d);
        }
    }

    let file_layer = if config.enabled {
        SizeRotatingWriter::new(&get_log_dir(), config.max_size_mb)
            .ok()
            .map(|writer| {
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
            })
    } else {
        None
    };

    let console_layer = debug.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
    });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer);

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_config_roundtrip_through_file() {
        let dir = TempDir::new().unwrap();
        assert_eq!(LogConfig::load(dir.path()), LogConfig::default());

        let config = LogConfig {
            enabled: false,
            max_size_mb: 1,
            level: "debug".to_string(),
        };
        config.save(dir.path()).unwrap();
        assert_eq!(LogConfig::load(dir.path()), config);
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_writer_appends_to_log_file() {
        let dir = TempDir::new().unwrap();
        let writer = SizeRotatingWriter::new(dir.path(), 1).unwrap();

        let mut w = writer.make_writer();
        w.write_all(b"first line\n").unwrap();
        w.flush().unwrap();

        let content = fs::read_to_string(writer.file_path()).unwrap();
        assert_eq!(content, "first line\n");
        assert!(writer.file_path().ends_with(LOG_FILE));
    }

    #[test]
    fn test_rotates_past_max_size() {
        let dir = TempDir::new().unwrap();
        let log_file = dir.path().join(LOG_FILE);
        fs::write(&log_file, vec![b'x'; 2 * 1024 * 1024]).unwrap();

        // 打开时发现超过限制，旧文件被移到 .old
        let writer = SizeRotatingWriter::new(dir.path(), 1).unwrap();
        assert!(dir.path().join("s3sync.log.old").exists());
        assert_eq!(fs::metadata(writer.file_path()).unwrap().len(), 0);
    }
}
