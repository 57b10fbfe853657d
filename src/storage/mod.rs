pub mod local;
pub mod s3;
#[cfg(test)]
pub mod scripted;

use crate::config::S3Config;
use crate::core::entry::{LastModified, StorageClass};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;

pub use local::LocalStorage;
pub use s3::{S3Storage, S3Uri};
#[cfg(test)]
pub use scripted::{Call, ScriptedResponse, ScriptedStorage};

// ============ 公共常量 ============

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 60;
/// 单次请求超时（秒）- GetObject/PutObject 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 传输时的数据来源
pub type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

/// 一次传输的内容：流式读取，不整体载入内存
pub struct TransferBody {
    pub reader: ByteReader,
    /// 内容长度
    pub size: u64,
}

impl TransferBody {
    pub fn new(reader: impl AsyncRead + Send + 'static, size: u64) -> Self {
        Self {
            reader: Box::pin(reader),
            size,
        }
    }
}

impl fmt::Debug for TransferBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferBody").field("size", &self.size).finish()
    }
}

/// 存储列表中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// 相对存储根的路径
    pub path: String,
    pub size: u64,
    pub modified: LastModified,
    pub is_dir: bool,
    pub storage_class: StorageClass,
    /// 无法读取时的原因（元数据、文件名编码、目录遍历错误）
    pub error: Option<String>,
}

impl FileInfo {
    /// 无法读取的条目，仍然出现在列表中以便报告
    pub fn unreadable(path: String, reason: String) -> Self {
        Self {
            path,
            size: 0,
            modified: LastModified::Invalid(String::new()),
            is_dir: false,
            storage_class: StorageClass::Standard,
            error: Some(reason),
        }
    }
}

/// 键只能由普通路径段组成，不能是绝对路径或包含 ..
pub fn is_relative_key(key: &str) -> bool {
    !key.is_empty()
        && Path::new(key)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && !key.split(['/', '\\']).any(|part| part == "..")
}

/// 写入选项
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// 本地写入后设置的修改时间
    pub modified: Option<DateTime<Utc>>,
    /// 上传时使用的存储类型
    pub storage_class: Option<String>,
    /// 上传时设置的网站重定向地址
    pub website_redirect: Option<String>,
}

/// 存储抽象接口
#[async_trait]
pub trait Storage: Send + Sync {
    /// 递归列出根下的所有文件
    async fn list_files(&self) -> Result<Vec<FileInfo>>;

    /// 打开文件用于流式读取
    async fn read(&self, path: &str) -> Result<TransferBody>;

    /// 从流写入整个文件，必要时创建父目录
    async fn write(&self, path: &str, body: TransferBody, options: &WriteOptions) -> Result<()>;

    /// 删除文件
    async fn delete(&self, path: &str) -> Result<()>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;

    /// 面向用户的完整路径
    fn display_path(&self, path: &str) -> String {
        format!("{}/{}", self.name().trim_end_matches('/'), path)
    }
}

/// 同步路径：本地目录或 S3 位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    S3(S3Uri),
}

impl Location {
    /// s3:// 开头的参数解析为 S3 位置，其余视为本地路径
    pub fn parse(arg: &str) -> std::result::Result<Self, crate::error::SyncError> {
        if arg.starts_with("s3://") {
            Ok(Location::S3(S3Uri::parse(arg)?))
        } else {
            Ok(Location::Local(PathBuf::from(arg)))
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::S3(uri) => write!(f, "{}", uri),
        }
    }
}

/// 存储构建参数
#[derive(Debug, Clone)]
pub struct StorageOptions {
    pub s3: S3Config,
    pub follow_symlinks: bool,
}

/// 根据位置创建存储实例
pub async fn create_storage(
    location: &Location,
    options: &StorageOptions,
) -> Result<Arc<dyn Storage>> {
    match location {
        Location::Local(path) => {
            tracing::info!("初始化本地存储: {}", path.display());
            Ok(Arc::new(LocalStorage::new(path.clone(), options.follow_symlinks)) as Arc<dyn Storage>)
        }
        Location::S3(uri) => {
            tracing::info!(
                "初始化S3存储: bucket={}, prefix={}, region={:?}",
                uri.bucket,
                uri.prefix,
                options.s3.region
            );
            Ok(Arc::new(S3Storage::new(uri.clone(), &options.s3).await?) as Arc<dyn Storage>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_parse() {
        let loc = Location::parse("s3://bucket/dir").unwrap();
        assert!(matches!(loc, Location::S3(_)));
        assert_eq!(loc.to_string(), "s3://bucket/dir/");

        let loc = Location::parse("./data").unwrap();
        assert_eq!(loc, Location::Local(PathBuf::from("./data")));

        assert!(Location::parse("s3://").is_err());
    }

    #[test]
    fn test_relative_keys() {
        assert!(is_relative_key("foo.txt"));
        assert!(is_relative_key("a/b/c.txt"));
        assert!(is_relative_key("a/./b"));
        assert!(is_relative_key("..foo"));

        assert!(!is_relative_key(""));
        assert!(!is_relative_key("../escaped.txt"));
        assert!(!is_relative_key("a/../../b"));
        assert!(!is_relative_key("/etc/passwd"));
        assert!(!is_relative_key("..\\escaped.txt"));
        assert!(!is_relative_key("a/..\\..\\b"));
    }
}
