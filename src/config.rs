//! 应用配置模块

use crate::error::SyncError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// 配置文件名
pub const CONFIG_FILE: &str = "config.json";

/// 默认分段上传阈值与分段大小（8 MiB）
pub const DEFAULT_MULTIPART_SIZE: u64 = 8 * 1024 * 1024;
/// S3 要求除最后一段外每段至少 5 MiB
pub const MIN_MULTIPART_CHUNKSIZE: u64 = 5 * 1024 * 1024;

/// S3 连接配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    /// 区域，未设置时由 SDK 默认链决定
    #[serde(default)]
    pub region: Option<String>,
    /// 自定义端点（MinIO 等兼容服务）
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// 最大并发请求数
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// 使用路径风格访问
    #[serde(default)]
    pub force_path_style: bool,
    /// 超过该大小的文件使用分段上传
    #[serde(default = "default_multipart_size")]
    pub multipart_threshold: u64,
    /// 分段上传时每段的大小
    #[serde(default = "default_multipart_size")]
    pub multipart_chunksize: u64,
}

fn default_max_concurrent_requests() -> usize {
    10
}

fn default_multipart_size() -> u64 {
    DEFAULT_MULTIPART_SIZE
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: None,
            endpoint_url: None,
            max_concurrent_requests: default_max_concurrent_requests(),
            force_path_style: false,
            multipart_threshold: DEFAULT_MULTIPART_SIZE,
            multipart_chunksize: DEFAULT_MULTIPART_SIZE,
        }
    }
}

impl S3Config {
    /// 从配置文件加载 S3 配置
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "s3").unwrap_or_default()
    }

    /// 保存 S3 配置
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        save_section(config_dir, "s3", self)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.max_concurrent_requests == 0 {
            return Err(SyncError::Config(
                "maxConcurrentRequests must be at least 1".to_string(),
            ));
        }
        if self.multipart_chunksize < MIN_MULTIPART_CHUNKSIZE {
            return Err(SyncError::Config(format!(
                "multipartChunksize must be at least {} bytes",
                MIN_MULTIPART_CHUNKSIZE
            )));
        }
        if let Some(ref endpoint) = self.endpoint_url {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(SyncError::Config(format!(
                    "endpoint URL {} must start with http:// or https://",
                    endpoint
                )));
            }
        }
        Ok(())
    }
}

/// 读取 config.json 中的一个段，文件缺失或格式错误时返回 None
pub fn load_section<T: DeserializeOwned>(config_dir: &Path, section: &str) -> Option<T> {
    let content = fs::read_to_string(config_dir.join(CONFIG_FILE)).ok()?;
    let config = serde_json::from_str::<serde_json::Value>(&content).ok()?;
    serde_json::from_value::<T>(config.get(section)?.clone()).ok()
}

/// 更新 config.json 中的一个段，保留其余内容
pub fn save_section<T: Serialize>(config_dir: &Path, section: &str, value: &T) -> io::Result<()> {
    fs::create_dir_all(config_dir)?;
    let config_file = config_dir.join(CONFIG_FILE);

    // 读取现有配置
    let mut config: serde_json::Value = if config_file.exists() {
        let content = fs::read_to_string(&config_file)?;
        serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
    } else {
        serde_json::json!({})
    };
    if !config.is_object() {
        config = serde_json::json!({});
    }

    config[section] = serde_json::to_value(value)?;

    fs::write(&config_file, serde_json::to_string_pretty(&config)?)
}
