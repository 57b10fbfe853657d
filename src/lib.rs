pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use crate::core::{ExitStatus, SyncConfig, SyncEngine, SyncPlan, SyncReport};
pub use error::SyncError;

/// 平台配置目录
pub mod dirs {
    use std::path::PathBuf;

    /// 覆盖配置目录的环境变量
    pub const CONFIG_DIR_ENV: &str = "S3SYNC_CONFIG_DIR";

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            // Linux
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }

    /// 应用配置目录：环境变量优先，其次为平台目录下的 s3sync
    pub fn app_config_dir() -> PathBuf {
        std::env::var(CONFIG_DIR_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .or_else(|| config_dir().map(|p| p.join("s3sync")))
            .unwrap_or_else(|| PathBuf::from(".s3sync"))
    }
}
