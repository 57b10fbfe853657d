//! 致命错误类型

use crate::core::report::ExitStatus;
use std::path::PathBuf;
use thiserror::Error;

/// 导致整个同步无法进行的错误
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("The user-provided path {} does not exist.", .path.display())]
    PathNotFound { path: PathBuf },

    #[error("The user-provided path {} is not a directory.", .path.display())]
    NotADirectory { path: PathBuf },

    #[error("Invalid S3 URI: {0}")]
    InvalidUri(String),

    #[error("Unsupported paths {source_path} and {dest_path}: one must be a local path and the other an s3:// URI")]
    UnsupportedPaths {
        source_path: String,
        dest_path: String,
    },

    #[error("Invalid filter pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Unable to list {location}: {message}")]
    Listing { location: String, message: String },

    #[error("{0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub fn listing(location: &str, err: anyhow::Error) -> Self {
        SyncError::Listing {
            location: location.to_string(),
            message: format!("{:#}", err),
        }
    }

    /// 参数错误返回 2，其余返回 255
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            SyncError::InvalidUri(_)
            | SyncError::UnsupportedPaths { .. }
            | SyncError::InvalidPattern { .. } => ExitStatus::Usage,
            _ => ExitStatus::Fatal,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_status().code()
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        SyncError::Storage(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = SyncError::PathNotFound {
            path: PathBuf::from("/no/such/dir"),
        };
        assert_eq!(
            err.to_string(),
            "The user-provided path /no/such/dir does not exist."
        );
        assert_eq!(err.exit_code(), 255);
    }

    #[test]
    fn test_usage_errors_exit_two() {
        let err = SyncError::UnsupportedPaths {
            source_path: "a".to_string(),
            dest_path: "b".to_string(),
        };
        assert_eq!(err.exit_code(), 2);

        let err = SyncError::listing("s3://bucket/", anyhow::anyhow!("AccessDenied"));
        assert_eq!(err.to_string(), "Unable to list s3://bucket/: AccessDenied");
        assert_eq!(err.exit_code(), 255);
    }
}
