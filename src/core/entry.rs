//! 同步条目模型：键、大小、修改时间、存储类型、来源

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// 条目来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Local,
    Remote,
}

/// 修改时间
///
/// 只有能以 RFC 3339（四位年份）表示的时间才视为有效，
/// 其余情况保留原始文本，用于诊断输出。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LastModified {
    At(DateTime<Utc>),
    Invalid(String),
}

impl LastModified {
    /// 从 Unix 时间戳（秒 + 纳秒）构造
    pub fn from_unix(secs: i64, nanos: u32) -> Self {
        match DateTime::from_timestamp(secs, nanos) {
            Some(t) if (1..=9999).contains(&t.year()) => LastModified::At(t),
            _ => LastModified::Invalid(secs.to_string()),
        }
    }

    /// 从文件系统时间构造，早于 1970 年的时间以负秒数表示
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => match i64::try_from(d.as_secs()) {
                Ok(secs) => Self::from_unix(secs, d.subsec_nanos()),
                Err(_) => LastModified::Invalid(d.as_secs().to_string()),
            },
            Err(e) => {
                let before = e.duration();
                match i64::try_from(before.as_secs()) {
                    // 负方向需要借位：-1.25s 表示为 secs=-2, nanos=0.75s
                    Ok(secs) if before.subsec_nanos() == 0 => Self::from_unix(-secs, 0),
                    Ok(secs) => {
                        Self::from_unix(-secs - 1, 1_000_000_000 - before.subsec_nanos())
                    }
                    Err(_) => LastModified::Invalid(format!("-{}", before.as_secs())),
                }
            }
        }
    }

    /// 解析 RFC 3339 文本（S3 列表中的 LastModified）
    pub fn parse_rfc3339(raw: &str) -> Self {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(t) => LastModified::At(t.with_timezone(&Utc)),
            Err(_) => LastModified::Invalid(raw.to_string()),
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            LastModified::At(t) => Some(*t),
            LastModified::Invalid(_) => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, LastModified::At(_))
    }
}

impl fmt::Display for LastModified {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LastModified::At(t) => write!(f, "{}", t.to_rfc3339()),
            LastModified::Invalid(raw) => write!(f, "{}", raw),
        }
    }
}

/// 对象存储类型
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StorageClass {
    #[default]
    Standard,
    ReducedRedundancy,
    StandardIa,
    OnezoneIa,
    IntelligentTiering,
    GlacierIr,
    Glacier,
    DeepArchive,
    Outposts,
    Other(String),
}

impl StorageClass {
    /// 按 S3 的名称解析，未知名称保留原样
    pub fn parse(name: &str) -> Self {
        match name {
            "" | "STANDARD" => StorageClass::Standard,
            "REDUCED_REDUNDANCY" => StorageClass::ReducedRedundancy,
            "STANDARD_IA" => StorageClass::StandardIa,
            "ONEZONE_IA" => StorageClass::OnezoneIa,
            "INTELLIGENT_TIERING" => StorageClass::IntelligentTiering,
            "GLACIER_IR" => StorageClass::GlacierIr,
            "GLACIER" => StorageClass::Glacier,
            "DEEP_ARCHIVE" => StorageClass::DeepArchive,
            "OUTPOSTS" => StorageClass::Outposts,
            other => StorageClass::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StorageClass::Standard => "STANDARD",
            StorageClass::ReducedRedundancy => "REDUCED_REDUNDANCY",
            StorageClass::StandardIa => "STANDARD_IA",
            StorageClass::OnezoneIa => "ONEZONE_IA",
            StorageClass::IntelligentTiering => "INTELLIGENT_TIERING",
            StorageClass::GlacierIr => "GLACIER_IR",
            StorageClass::Glacier => "GLACIER",
            StorageClass::DeepArchive => "DEEP_ARCHIVE",
            StorageClass::Outposts => "OUTPOSTS",
            StorageClass::Other(name) => name,
        }
    }

    /// 归档类型，读取前需要先执行恢复
    pub fn is_restricted(&self) -> bool {
        matches!(self, StorageClass::Glacier | StorageClass::DeepArchive)
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 参与比较的文件条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// 相对同步根目录的路径，使用 / 分隔
    pub key: String,
    pub size: u64,
    pub last_modified: LastModified,
    pub storage_class: StorageClass,
    pub origin: Origin,
}
