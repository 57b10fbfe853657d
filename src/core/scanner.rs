use crate::core::entry::{FileEntry, LastModified, Origin, StorageClass};
use crate::core::filter::PathFilter;
use crate::storage::Storage;
use anyhow::Result;
use tracing::{info, warn};

/// 列表中无法读取的条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableEntry {
    pub key: String,
    pub reason: String,
    pub origin: Origin,
}

impl UnreadableEntry {
    /// 键本身，或目录下的任意键
    pub fn covers(&self, key: &str) -> bool {
        key.strip_prefix(self.key.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }

    /// 计划中使用的占位条目
    pub fn to_file_entry(&self) -> FileEntry {
        FileEntry {
            key: self.key.clone(),
            size: 0,
            last_modified: LastModified::Invalid(String::new()),
            storage_class: StorageClass::Standard,
            origin: self.origin,
        }
    }
}

/// 按键排序的列表结果，可重复遍历
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    entries: Vec<FileEntry>,
    unreadable: Vec<UnreadableEntry>,
}

impl Listing {
    /// 按键排序并去重（同一个键只保留第一条）
    pub fn new(mut entries: Vec<FileEntry>) -> Self {
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        let before = entries.len();
        entries.dedup_by(|later, earlier| later.key == earlier.key);
        if entries.len() != before {
            warn!("列表中存在重复的键，已忽略 {} 项", before - entries.len());
        }
        Self {
            entries,
            unreadable: Vec::new(),
        }
    }

    pub fn with_unreadable(mut self, mut unreadable: Vec<UnreadableEntry>) -> Self {
        unreadable.sort_by(|a, b| a.key.cmp(&b.key));
        self.unreadable = unreadable;
        self
    }

    pub fn unreadable(&self) -> &[UnreadableEntry] {
        &self.unreadable
    }

    pub fn into_parts(self) -> (Vec<FileEntry>, Vec<UnreadableEntry>) {
        (self.entries, self.unreadable)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FileEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for Listing {
    type Item = FileEntry;
    type IntoIter = std::vec::IntoIter<FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// 文件扫描器
pub struct FileScanner {
    filter: PathFilter,
}

impl FileScanner {
    pub fn new(filter: PathFilter) -> Self {
        Self { filter }
    }

    /// 扫描存储并返回排序后的列表
    pub async fn scan(&self, storage: &dyn Storage, origin: Origin) -> Result<Listing> {
        info!("开始扫描存储: {}", storage.name());

        let files = storage.list_files().await?;
        let total = files.len();

        let mut excluded_count = 0;
        let mut dir_count = 0;
        let mut entries = Vec::with_capacity(total);
        let mut unreadable = Vec::new();

        for file in files {
            // 目录在写入文件时自动创建
            if file.is_dir {
                dir_count += 1;
                continue;
            }

            if !self.filter.is_included(&file.path) {
                excluded_count += 1;
                continue;
            }

            if let Some(reason) = file.error {
                unreadable.push(UnreadableEntry {
                    key: file.path,
                    reason,
                    origin,
                });
                continue;
            }

            entries.push(FileEntry {
                key: file.path,
                size: file.size,
                last_modified: file.modified,
                storage_class: file.storage_class,
                origin,
            });
        }

        let listing = Listing::new(entries).with_unreadable(unreadable);
        info!(
            "扫描完成: {} 个文件, {} 个目录, {} 个被排除, {} 个无法读取",
            listing.len(),
            dir_count,
            excluded_count,
            listing.unreadable().len()
        );

        Ok(listing)
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new(PathFilter::default())
    }
}
