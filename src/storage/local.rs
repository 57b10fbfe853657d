use super::{is_relative_key, FileInfo, Storage, TransferBody, WriteOptions};
use crate::core::entry::{LastModified, StorageClass};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub struct LocalStorage {
    base_path: PathBuf,
    follow_symlinks: bool,
    name: String,
}

impl LocalStorage {
    /// 根目录在首次写入时才创建，下载到不存在的目录是合法的
    pub fn new(base_path: PathBuf, follow_symlinks: bool) -> Self {
        let name = base_path.display().to_string();
        Self {
            base_path,
            follow_symlinks,
            name,
        }
    }

    /// 键必须留在根目录之内
    fn resolve_path(&self, path: &str) -> Result<PathBuf> {
        if !is_relative_key(path) {
            bail!("路径超出同步根目录: {}", path);
        }
        Ok(self.base_path.join(path))
    }

    /// 规范化路径分隔符（统一使用 /）
    fn normalize_path(path: &str) -> String {
        path.replace('\\', "/")
    }

    fn relative_key(base: &Path, path: &Path) -> String {
        let relative = path.strip_prefix(base).unwrap_or(path);
        Self::normalize_path(&relative.to_string_lossy())
    }

    /// 面向用户的跳过原因
    fn describe_error(err: &walkdir::Error) -> String {
        match err.io_error().map(io::Error::kind) {
            Some(io::ErrorKind::NotFound) => "File does not exist.".to_string(),
            Some(io::ErrorKind::PermissionDenied) => "File/Directory is not readable.".to_string(),
            _ => match err.loop_ancestor() {
                Some(ancestor) => format!("Symbolic link loop back to {}.", ancestor.display()),
                None => format!("{}.", err),
            },
        }
    }

    fn scan_entry(base: &Path, entry: &walkdir::DirEntry) -> FileInfo {
        let Some(relative) = entry
            .path()
            .strip_prefix(base)
            .ok()
            .and_then(|p| p.to_str())
        else {
            return FileInfo::unreadable(
                Self::relative_key(base, entry.path()),
                "File name is not valid UTF-8.".to_string(),
            );
        };
        let key = Self::normalize_path(relative);

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => return FileInfo::unreadable(key, Self::describe_error(&e)),
        };

        if !metadata.is_file() && !metadata.is_dir() {
            return FileInfo::unreadable(
                key,
                "File is character special device, block special device, FIFO, or socket."
                    .to_string(),
            );
        }

        let modified = metadata
            .modified()
            .map(LastModified::from_system_time)
            .unwrap_or_else(|e| LastModified::Invalid(e.to_string()));

        FileInfo {
            path: key,
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified,
            is_dir: metadata.is_dir(),
            storage_class: StorageClass::Standard,
            error: None,
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list_files(&self) -> Result<Vec<FileInfo>> {
        let base = self.base_path.clone();

        if !base.exists() {
            return Ok(Vec::new());
        }

        let follow_links = self.follow_symlinks;

        // 使用 spawn_blocking 避免阻塞 async runtime
        tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();

            for entry in WalkDir::new(&base).follow_links(follow_links) {
                let entry = match entry {
                    Ok(entry) => entry,
                    // 根目录本身无法遍历时整个列表失败
                    Err(err) if err.depth() == 0 => {
                        return Err(anyhow::Error::new(err)
                            .context(format!("无法遍历目录: {}", base.display())));
                    }
                    Err(err) => {
                        warn!("遍历目录出错: {}", err);
                        let key = match err.path() {
                            Some(path) => Self::relative_key(&base, path),
                            None => bail!("遍历目录出错: {}", err),
                        };
                        files.push(FileInfo::unreadable(key, Self::describe_error(&err)));
                        continue;
                    }
                };

                // 跳过根目录本身
                if entry.depth() == 0 {
                    continue;
                }

                if !follow_links && entry.path_is_symlink() {
                    debug!("不跟随符号链接: {}", entry.path().display());
                    continue;
                }

                let file = Self::scan_entry(&base, &entry);
                if let Some(ref reason) = file.error {
                    warn!("无法读取 {}: {}", entry.path().display(), reason);
                }
                files.push(file);
            }

            Ok(files)
        })
        .await?
    }

    async fn read(&self, path: &str) -> Result<TransferBody> {
        let full_path = self.resolve_path(path)?;
        let file = fs::File::open(&full_path)
            .await
            .with_context(|| format!("打开文件失败: {}", full_path.display()))?;
        let size = file.metadata().await?.len();
        Ok(TransferBody::new(file, size))
    }

    async fn write(&self, path: &str, mut body: TransferBody, options: &WriteOptions) -> Result<()> {
        let full_path = self.resolve_path(path)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // 使用临时文件写入，然后原子重命名
        let file_name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path =
            full_path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        // 失败时清理临时文件
        let guard = scopeguard::guard(temp_path.clone(), |p| {
            let _ = std::fs::remove_file(p);
        });

        let mut file = fs::File::create(&temp_path).await?;
        let written = tokio::io::copy(&mut body.reader, &mut file).await?;
        file.flush().await?;
        if written != body.size {
            bail!(
                "写入长度不一致: {} (预期 {} 字节, 实际 {} 字节)",
                full_path.display(),
                body.size,
                written
            );
        }

        if let Some(modified) = options.modified {
            let file = file.into_std().await;
            file.set_modified(SystemTime::from(modified))?;
            debug!("设置修改时间: {} -> {}", full_path.display(), modified);
        } else {
            drop(file);
        }

        fs::rename(&temp_path, &full_path).await?;
        scopeguard::ScopeGuard::into_inner(guard);

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path)?;

        if !full_path.exists() {
            return Ok(());
        }

        fs::remove_file(&full_path)
            .await
            .with_context(|| format!("删除文件失败: {}", full_path.display()))?;

        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn display_path(&self, path: &str) -> String {
        self.base_path.join(path).display().to_string()
    }
}
