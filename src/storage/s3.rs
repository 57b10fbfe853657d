use super::{
    FileInfo, Storage, TransferBody, WriteOptions, CONNECT_TIMEOUT_SECS, IO_TIMEOUT_SECS,
};
use crate::config::S3Config;
use crate::core::entry::{LastModified, StorageClass};
use crate::error::SyncError;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Object};
use aws_sdk_s3::Client;
use std::fmt;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// 单次分段上传最多的段数
const MAX_PARTS: u64 = 10_000;

/// s3://bucket/prefix/ 形式的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri {
    pub bucket: String,
    /// 为空，或以 / 结尾
    pub prefix: String,
}

impl S3Uri {
    /// 非空前缀一律视为目录
    pub fn parse(uri: &str) -> Result<Self, SyncError> {
        let rest = uri
            .strip_prefix("s3://")
            .ok_or_else(|| SyncError::InvalidUri(uri.to_string()))?;

        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(SyncError::InvalidUri(uri.to_string()));
        }

        let prefix = if prefix.is_empty() || prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{}/", prefix)
        };

        Ok(Self {
            bucket: bucket.to_string(),
            prefix,
        })
    }

    /// 相对键对应的完整对象键
    pub fn object_key(&self, path: &str) -> String {
        format!("{}{}", self.prefix, path)
    }
}

impl fmt::Display for S3Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.prefix)
    }
}

/// ListObjectsV2 返回的对象转换为列表项，根目录和目录占位对象返回 None
pub fn object_to_file_info(object: &Object, prefix: &str) -> Option<FileInfo> {
    let key = object.key()?;
    let path = key.strip_prefix(prefix).unwrap_or(key);
    if path.is_empty() || path.ends_with('/') {
        return None;
    }

    let modified = match object.last_modified() {
        Some(t) => LastModified::from_unix(t.secs(), t.subsec_nanos()),
        None => LastModified::Invalid("missing".to_string()),
    };

    Some(FileInfo {
        path: path.to_string(),
        size: object.size().unwrap_or(0).max(0) as u64,
        modified,
        is_dir: false,
        storage_class: object
            .storage_class()
            .map(|c| StorageClass::parse(c.as_str()))
            .unwrap_or_default(),
        error: None,
    })
}

/// 分段大小：不少于配置值，且段数不超过上限
fn part_size(total: u64, chunksize: u64) -> u64 {
    chunksize.max(total.div_ceil(MAX_PARTS))
}

fn storage_class(options: &WriteOptions) -> Option<aws_sdk_s3::types::StorageClass> {
    options
        .storage_class
        .as_deref()
        .map(aws_sdk_s3::types::StorageClass::from)
}

pub struct S3Storage {
    client: Client,
    uri: S3Uri,
    name: String,
    multipart_threshold: u64,
    multipart_chunksize: u64,
}

impl S3Storage {
    pub async fn new(uri: S3Uri, config: &S3Config) -> Result<Self> {
        let timeouts = TimeoutConfig::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .operation_timeout(Duration::from_secs(IO_TIMEOUT_SECS))
            .build();

        // 凭证由 SDK 默认链解析（环境变量、配置文件、实例角色）
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).timeout_config(timeouts);
        if let Some(ref region) = config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(ref endpoint) = config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style || config.endpoint_url.is_some())
            .build();

        let name = uri.to_string();
        Ok(Self {
            client: Client::from_conf(s3_config),
            uri,
            name,
            multipart_threshold: config.multipart_threshold,
            multipart_chunksize: config.multipart_chunksize,
        })
    }

    /// 大文件分段上传，失败时中止上传以释放已上传的段
    async fn write_multipart(
        &self,
        key: &str,
        mut body: TransferBody,
        options: &WriteOptions,
    ) -> Result<()> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.uri.bucket)
            .key(key)
            .set_storage_class(storage_class(options))
            .set_website_redirect_location(options.website_redirect.clone())
            .send()
            .await
            .map_err(|e| anyhow!("{}", DisplayErrorContext(e)))?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| anyhow!("CreateMultipartUpload 未返回 UploadId: {}", key))?
            .to_string();
        debug!("分段上传: {} ({}字节, upload_id={})", key, body.size, upload_id);

        let result = self.upload_parts(key, &upload_id, &mut body).await;
        if result.is_err() {
            if let Err(e) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.uri.bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!("中止分段上传失败: {}: {}", key, DisplayErrorContext(e));
            }
        }
        result
    }

    async fn upload_parts(&self, key: &str, upload_id: &str, body: &mut TransferBody) -> Result<()> {
        let chunk_size = part_size(body.size, self.multipart_chunksize);
        let mut parts = Vec::new();
        let mut uploaded = 0u64;

        loop {
            // 每次只在内存中保留一段
            let mut chunk = Vec::with_capacity(chunk_size.min(body.size) as usize);
            (&mut body.reader)
                .take(chunk_size)
                .read_to_end(&mut chunk)
                .await?;
            if chunk.is_empty() {
                break;
            }

            let part_number = i32::try_from(parts.len() + 1)?;
            uploaded += chunk.len() as u64;

            let response = self
                .client
                .upload_part()
                .bucket(&self.uri.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| anyhow!("{}", DisplayErrorContext(e)))?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(response.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
        }

        if uploaded != body.size {
            bail!("上传长度不一致: {} (预期 {} 字节, 实际 {} 字节)", key, body.size, uploaded);
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.uri.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| anyhow!("{}", DisplayErrorContext(e)))?;
        Ok(())
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn list_files(&self) -> Result<Vec<FileInfo>> {
        let mut files = Vec::new();

        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(&self.uri.bucket)
            .prefix(&self.uri.prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| anyhow!("{}", DisplayErrorContext(e)))?;

            files.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object_to_file_info(object, &self.uri.prefix)),
            );
        }

        debug!("{} 列出 {} 个对象", self.name, files.len());
        Ok(files)
    }

    async fn read(&self, path: &str) -> Result<TransferBody> {
        let response = self
            .client
            .get_object()
            .bucket(&self.uri.bucket)
            .key(self.uri.object_key(path))
            .send()
            .await
            .map_err(|e| anyhow!("{}", DisplayErrorContext(e)))?;

        let size = response
            .content_length()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| anyhow!("GetObject 响应缺少 Content-Length: {}", path))?;

        Ok(TransferBody::new(response.body.into_async_read(), size))
    }

    async fn write(&self, path: &str, mut body: TransferBody, options: &WriteOptions) -> Result<()> {
        let key = self.uri.object_key(path);
        if body.size > self.multipart_threshold {
            return self.write_multipart(&key, body, options).await;
        }

        let mut data = Vec::with_capacity(body.size as usize);
        body.reader.read_to_end(&mut data).await?;

        self.client
            .put_object()
            .bucket(&self.uri.bucket)
            .key(key)
            .set_storage_class(storage_class(options))
            .set_website_redirect_location(options.website_redirect.clone())
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| anyhow!("{}", DisplayErrorContext(e)))?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        // S3 删除不存在的对象不会报错
        self.client
            .delete_object()
            .bucket(&self.uri.bucket)
            .key(self.uri.object_key(path))
            .send()
            .await
            .map_err(|e| anyhow!("{}", DisplayErrorContext(e)))?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn display_path(&self, path: &str) -> String {
        format!("s3://{}/{}", self.uri.bucket, self.uri.object_key(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri() {
        let uri = S3Uri::parse("s3://bucket/").unwrap();
        assert_eq!(uri.bucket, "bucket");
        assert_eq!(uri.prefix, "");

        let uri = S3Uri::parse("s3://mybucket").unwrap();
        assert_eq!(uri.bucket, "mybucket");
        assert_eq!(uri.prefix, "");

        // 同步目标总是目录
        let uri = S3Uri::parse("s3://bucket/key.txt").unwrap();
        assert_eq!(uri.prefix, "key.txt/");
        assert_eq!(uri.object_key("foo.txt"), "key.txt/foo.txt");
        assert_eq!(uri.to_string(), "s3://bucket/key.txt/");
    }

    #[test]
    fn test_parse_uri_rejects_garbage() {
        assert!(S3Uri::parse("s3:///prefix").is_err());
        assert!(S3Uri::parse("http://bucket/").is_err());
    }

    fn object(key: &str) -> aws_sdk_s3::types::builders::ObjectBuilder {
        Object::builder()
            .key(key)
            .size(10)
            .last_modified(aws_sdk_s3::primitives::DateTime::from_secs(1_389_300_349))
    }

    #[test]
    fn test_object_strips_prefix() {
        let info = object_to_file_info(&object("photos/2014/a.jpg").build(), "photos/").unwrap();
        assert_eq!(info.path, "2014/a.jpg");
        assert_eq!(info.size, 10);
        assert_eq!(
            info.modified.as_datetime().map(|t| t.timestamp()),
            Some(1_389_300_349)
        );
        assert_eq!(info.storage_class, StorageClass::Standard);
        assert_eq!(info.error, None);
    }

    #[test]
    fn test_directory_markers_skipped() {
        assert!(object_to_file_info(&object("photos/").build(), "photos/").is_none());
        assert!(object_to_file_info(&object("photos/2014/").build(), "photos/").is_none());
        assert!(object_to_file_info(&Object::builder().build(), "").is_none());
    }

    #[test]
    fn test_object_storage_class() {
        use aws_sdk_s3::types::ObjectStorageClass;

        let glacier = object("a")
            .storage_class(ObjectStorageClass::Glacier)
            .build();
        assert_eq!(
            object_to_file_info(&glacier, "").unwrap().storage_class,
            StorageClass::Glacier
        );

        let deep = object("b")
            .storage_class(ObjectStorageClass::DeepArchive)
            .build();
        assert!(object_to_file_info(&deep, "")
            .unwrap()
            .storage_class
            .is_restricted());
    }

    #[test]
    fn test_missing_last_modified_is_invalid() {
        let info = object_to_file_info(&Object::builder().key("a").build(), "").unwrap();
        assert_eq!(info.modified, LastModified::Invalid("missing".to_string()));
        assert_eq!(info.size, 0);
    }

    #[test]
    fn test_part_size() {
        let mib = 1024 * 1024;
        assert_eq!(part_size(100 * mib, 8 * mib), 8 * mib);
        // 段数不超过上限
        let huge = 200 * 1024 * mib;
        let size = part_size(huge, 8 * mib);
        assert!(size > 8 * mib);
        assert!(huge.div_ceil(size) <= MAX_PARTS);
    }
}
