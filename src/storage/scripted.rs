//! 脚本化存储：按调用顺序返回预设响应，并记录每次调用

use super::{FileInfo, Storage, TransferBody, WriteOptions};
use crate::core::entry::{LastModified, StorageClass};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Mutex;
use tokio::io::AsyncReadExt;

/// 预设响应
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Listing(Vec<FileInfo>),
    Put,
    Get(Bytes),
    Delete,
    Failure(String),
}

/// 记录的调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: &'static str,
    pub path: Option<String>,
    pub data: Option<Bytes>,
    pub options: Option<WriteOptions>,
}

pub struct ScriptedStorage {
    name: String,
    responses: Mutex<VecDeque<ScriptedResponse>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedStorage {
    pub fn new(name: &str, responses: Vec<ScriptedResponse>) -> Self {
        Self {
            name: name.to_string(),
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 构造列表项
    pub fn object(path: &str, size: u64, modified: &str, storage_class: &str) -> FileInfo {
        FileInfo {
            path: path.to_string(),
            size,
            modified: LastModified::parse_rfc3339(modified),
            is_dir: false,
            storage_class: StorageClass::parse(storage_class),
            error: None,
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.calls().iter().map(|c| c.operation).collect()
    }

    fn next_response(&self, call: Call) -> Result<ScriptedResponse> {
        let operation = call.operation;
        self.calls.lock().unwrap().push(call);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("没有为 {} 预设响应", operation))
    }
}

#[async_trait]
impl Storage for ScriptedStorage {
    async fn list_files(&self) -> Result<Vec<FileInfo>> {
        let call = Call {
            operation: "ListObjectsV2",
            path: None,
            data: None,
            options: None,
        };
        match self.next_response(call)? {
            ScriptedResponse::Listing(files) => Ok(files),
            ScriptedResponse::Failure(message) => bail!(message),
            other => bail!("ListObjectsV2 收到不匹配的响应: {:?}", other),
        }
    }

    async fn read(&self, path: &str) -> Result<TransferBody> {
        let call = Call {
            operation: "GetObject",
            path: Some(path.to_string()),
            data: None,
            options: None,
        };
        match self.next_response(call)? {
            ScriptedResponse::Get(data) => {
                let size = data.len() as u64;
                Ok(TransferBody::new(Cursor::new(data), size))
            }
            ScriptedResponse::Failure(message) => bail!(message),
            other => bail!("GetObject 收到不匹配的响应: {:?}", other),
        }
    }

    async fn write(&self, path: &str, mut body: TransferBody, options: &WriteOptions) -> Result<()> {
        let mut data = Vec::new();
        body.reader.read_to_end(&mut data).await?;
        let call = Call {
            operation: "PutObject",
            path: Some(path.to_string()),
            data: Some(Bytes::from(data)),
            options: Some(options.clone()),
        };
        match self.next_response(call)? {
            ScriptedResponse::Put => Ok(()),
            ScriptedResponse::Failure(message) => bail!(message),
            other => bail!("PutObject 收到不匹配的响应: {:?}", other),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let call = Call {
            operation: "DeleteObject",
            path: Some(path.to_string()),
            data: None,
            options: None,
        };
        match self.next_response(call)? {
            ScriptedResponse::Delete => Ok(()),
            ScriptedResponse::Failure(message) => bail!(message),
            other => bail!("DeleteObject 收到不匹配的响应: {:?}", other),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
