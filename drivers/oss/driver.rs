//! OSS存储桶实现

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use super::client::{ObjectBackend, S3Backend};
use super::config::S3Config;
use super::list::{iter_prefix, DIR_DELIM};
use super::writer::{upload_staged, UploadOptions};
use crate::storage::{
    with_cancel, ByteRange, ObjStoreError, ObjectBucket, ObjectReader, Visitor, TO_END,
};

/// A bucket bound to one backend.
///
/// Holds nothing mutable, so one handle may serve concurrent calls.
pub struct BucketHandle {
    name: String,
    backend: Arc<dyn ObjectBackend>,
    upload: UploadOptions,
}

impl BucketHandle {
    /// 校验配置并连接
    pub fn open(config: S3Config) -> Result<Self, ObjStoreError> {
        config.validate()?;
        let backend = S3Backend::connect(&config)?;
        tracing::info!(
            "OSS存储桶已打开: bucket={}, endpoint={}",
            config.bucket,
            config.endpoint_url()
        );
        Ok(Self::with_backend(
            config.bucket.clone(),
            Arc::new(backend),
            UploadOptions::from(&config),
        ))
    }

    /// 从原始配置创建
    pub fn from_bytes(conf: &[u8]) -> Result<Self, ObjStoreError> {
        Self::open(S3Config::parse(conf)?)
    }

    pub fn with_backend(
        name: impl Into<String>,
        backend: Arc<dyn ObjectBackend>,
        upload: UploadOptions,
    ) -> Self {
        Self {
            name: name.into(),
            backend,
            upload,
        }
    }

    /// 连通性检查：列举根目录一条记录
    pub async fn ping(&self, cancel: &CancellationToken) -> Result<(), ObjStoreError> {
        match with_cancel(cancel, self.backend.list_page("", DIR_DELIM, None, 1)).await {
            Ok(_) => Ok(()),
            Err(ObjStoreError::Cancelled) => Err(ObjStoreError::Cancelled),
            Err(e) => Err(ObjStoreError::Connection(format!("bucket {}: {}", self.name, e))),
        }
    }

    async fn read_range(
        &self,
        cancel: &CancellationToken,
        name: &str,
        offset: i64,
        length: i64,
    ) -> Result<ObjectReader> {
        check_name(name)?;
        let range = ByteRange::translate(offset, length)
            .with_context(|| format!("get oss object {}", name))?;
        // 整个响应体读入内存后再返回，大对象请按范围分段读取
        let data = with_cancel(cancel, self.backend.get_object(name, range))
            .await
            .with_context(|| format!("get oss object {}", name))?;
        Ok(Box::new(Cursor::new(data)))
    }
}

fn check_name(name: &str) -> Result<(), ObjStoreError> {
    if name.is_empty() {
        return Err(ObjStoreError::InvalidArgument("object name must not be empty".to_string()));
    }
    Ok(())
}

#[async_trait]
impl ObjectBucket for BucketHandle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(
        &self,
        cancel: &CancellationToken,
        name: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<()> {
        check_name(name)?;
        upload_staged(self.backend.as_ref(), cancel, name, reader, &self.upload).await
    }

    async fn delete(&self, cancel: &CancellationToken, name: &str) -> Result<()> {
        check_name(name)?;
        // S3删除不存在的对象也返回204，先HEAD确认
        let found = with_cancel(cancel, self.backend.head_object(name))
            .await
            .with_context(|| format!("delete oss object {}", name))?;
        if !found {
            return Err(ObjStoreError::NotFound(name.to_string()))
                .with_context(|| format!("delete oss object {}", name));
        }
        with_cancel(cancel, self.backend.delete_object(name))
            .await
            .with_context(|| format!("delete oss object {}", name))
    }

    async fn iter(&self, cancel: &CancellationToken, dir: &str, f: Visitor<'_>) -> Result<()> {
        iter_prefix(self.backend.as_ref(), cancel, dir, DIR_DELIM, f).await
    }

    async fn get(&self, cancel: &CancellationToken, name: &str) -> Result<ObjectReader> {
        self.read_range(cancel, name, 0, TO_END).await
    }

    async fn get_range(
        &self,
        cancel: &CancellationToken,
        name: &str,
        offset: i64,
        length: i64,
    ) -> Result<ObjectReader> {
        self.read_range(cancel, name, offset, length).await
    }

    async fn exists(&self, cancel: &CancellationToken, name: &str) -> Result<bool> {
        check_name(name)?;
        with_cancel(cancel, self.backend.head_object(name))
            .await
            .with_context(|| format!("check oss object {}", name))
    }

    async fn close(&self) -> Result<()> {
        tracing::debug!("OSS存储桶关闭: bucket={}", self.name);
        Ok(())
    }
}
