//! 后端客户端
//!
//! [`ObjectBackend`] is the narrow set of primitives the bucket handle is
//! written against. [`S3Backend`] speaks the S3 protocol through `rust-s3`,
//! which OSS and other S3-compatible services accept.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::Region;

use super::config::S3Config;
use crate::storage::{ByteRange, ObjStoreError};

/// One page of a delimiter listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Concrete object keys, in backend order.
    pub keys: Vec<String>,
    /// Common prefixes ("sub-directories"), each ending with the delimiter.
    pub common_prefixes: Vec<String>,
    /// Opaque resume token for the next page.
    pub next_cursor: Option<String>,
    /// More pages follow.
    pub is_truncated: bool,
}

/// Backend primitives / 后端原语
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Fetch one page of keys under `prefix`, resuming at `cursor`.
    async fn list_page(
        &self,
        prefix: &str,
        delimiter: &str,
        cursor: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, ObjStoreError>;

    async fn get_object(&self, key: &str, range: ByteRange) -> Result<Bytes, ObjStoreError>;

    /// Upload the file at `path`; files up to `part_size` bytes go in one PUT.
    async fn upload_file(&self, key: &str, path: &Path, part_size: u64) -> Result<(), ObjStoreError>;

    /// Delete `key`. Like S3, deleting an absent key succeeds.
    async fn delete_object(&self, key: &str) -> Result<(), ObjStoreError>;

    async fn head_object(&self, key: &str) -> Result<bool, ObjStoreError>;

    /// Backend-declared large-object threshold.
    fn part_size(&self) -> u64;
}

impl From<S3Error> for ObjStoreError {
    fn from(err: S3Error) -> Self {
        match err {
            S3Error::HttpFailWithBody(status, body) => ObjStoreError::backend(Some(status), body),
            other => ObjStoreError::backend(None, other.to_string()),
        }
    }
}

/// 非2xx响应转为错误（rust-s3未开启fail-on-err时不会自行报错）
fn check_status(status: u16, body: &[u8]) -> Result<(), ObjStoreError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(ObjStoreError::backend(
            Some(status),
            String::from_utf8_lossy(body).into_owned(),
        ))
    }
}

/// rust-s3 decodes the listing XML before it hands back the status, so an
/// S3 error document on ListObjectsV2 arrives as a decode failure with no
/// status and no body. Only `HttpFailWithBody` keeps the real status.
fn list_error(err: S3Error) -> ObjStoreError {
    match err {
        S3Error::HttpFailWithBody(status, body) => ObjStoreError::backend(Some(status), body),
        other => ObjStoreError::backend(
            None,
            format!("list response not readable as a listing (likely an error document): {}", other),
        ),
    }
}

/// S3协议后端
pub struct S3Backend {
    bucket: Box<Bucket>,
    part_size: u64,
}

impl S3Backend {
    /// 创建S3 Bucket客户端并绑定存储桶
    pub fn connect(config: &S3Config) -> Result<Self, ObjStoreError> {
        let credentials = Credentials::new(
            Some(&config.access_id),
            Some(&config.access_key),
            if config.session_token.is_empty() { None } else { Some(&config.session_token) },
            None,
            None,
        )
        .map_err(|e| ObjStoreError::Connection(format!("initialize oss client: {}", e)))?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint_url(),
        };

        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| ObjStoreError::Connection(format!("new bucket {}: {}", config.bucket, e)))?;

        let bucket = if config.force_path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(Self {
            bucket,
            part_size: config.part_size,
        })
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    async fn list_page(
        &self,
        prefix: &str,
        delimiter: &str,
        cursor: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, ObjStoreError> {
        tracing::debug!("OSS ListObjectsV2: prefix={}, cursor={:?}", prefix, cursor);

        let delimiter = if delimiter.is_empty() { None } else { Some(delimiter.to_string()) };
        let (result, status) = self
            .bucket
            .list_page(
                prefix.to_string(),
                delimiter,
                cursor.map(str::to_string),
                None,
                Some(max_keys),
            )
            .await
            .map_err(list_error)?;
        check_status(status, &[])?;

        Ok(ListPage {
            keys: result.contents.into_iter().map(|obj| obj.key).collect(),
            common_prefixes: result
                .common_prefixes
                .unwrap_or_default()
                .into_iter()
                .map(|cp| cp.prefix)
                .collect(),
            next_cursor: result.next_continuation_token,
            is_truncated: result.is_truncated,
        })
    }

    async fn get_object(&self, key: &str, range: ByteRange) -> Result<Bytes, ObjStoreError> {
        tracing::debug!("OSS GetObject: key={}, range={:?}", key, range.header_value());

        let response = match range {
            ByteRange::Full => self.bucket.get_object(key).await?,
            ByteRange::From(start) => self.bucket.get_object_range(key, start, None).await?,
            ByteRange::Inclusive { start, end } => {
                self.bucket.get_object_range(key, start, Some(end)).await?
            }
        };
        let data = response.bytes().to_vec();
        check_status(response.status_code(), &data)?;
        Ok(Bytes::from(data))
    }

    async fn upload_file(&self, key: &str, path: &Path, part_size: u64) -> Result<(), ObjStoreError> {
        let size = tokio::fs::metadata(path).await?.len();

        if size <= part_size {
            tracing::debug!("OSS PutObject: key={}, size={}", key, size);
            let data = tokio::fs::read(path).await?;
            let response = self.bucket.put_object(key, &data).await?;
            return check_status(response.status_code(), response.bytes());
        }

        // rust-s3按自身固定的8 MiB分片，小于该值时仍是一次PUT
        tracing::debug!("OSS流式上传: key={}, size={}", key, size);
        let mut file = tokio::fs::File::open(path).await?;
        let response = self.bucket.put_object_stream(&mut file, key).await?;
        check_status(response.status_code(), &[])
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjStoreError> {
        tracing::debug!("OSS DeleteObject: key={}", key);
        let response = self.bucket.delete_object(key).await?;
        check_status(response.status_code(), response.bytes())
    }

    async fn head_object(&self, key: &str) -> Result<bool, ObjStoreError> {
        match self.bucket.head_object(key).await {
            Ok((_, 404)) => Ok(false),
            Ok((_, status)) => check_status(status, &[]).map(|_| true),
            Err(err) => {
                let err = ObjStoreError::from(err);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    fn part_size(&self) -> u64 {
        self.part_size
    }
}
