use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

pub mod error;
pub mod range;

pub use error::{is_not_found, ObjStoreError};
pub use range::{ByteRange, TO_END};

/// Reader over an object's (possibly ranged) content / 对象内容读取器
pub type ObjectReader = Box<dyn AsyncRead + Unpin + Send>;

/// Per-entry callback used by `iter` / 列举回调
///
/// Returning an error stops the listing; `iter` hands that same error back.
pub type Visitor<'a> = &'a mut (dyn FnMut(&str) -> Result<()> + Send);

/// Configuration item definition / 配置项定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigItem {
    pub name: String,
    /// Display title (friendly name) / 显示标题
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl ConfigItem {
    pub fn new(name: &str, item_type: &str) -> Self {
        Self {
            name: name.to_string(),
            title: None,
            item_type: item_type.to_string(),
            default: None,
            required: false,
            help: None,
        }
    }

    pub fn title(mut self, val: &str) -> Self {
        self.title = Some(val.to_string());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default(mut self, val: &str) -> Self {
        self.default = Some(val.to_string());
        self
    }

    pub fn help(mut self, val: &str) -> Self {
        self.help = Some(val.to_string());
        self
    }
}

/// Bucket capability interface (primitive operations only) / 存储桶能力接口
///
/// Every operation takes a cancellation token; cancelling it aborts the
/// in-flight backend request with [`ObjStoreError::Cancelled`].
#[async_trait]
pub trait ObjectBucket: Send + Sync {
    /// Bound bucket name / 存储桶名称
    fn name(&self) -> &str;

    /// Upload the reader's content as object `name` / 上传对象
    async fn upload(
        &self,
        cancel: &CancellationToken,
        name: &str,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<()>;

    /// Delete object `name` / 删除对象
    async fn delete(&self, cancel: &CancellationToken, name: &str) -> Result<()>;

    /// Visit every entry directly under `dir` (not recursive) / 列出目录
    ///
    /// Entries are full names including the directory prefix; concrete keys
    /// come before sub-directory prefixes within each page.
    async fn iter(&self, cancel: &CancellationToken, dir: &str, f: Visitor<'_>) -> Result<()>;

    /// Read the whole object / 读取整个对象
    async fn get(&self, cancel: &CancellationToken, name: &str) -> Result<ObjectReader>;

    /// Read `length` bytes from `offset`, `length == -1` meaning to the end / 范围读取
    async fn get_range(
        &self,
        cancel: &CancellationToken,
        name: &str,
        offset: i64,
        length: i64,
    ) -> Result<ObjectReader>;

    /// Check whether object `name` exists / 判断对象是否存在
    async fn exists(&self, cancel: &CancellationToken, name: &str) -> Result<bool>;

    /// Whether `err` means the object does not exist / 是否为"对象不存在"错误
    fn is_obj_not_found_err(&self, err: &anyhow::Error) -> bool {
        is_not_found(err)
    }

    /// Release the handle / 关闭
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Bucket factory trait / 存储桶工厂 trait
pub trait BucketFactory: Send + Sync {
    /// Backend type name / 类型名称
    fn bucket_type(&self) -> &'static str;

    /// Configuration keys the factory understands / 配置项
    fn config_items(&self) -> Vec<ConfigItem>;

    /// Build a bucket handle from a raw configuration payload / 创建存储桶实例
    fn create_bucket(&self, conf: &[u8]) -> Result<Box<dyn ObjectBucket>>;
}

/// Run `fut` unless `cancel` fires first.
pub async fn with_cancel<F, T>(cancel: &CancellationToken, fut: F) -> Result<T, ObjStoreError>
where
    F: Future<Output = Result<T, ObjStoreError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ObjStoreError::Cancelled),
        res = fut => res,
    }
}
