//! OSS存储桶工厂

use anyhow::{Context, Result};

use super::driver::BucketHandle;
use crate::storage::{BucketFactory, ConfigItem, ObjectBucket};

/// OSS存储桶工厂
pub struct OssBucketFactory;

impl BucketFactory for OssBucketFactory {
    fn bucket_type(&self) -> &'static str {
        "oss"
    }

    fn config_items(&self) -> Vec<ConfigItem> {
        vec![
            ConfigItem::new("bucket", "string")
                .title("存储桶名称")
                .required(),
            ConfigItem::new("endpoint", "string")
                .title("端点地址")
                .help("OSS端点（如 oss-cn-hangzhou.aliyuncs.com），未带协议时使用https")
                .required(),
            ConfigItem::new("access_id", "string")
                .title("Access Key ID")
                .required(),
            ConfigItem::new("access_key", "password")
                .title("Access Key Secret")
                .required(),
            ConfigItem::new("region", "string")
                .title("区域")
                .help("签名使用的区域")
                .default("us-east-1"),
            ConfigItem::new("session_token", "password")
                .title("Session Token")
                .help("临时凭证的会话令牌（可选）"),
            ConfigItem::new("force_path_style", "bool")
                .title("强制路径风格")
                .help("MinIO等需要开启此选项")
                .default("false"),
            ConfigItem::new("part_size", "number")
                .title("单次上传上限")
                .help("不超过该大小（字节）的对象用一次PUT上传，更大的对象走流式上传（分片大小固定8 MiB）")
                .default("8388608"),
            ConfigItem::new("chunk_size", "number")
                .title("读取块大小")
                .help("上传时每次从源读取的字节数")
                .default("8388608"),
            ConfigItem::new("staging_dir", "string")
                .title("暂存目录")
                .help("上传暂存文件目录，默认系统临时目录"),
        ]
    }

    fn create_bucket(&self, conf: &[u8]) -> Result<Box<dyn ObjectBucket>> {
        let handle = BucketHandle::from_bytes(conf).context("create oss bucket")?;
        Ok(Box::new(handle))
    }
}
