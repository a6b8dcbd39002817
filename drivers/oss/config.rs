//! OSS驱动配置

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::storage::ObjStoreError;

/// 默认单次PUT上限：超过后交给rust-s3流式上传（分片大小由rust-s3固定为8 MiB）
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;
/// 默认读取块大小
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// OSS配置
///
/// The four connection fields default to empty so that a payload missing any
/// of them still decodes and [`S3Config::validate`] can name what is absent.
#[derive(Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// 存储桶名称
    #[serde(default)]
    pub bucket: String,
    /// 端点地址
    /// 阿里云OSS: https://oss-{region}.aliyuncs.com
    /// MinIO: http://localhost:9000
    #[serde(default)]
    pub endpoint: String,
    /// Access Key ID
    #[serde(default)]
    pub access_id: String,
    /// Access Key Secret
    #[serde(default)]
    pub access_key: String,
    /// 区域
    #[serde(default = "default_region")]
    pub region: String,
    /// Session Token（用于临时凭证）
    #[serde(default)]
    pub session_token: String,
    /// 强制使用路径风格（而非虚拟主机风格）
    #[serde(default)]
    pub force_path_style: bool,
    /// 单次PUT上传的最大对象大小（字节）
    #[serde(default = "default_part_size")]
    pub part_size: u64,
    /// 上传时每次读取的块大小（字节）
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// 上传暂存目录，默认系统临时目录
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_part_size() -> u64 {
    DEFAULT_PART_SIZE
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            endpoint: String::new(),
            access_id: String::new(),
            access_key: String::new(),
            region: default_region(),
            session_token: String::new(),
            force_path_style: false,
            part_size: default_part_size(),
            chunk_size: default_chunk_size(),
            staging_dir: None,
        }
    }
}

// access_key and session_token must never reach a log line
impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("access_id", &self.access_id)
            .field("access_key", &"<redacted>")
            .field("region", &self.region)
            .field("session_token", &if self.session_token.is_empty() { "" } else { "<redacted>" })
            .field("force_path_style", &self.force_path_style)
            .field("part_size", &self.part_size)
            .field("chunk_size", &self.chunk_size)
            .field("staging_dir", &self.staging_dir)
            .finish()
    }
}

impl S3Config {
    /// 解析配置
    pub fn parse(conf: &[u8]) -> Result<Self, ObjStoreError> {
        serde_json::from_slice(conf)
            .map_err(|e| ObjStoreError::Config(format!("parsing oss configuration: {}", e)))
    }

    /// 从环境变量读取（OSS_BUCKET / OSS_ENDPOINT / OSS_ACCESSID / OSS_ACCESSKEY）
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).unwrap_or_default();
        Self {
            bucket: var("OSS_BUCKET"),
            endpoint: var("OSS_ENDPOINT"),
            access_id: var("OSS_ACCESSID"),
            access_key: var("OSS_ACCESSKEY"),
            ..Self::default()
        }
    }

    /// 校验必填项，列出所有缺失字段
    pub fn validate(&self) -> Result<(), ObjStoreError> {
        let missing: Vec<&'static str> = [
            ("bucket", &self.bucket),
            ("endpoint", &self.endpoint),
            ("access_id", &self.access_id),
            ("access_key", &self.access_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(ObjStoreError::MissingConfig(missing));
        }
        if self.part_size == 0 {
            return Err(ObjStoreError::Config("part_size must be greater than 0".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(ObjStoreError::Config("chunk_size must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// 端点补全协议头
    pub fn endpoint_url(&self) -> String {
        let endpoint = self.endpoint.trim().trim_end_matches('/');
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("https://{}", endpoint)
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
