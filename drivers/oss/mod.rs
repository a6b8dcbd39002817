//! OSS / S3兼容对象存储驱动

pub mod client;
pub mod config;
pub mod driver;
pub mod factory;
pub mod list;
pub mod memory;
pub mod writer;

pub use client::{ListPage, ObjectBackend, S3Backend};
pub use config::S3Config;
pub use driver::BucketHandle;
pub use factory::OssBucketFactory;
pub use memory::{MemoryBackend, MemoryOp};
pub use writer::UploadOptions;
