pub mod storage;

// Driver modules (point to project root drivers via path attribute) / 驱动模块
#[path = "../drivers/mod.rs"]
pub mod drivers;

pub use drivers::oss::{BucketHandle, OssBucketFactory, S3Config};
pub use storage::{is_not_found, BucketFactory, ObjStoreError, ObjectBucket};
