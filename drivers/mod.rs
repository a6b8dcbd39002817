// Driver package / 驱动包
pub mod oss;

use crate::storage::BucketFactory;

/// All bucket factories shipped with the crate / 所有存储桶工厂
pub fn factories() -> Vec<Box<dyn BucketFactory>> {
    vec![Box::new(oss::OssBucketFactory)]
}
