//! 分页列举
//!
//! Walks a prefix page by page through the backend's cursor until the backend
//! reports no further pages. Within a page, object keys are visited before
//! common prefixes.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use super::client::ObjectBackend;
use crate::storage::{with_cancel, ObjStoreError, Visitor};

/// 每页最大条目数
pub const LIST_PAGE_SIZE: usize = 1000;
/// 目录分隔符
pub const DIR_DELIM: &str = "/";

/// 目录前缀补全分隔符："a" 与 "a/" 等价，空前缀表示根目录
pub fn normalize_prefix(dir: &str, delimiter: &str) -> String {
    if dir.is_empty() {
        return String::new();
    }
    let trimmed = dir.strip_suffix(delimiter).unwrap_or(dir);
    format!("{}{}", trimmed, delimiter)
}

/// List everything directly under `dir`, calling `visit` once per entry.
///
/// The first error returned by `visit` ends the walk and is handed back as is.
pub async fn iter_prefix(
    backend: &dyn ObjectBackend,
    cancel: &CancellationToken,
    dir: &str,
    delimiter: &str,
    visit: Visitor<'_>,
) -> Result<()> {
    let prefix = normalize_prefix(dir, delimiter);
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Err(ObjStoreError::Cancelled)
                .with_context(|| format!("list oss prefix {:?}", prefix));
        }

        let page = with_cancel(
            cancel,
            backend.list_page(&prefix, delimiter, cursor.as_deref(), LIST_PAGE_SIZE),
        )
        .await
        .with_context(|| format!("list oss prefix {:?}", prefix))?;
        pages += 1;

        for key in &page.keys {
            visit(key)?;
        }
        for common in &page.common_prefixes {
            visit(common)?;
        }

        if !page.is_truncated {
            break;
        }
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => {
                return Err(ObjStoreError::backend(
                    None,
                    "truncated listing without a continuation token",
                ))
                .with_context(|| format!("list oss prefix {:?}", prefix));
            }
        }
    }

    tracing::debug!("OSS列举完成: prefix={}, pages={}", prefix, pages);
    Ok(())
}
