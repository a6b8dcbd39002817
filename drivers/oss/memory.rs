//! 内存后端
//!
//! Keeps objects in a sorted map and answers listings the way S3's
//! `ListObjectsV2` does: keys and common prefixes share the page budget, a
//! common prefix is reported once, and pages resume from an opaque token.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::client::{ListPage, ObjectBackend};
use super::config::DEFAULT_PART_SIZE;
use crate::storage::{ByteRange, ObjStoreError};

/// Operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    List,
    Get,
    Upload,
    Delete,
    Head,
}

enum Entry {
    Key(String),
    Prefix(String),
}

impl Entry {
    fn cursor(&self) -> String {
        match self {
            Entry::Key(k) => format!("k:{}", k),
            Entry::Prefix(p) => format!("p:{}", p),
        }
    }
}

pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, Bytes>>,
    faults: RwLock<HashMap<MemoryOp, u16>>,
    page_limit: Option<usize>,
    part_size: u64,
    list_calls: AtomicUsize,
    last_part_size: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            faults: RwLock::new(HashMap::new()),
            page_limit: None,
            part_size: DEFAULT_PART_SIZE,
            list_calls: AtomicUsize::new(0),
            last_part_size: AtomicUsize::new(0),
        }
    }

    /// Cap every page at `limit` entries regardless of the requested size.
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = Some(limit.max(1));
        self
    }

    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    pub fn insert(&self, key: &str, data: impl Into<Bytes>) {
        self.objects.write().insert(key.to_string(), data.into());
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Make every later call of `op` fail with HTTP `status`.
    pub fn fail(&self, op: MemoryOp, status: u16) {
        self.faults.write().insert(op, status);
    }

    pub fn heal(&self, op: MemoryOp) {
        self.faults.write().remove(&op);
    }

    /// Number of `list_page` requests served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Threshold passed with the most recent upload.
    pub fn last_part_size(&self) -> u64 {
        self.last_part_size.load(Ordering::SeqCst) as u64
    }

    fn check_fault(&self, op: MemoryOp) -> Result<(), ObjStoreError> {
        match self.faults.read().get(&op) {
            Some(&status) => Err(ObjStoreError::backend(
                Some(status),
                format!("injected failure for {:?}", op),
            )),
            None => Ok(()),
        }
    }

    fn no_such_key(key: &str) -> ObjStoreError {
        ObjStoreError::backend(
            Some(404),
            format!("<Error><Code>NoSuchKey</Code><Key>{}</Key></Error>", key),
        )
    }

    /// All listing entries after `cursor`, in key order, prefixes collapsed.
    fn entries_after(&self, prefix: &str, delimiter: &str, cursor: Option<&str>) -> Vec<Entry> {
        let (after_key, after_prefix) = match cursor {
            Some(c) if c.starts_with("p:") => (None, Some(&c[2..])),
            Some(c) if c.starts_with("k:") => (Some(&c[2..]), None),
            _ => (None, None),
        };

        let objects = self.objects.read();
        let mut entries: Vec<Entry> = Vec::new();
        for key in objects.keys() {
            if !key.starts_with(prefix) {
                continue;
            }
            if let Some(last) = after_key {
                if key.as_str() <= last {
                    continue;
                }
            }
            if let Some(last) = after_prefix {
                if key.as_str() <= last || key.starts_with(last) {
                    continue;
                }
            }

            let rest = &key[prefix.len()..];
            let grouped = if delimiter.is_empty() { None } else { rest.find(delimiter) };
            match grouped {
                Some(idx) => {
                    let common = format!("{}{}", prefix, &rest[..idx + delimiter.len()]);
                    let seen = matches!(entries.last(), Some(Entry::Prefix(p)) if *p == common);
                    if !seen {
                        entries.push(Entry::Prefix(common));
                    }
                }
                None => entries.push(Entry::Key(key.clone())),
            }
        }
        entries
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn list_page(
        &self,
        prefix: &str,
        delimiter: &str,
        cursor: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, ObjStoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_fault(MemoryOp::List)?;

        let max_keys = match self.page_limit {
            Some(limit) => max_keys.min(limit),
            None => max_keys,
        }
        .max(1);

        let mut entries = self.entries_after(prefix, delimiter, cursor);
        let is_truncated = entries.len() > max_keys;
        entries.truncate(max_keys);

        let mut page = ListPage {
            next_cursor: if is_truncated { entries.last().map(Entry::cursor) } else { None },
            is_truncated,
            ..ListPage::default()
        };
        for entry in entries {
            match entry {
                Entry::Key(k) => page.keys.push(k),
                Entry::Prefix(p) => page.common_prefixes.push(p),
            }
        }
        Ok(page)
    }

    async fn get_object(&self, key: &str, range: ByteRange) -> Result<Bytes, ObjStoreError> {
        self.check_fault(MemoryOp::Get)?;
        let data = self.object(key).ok_or_else(|| Self::no_such_key(key))?;
        let bounds = range.slice_bounds(data.len() as u64).ok_or_else(|| {
            ObjStoreError::backend(
                Some(416),
                "<Error><Code>InvalidRange</Code></Error>".to_string(),
            )
        })?;
        Ok(data.slice(bounds))
    }

    async fn upload_file(&self, key: &str, path: &Path, part_size: u64) -> Result<(), ObjStoreError> {
        self.check_fault(MemoryOp::Upload)?;
        let data = tokio::fs::read(path).await?;
        self.last_part_size.store(part_size as usize, Ordering::SeqCst);
        self.insert(key, data);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), ObjStoreError> {
        self.check_fault(MemoryOp::Delete)?;
        // S3对不存在的对象同样返回204
        self.objects.write().remove(key);
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<bool, ObjStoreError> {
        self.check_fault(MemoryOp::Head)?;
        Ok(self.objects.read().contains_key(key))
    }

    fn part_size(&self) -> u64 {
        self.part_size
    }
}
