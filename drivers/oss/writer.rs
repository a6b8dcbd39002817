//! 暂存上传
//!
//! The source is copied chunk by chunk into a private staging file, then the
//! finished file is handed to the backend together with its large-object
//! threshold. The staging file is removed on every path out.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::client::ObjectBackend;
use super::config::{S3Config, DEFAULT_CHUNK_SIZE};
use crate::storage::{with_cancel, ObjStoreError};

const STAGING_PREFIX: &str = "oss-upload-";

/// 上传参数
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// 每次从源读取的最大字节数
    pub chunk_size: usize,
    /// 暂存文件所在目录
    pub staging_dir: PathBuf,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            staging_dir: std::env::temp_dir(),
        }
    }
}

impl From<&S3Config> for UploadOptions {
    fn from(config: &S3Config) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            staging_dir: config.staging_dir(),
        }
    }
}

/// Stage `reader` to local scratch, then upload it as `name`.
pub async fn upload_staged(
    backend: &dyn ObjectBackend,
    cancel: &CancellationToken,
    name: &str,
    reader: &mut (dyn AsyncRead + Unpin + Send),
    opts: &UploadOptions,
) -> Result<()> {
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(&opts.staging_dir)
        .map_err(ObjStoreError::from)
        .with_context(|| format!("create staging file in {}", opts.staging_dir.display()))?;
    let (file, path) = staging.into_parts();

    let result = stage_and_send(backend, cancel, name, reader, file, &path, opts).await;

    // 清理失败只告警，不覆盖上传结果
    let shown = path.display().to_string();
    if let Err(e) = path.close() {
        tracing::warn!("OSS上传暂存文件清理失败: path={}, error={}", shown, e);
    }
    result
}

async fn stage_and_send(
    backend: &dyn ObjectBackend,
    cancel: &CancellationToken,
    name: &str,
    reader: &mut (dyn AsyncRead + Unpin + Send),
    file: File,
    path: &Path,
    opts: &UploadOptions,
) -> Result<()> {
    let mut file = tokio::fs::File::from_std(file);
    let mut buf = vec![0u8; opts.chunk_size.max(1)];
    let mut staged: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(ObjStoreError::Cancelled)
                .with_context(|| format!("upload oss object {}", name));
        }
        let n = with_cancel(cancel, async {
            reader.read(&mut buf).await.map_err(ObjStoreError::from)
        })
        .await
        .with_context(|| format!("read upload source for {}", name))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .await
            .map_err(ObjStoreError::from)
            .with_context(|| format!("write staging file {}", path.display()))?;
        staged += n as u64;
    }

    file.flush()
        .await
        .map_err(ObjStoreError::from)
        .with_context(|| format!("flush staging file {}", path.display()))?;
    drop(file);

    let part_size = backend.part_size();
    tracing::debug!("OSS上传: key={}, size={}, part_size={}", name, staged, part_size);

    with_cancel(cancel, backend.upload_file(name, path, part_size))
        .await
        .with_context(|| format!("upload oss object {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::oss::client::ListPage;
    use crate::drivers::oss::config::DEFAULT_PART_SIZE;
    use crate::drivers::oss::memory::{MemoryBackend, MemoryOp};
    use crate::storage::ByteRange;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context as TaskContext, Poll};
    use tokio::io::ReadBuf;

    fn options(dir: &Path, chunk_size: usize) -> UploadOptions {
        UploadOptions {
            chunk_size,
            staging_dir: dir.to_path_buf(),
        }
    }

    fn staging_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    /// Serves at most `step` bytes per read and records the largest buffer offered.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
        largest_request: usize,
    }

    impl AsyncRead for Trickle {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut TaskContext<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            self.largest_request = self.largest_request.max(buf.remaining());
            let end = (self.pos + self.step.min(buf.remaining())).min(self.data.len());
            let pos = self.pos;
            buf.put_slice(&self.data[pos..end]);
            self.pos = end;
            Poll::Ready(Ok(()))
        }
    }

    /// Yields some bytes, then fails.
    struct Broken {
        served: bool,
    }

    impl AsyncRead for Broken {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut TaskContext<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.served {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "source broke")));
            }
            self.served = true;
            let n = buf.remaining().min(7);
            buf.put_slice(&b"partial"[..n]);
            Poll::Ready(Ok(()))
        }
    }

    /// Removes the staging file before answering, so the later cleanup fails.
    struct ConsumesStagingFile {
        fail: bool,
    }

    #[async_trait]
    impl ObjectBackend for ConsumesStagingFile {
        async fn list_page(
            &self,
            _prefix: &str,
            _delimiter: &str,
            _cursor: Option<&str>,
            _max_keys: usize,
        ) -> Result<ListPage, ObjStoreError> {
            Ok(ListPage::default())
        }

        async fn get_object(&self, key: &str, _range: ByteRange) -> Result<Bytes, ObjStoreError> {
            Err(ObjStoreError::NotFound(key.to_string()))
        }

        async fn upload_file(&self, _key: &str, path: &Path, _part_size: u64) -> Result<(), ObjStoreError> {
            tokio::fs::remove_file(path).await?;
            if self.fail {
                return Err(ObjStoreError::backend(
                    Some(500),
                    "<Error><Code>InternalError</Code></Error>",
                ));
            }
            Ok(())
        }

        async fn delete_object(&self, _key: &str) -> Result<(), ObjStoreError> {
            Ok(())
        }

        async fn head_object(&self, _key: &str) -> Result<bool, ObjStoreError> {
            Ok(false)
        }

        fn part_size(&self) -> u64 {
            DEFAULT_PART_SIZE
        }
    }

    #[tokio::test]
    async fn test_cleanup_failure_keeps_upload_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ConsumesStagingFile { fail: true };
        let mut src: &[u8] = b"payload";

        let err = upload_staged(&backend, &CancellationToken::new(), "obj", &mut src, &options(dir.path(), 4))
            .await
            .unwrap_err();

        match err.downcast_ref::<ObjStoreError>() {
            Some(ObjStoreError::Backend { status, code, .. }) => {
                assert_eq!(*status, Some(500));
                assert_eq!(code.as_deref(), Some("InternalError"));
            }
            other => panic!("expected the upload error, got {:?}", other),
        }
        assert_eq!(staging_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_cleanup_failure_after_success_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ConsumesStagingFile { fail: false };
        let mut src: &[u8] = b"payload";

        upload_staged(&backend, &CancellationToken::new(), "obj", &mut src, &options(dir.path(), 4))
            .await
            .unwrap();
        assert_eq!(staging_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_upload_multi_chunk_source() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new().with_part_size(64);
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut src = Trickle {
            data: data.clone(),
            pos: 0,
            step: 1000,
            largest_request: 0,
        };

        upload_staged(&backend, &CancellationToken::new(), "blob", &mut src, &options(dir.path(), 256))
            .await
            .unwrap();

        assert_eq!(&backend.object("blob").unwrap()[..], data.as_slice());
        assert!(src.largest_request <= 256);
        assert_eq!(backend.last_part_size(), 64);
        assert_eq!(staging_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_upload_empty_source() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let mut src: &[u8] = b"";

        upload_staged(&backend, &CancellationToken::new(), "empty", &mut src, &options(dir.path(), 8))
            .await
            .unwrap();

        assert_eq!(backend.object("empty").unwrap().len(), 0);
        assert_eq!(staging_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_read_failure_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let mut src = Broken { served: false };

        let err = upload_staged(&backend, &CancellationToken::new(), "obj", &mut src, &options(dir.path(), 4))
            .await
            .unwrap_err();

        assert!(matches!(err.downcast_ref::<ObjStoreError>(), Some(ObjStoreError::Io(_))));
        assert!(format!("{:#}", err).contains("source broke"));
        assert!(backend.object("obj").is_none());
        assert_eq!(staging_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        backend.fail(MemoryOp::Upload, 500);
        let mut src: &[u8] = b"payload";

        let err = upload_staged(&backend, &CancellationToken::new(), "obj", &mut src, &options(dir.path(), 4))
            .await
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<ObjStoreError>(),
            Some(ObjStoreError::Backend { status: Some(500), .. })
        ));
        assert_eq!(staging_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_cancelled_upload_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut src: &[u8] = b"payload";

        let err = upload_staged(&backend, &cancel, "obj", &mut src, &options(dir.path(), 4))
            .await
            .unwrap_err();

        assert!(matches!(err.downcast_ref::<ObjStoreError>(), Some(ObjStoreError::Cancelled)));
        assert!(backend.is_empty());
        assert_eq!(staging_files(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_staging_dir() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let mut src: &[u8] = b"payload";

        let err = upload_staged(
            &backend,
            &CancellationToken::new(),
            "obj",
            &mut src,
            &options(&dir.path().join("absent"), 4),
        )
        .await
        .unwrap_err();

        assert!(matches!(err.downcast_ref::<ObjStoreError>(), Some(ObjStoreError::Io(_))));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_uploads_use_separate_staging() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let opts = options(dir.path(), 3);
        let cancel = CancellationToken::new();
        let mut a: &[u8] = b"first object";
        let mut b: &[u8] = b"second object";
        let mut c: &[u8] = b"third object";

        let (ra, rb, rc) = tokio::join!(
            upload_staged(&backend, &cancel, "a", &mut a, &opts),
            upload_staged(&backend, &cancel, "b", &mut b, &opts),
            upload_staged(&backend, &cancel, "c", &mut c, &opts),
        );
        ra.unwrap();
        rb.unwrap();
        rc.unwrap();

        assert_eq!(&backend.object("a").unwrap()[..], b"first object");
        assert_eq!(&backend.object("b").unwrap()[..], b"second object");
        assert_eq!(&backend.object("c").unwrap()[..], b"third object");
        assert_eq!(staging_files(dir.path()), 0);
    }

    #[test]
    fn test_options_from_config() {
        let config = S3Config {
            chunk_size: 1024,
            staging_dir: Some(PathBuf::from("/var/tmp/oss")),
            ..S3Config::default()
        };
        let opts = UploadOptions::from(&config);
        assert_eq!(opts.chunk_size, 1024);
        assert_eq!(opts.staging_dir, PathBuf::from("/var/tmp/oss"));
    }
}
