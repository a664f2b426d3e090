//! Chunked cross-backend transfer engine
//!
//! Streams an object from one [`StorageClient`] to another in bounded
//! chunks. The source is stat'ed once, before the destination is opened, and
//! its length is the authority: a transfer only succeeds when exactly that
//! many bytes were written. On every failure after the destination was opened
//! the writer is aborted, never closed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::fs::LocalFsClient;
use crate::traits::{ObjectReader, ObjectWriter, StorageClient};

/// Default number of bytes moved per read/write round trip (32 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024 * 1024;

/// Progress callback, called after each chunk with `(bytes_written, total)`
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Summary of a successful transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CopyOutcome {
    pub bytes: u64,
    pub chunks: u64,
}

/// Streams objects between storage clients
///
/// Holds no per-transfer state; one engine can drive any number of
/// concurrent transfers.
#[derive(Clone)]
pub struct TransferEngine {
    chunk_size: usize,
    cancel: Option<CancellationToken>,
    progress: Option<ProgressFn>,
}

impl TransferEngine {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            cancel: None,
            progress: None,
        }
    }

    /// Stop transfers at the next chunk boundary once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Copy `source_path` on `source` to `destination_path` on `destination`
    pub async fn copy(
        &self,
        source: &dyn StorageClient,
        source_path: &str,
        destination: &dyn StorageClient,
        destination_path: &str,
    ) -> Result<CopyOutcome> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk size must be positive".to_string()));
        }

        let from = source.location(source_path);
        let to = destination.location(destination_path);
        if from == to {
            return Err(Error::InvalidPath(format!(
                "cannot copy {from} onto itself"
            )));
        }
        tracing::info!(from = %from, to = %to, chunk_size = self.chunk_size, "Starting transfer");

        tracing::debug!(from = %from, "Opening source");
        let mut reader = source.open_reader(source_path).await?;
        // the destination may truncate, so the length is taken first
        let total = source.stat(source_path).await?.content_length;
        tracing::debug!(to = %to, total, "Opening destination");
        let mut writer = destination.open_writer(destination_path).await?;

        let streamed = self
            .stream(reader.as_mut(), writer.as_mut(), total, &from, &to)
            .await;
        drop(reader);

        let outcome = match streamed {
            Ok(outcome) => outcome,
            Err(e) => {
                abort_writer(writer.as_mut(), &to).await;
                tracing::debug!(from = %from, to = %to, error = %e, "Transfer failed");
                return Err(e);
            }
        };

        if let Err(e) = writer.close().await {
            abort_writer(writer.as_mut(), &to).await;
            return Err(e);
        }

        tracing::info!(
            from = %from,
            to = %to,
            bytes = outcome.bytes,
            chunks = outcome.chunks,
            "Transfer complete"
        );
        Ok(outcome)
    }

    async fn stream(
        &self,
        reader: &mut dyn ObjectReader,
        writer: &mut dyn ObjectWriter,
        total: u64,
        from: &str,
        to: &str,
    ) -> Result<CopyOutcome> {
        tracing::debug!(from = %from, total, "Streaming");

        let mut written: u64 = 0;
        let mut chunks: u64 = 0;

        while written < total {
            if let Some(token) = &self.cancel
                && token.is_cancelled()
            {
                tracing::info!(from = %from, written, total, "Transfer cancelled");
                return Err(Error::Cancelled { written, total });
            }

            let want = (total - written).min(self.chunk_size as u64) as usize;
            let chunk = reader.read(want).await?;
            if chunk.is_empty() {
                tracing::warn!(
                    from = %from,
                    written,
                    total,
                    "Source stream ended before its reported length"
                );
                break;
            }

            let len = chunk.len() as u64;
            writer.write(chunk).await?;
            written += len;
            chunks += 1;
            tracing::trace!(chunk = chunks, len, written, total, "Chunk written");

            if let Some(progress) = &self.progress {
                progress(written, total);
            }
        }

        tracing::debug!(from = %from, to = %to, written, total, "Verifying");
        if written != total {
            return Err(Error::IncompleteCopy {
                from: from.to_string(),
                to: to.to_string(),
                expected: total,
                actual: written,
            });
        }

        Ok(CopyOutcome {
            bytes: written,
            chunks,
        })
    }

    /// Copy `source_path` to the local file `save_path`
    ///
    /// The parent directory is created when missing.
    pub async fn download(
        &self,
        source: &dyn StorageClient,
        source_path: &str,
        save_path: impl AsRef<Path>,
    ) -> Result<CopyOutcome> {
        let save_path = save_path.as_ref();
        let file_name = save_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                Error::InvalidPath(format!("{} has no file name", save_path.display()))
            })?;
        let parent = save_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let local = LocalFsClient::new(parent);
        self.copy(source, source_path, &local, file_name).await
    }

    /// Download into a fresh temporary directory
    ///
    /// The file is named `file_name`, or after the last `/` segment of
    /// `source_path`. The returned guard removes the directory when dropped.
    pub async fn download_to_temporary_file(
        &self,
        source: &dyn StorageClient,
        source_path: &str,
        file_name: Option<&str>,
    ) -> Result<TemporaryDownload> {
        let name = match file_name {
            Some(name) => name,
            None => source_path.rsplit('/').next().unwrap_or_default(),
        };
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(Error::InvalidPath(format!(
                "cannot derive a file name from '{source_path}'"
            )));
        }

        self.download_into_temporary_dir(&std::env::temp_dir(), source, source_path, name)
            .await
    }

    async fn download_into_temporary_dir(
        &self,
        parent: &Path,
        source: &dyn StorageClient,
        source_path: &str,
        name: &str,
    ) -> Result<TemporaryDownload> {
        let dir = tempfile::Builder::new()
            .prefix("stowage-")
            .tempdir_in(parent)?;
        let path = dir.path().join(name);
        // an error drops `dir`, which removes it
        let outcome = self.download(source, source_path, &path).await?;

        Ok(TemporaryDownload {
            _dir: dir,
            path,
            outcome,
        })
    }
}

async fn abort_writer(writer: &mut dyn ObjectWriter, to: &str) {
    if let Err(e) = writer.abort().await {
        tracing::warn!(to = %to, error = %e, "Failed to abort destination writer");
    }
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferEngine")
            .field("chunk_size", &self.chunk_size)
            .field("cancellable", &self.cancel.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// A downloaded file inside a temporary directory that is removed on drop
#[derive(Debug)]
pub struct TemporaryDownload {
    _dir: TempDir,
    path: PathBuf,
    outcome: CopyOutcome,
}

impl TemporaryDownload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn outcome(&self) -> CopyOutcome {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{MockObjectReader, MockObjectWriter, MockStorageClient, ObjectStat};
    use bytes::Bytes;
    use std::sync::Mutex;

    const MIB: usize = 1024 * 1024;

    fn pattern(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i % 251) as u8).collect()
    }

    async fn roundtrip(size: usize, chunk_size: usize) -> CopyOutcome {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let source = LocalFsClient::new(src_dir.path());
        let destination = LocalFsClient::new(dst_dir.path());

        let data = pattern(size);
        source
            .write("in/object.bin", Bytes::from(data.clone()))
            .await
            .unwrap();

        let outcome = TransferEngine::new(chunk_size)
            .copy(&source, "in/object.bin", &destination, "out/object.bin")
            .await
            .unwrap();

        let copied = std::fs::read(dst_dir.path().join("out/object.bin")).unwrap();
        assert_eq!(copied.len(), size);
        assert!(copied == data, "copied bytes differ from source");
        outcome
    }

    #[tokio::test]
    async fn test_copy_size_equal_to_chunk() {
        let outcome = roundtrip(1024, 1024).await;
        assert_eq!(outcome, CopyOutcome { bytes: 1024, chunks: 1 });
    }

    #[tokio::test]
    async fn test_copy_size_just_over_chunk() {
        let outcome = roundtrip(5 * MIB + 1, 5 * MIB).await;
        assert_eq!(outcome.bytes, (5 * MIB + 1) as u64);
        assert_eq!(outcome.chunks, 2);
    }

    #[tokio::test]
    async fn test_copy_size_just_under_chunk() {
        let outcome = roundtrip(5 * MIB - 1, 5 * MIB).await;
        assert_eq!(outcome.bytes, (5 * MIB - 1) as u64);
        assert_eq!(outcome.chunks, 1);
    }

    #[tokio::test]
    async fn test_copy_one_byte_chunks() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let source = LocalFsClient::new(src_dir.path());
        let destination = LocalFsClient::new(dst_dir.path());
        source
            .write("hello.txt", Bytes::from_static(b"Hello, world!"))
            .await
            .unwrap();

        let outcome = TransferEngine::new(1)
            .copy(&source, "hello.txt", &destination, "hello.txt")
            .await
            .unwrap();

        assert_eq!(outcome, CopyOutcome { bytes: 13, chunks: 13 });
        assert_eq!(
            std::fs::read(dst_dir.path().join("hello.txt")).unwrap(),
            b"Hello, world!"
        );
    }

    #[tokio::test]
    async fn test_copy_empty_object() {
        let outcome = roundtrip(0, 1024).await;
        assert_eq!(outcome, CopyOutcome { bytes: 0, chunks: 0 });
    }

    #[tokio::test]
    async fn test_short_stream_is_incomplete_and_aborts() {
        let mut reader = MockObjectReader::new();
        let mut reads = 0;
        reader.expect_read().returning(move |max| {
            reads += 1;
            assert!(max <= 1024);
            if reads == 1 {
                Ok(Bytes::from(vec![7u8; 512]))
            } else {
                Ok(Bytes::new())
            }
        });

        let mut source = MockStorageClient::new();
        source
            .expect_location()
            .returning(|path| format!("mock://src/{path}"));
        source
            .expect_open_reader()
            .times(1)
            .return_once(move |_| Ok(Box::new(reader) as Box<dyn ObjectReader>));
        source
            .expect_stat()
            .times(1)
            .returning(|_| Ok(ObjectStat::new(1024)));

        let mut writer = MockObjectWriter::new();
        writer.expect_write().times(1).returning(|_| Ok(()));
        writer.expect_close().times(0);
        writer.expect_abort().times(1).returning(|| Ok(()));

        let mut destination = MockStorageClient::new();
        destination
            .expect_location()
            .returning(|path| format!("mock://dst/{path}"));
        destination
            .expect_open_writer()
            .times(1)
            .return_once(move |_| Ok(Box::new(writer) as Box<dyn ObjectWriter>));

        let err = TransferEngine::new(1024)
            .copy(&source, "a.bin", &destination, "b.bin")
            .await
            .unwrap_err();

        match err {
            Error::IncompleteCopy {
                from,
                to,
                expected,
                actual,
            } => {
                assert_eq!(from, "mock://src/a.bin");
                assert_eq!(to, "mock://dst/b.bin");
                assert_eq!(expected, 1024);
                assert_eq!(actual, 512);
            }
            other => panic!("expected incomplete copy, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_write_failure_aborts_and_keeps_original_error() {
        let mut reader = MockObjectReader::new();
        reader
            .expect_read()
            .returning(|max| Ok(Bytes::from(vec![1u8; max])));

        let mut source = MockStorageClient::new();
        source.expect_location().returning(|p| format!("mock://src/{p}"));
        source
            .expect_open_reader()
            .return_once(move |_| Ok(Box::new(reader) as Box<dyn ObjectReader>));
        source.expect_stat().returning(|_| Ok(ObjectStat::new(100)));

        let mut writer = MockObjectWriter::new();
        writer
            .expect_write()
            .returning(|_| Err(Error::Network("connection reset".to_string())));
        writer.expect_close().times(0);
        writer
            .expect_abort()
            .times(1)
            .returning(|| Err(Error::General("abort failed too".to_string())));

        let mut destination = MockStorageClient::new();
        destination.expect_location().returning(|p| format!("mock://dst/{p}"));
        destination
            .expect_open_writer()
            .return_once(move |_| Ok(Box::new(writer) as Box<dyn ObjectWriter>));

        let err = TransferEngine::new(10)
            .copy(&source, "a", &destination, "b")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(msg) if msg == "connection reset"));
    }

    #[tokio::test]
    async fn test_zero_chunk_size_is_rejected() {
        let source = MockStorageClient::new();
        let destination = MockStorageClient::new();
        let err = TransferEngine::new(0)
            .copy(&source, "a", &destination, "b")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_missing_source_opens_no_writer() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let source = LocalFsClient::new(src_dir.path());
        let destination = LocalFsClient::new(dst_dir.path());

        let err = TransferEngine::default()
            .copy(&source, "missing.bin", &destination, "out.bin")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!dst_dir.path().join("out.bin").exists());
    }

    #[tokio::test]
    async fn test_cancelled_transfer_removes_partial_output() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let source = LocalFsClient::new(src_dir.path());
        let destination = LocalFsClient::new(dst_dir.path());
        source
            .write("big.bin", Bytes::from(pattern(4096)))
            .await
            .unwrap();

        let token = CancellationToken::new();
        let trigger = token.clone();
        let engine = TransferEngine::new(1024)
            .with_cancellation(token)
            .with_progress(move |written, _| {
                if written >= 2048 {
                    trigger.cancel();
                }
            });

        let err = engine
            .copy(&source, "big.bin", &destination, "big.bin")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Cancelled {
                written: 2048,
                total: 4096
            }
        ));
        assert!(!dst_dir.path().join("big.bin").exists());
    }

    #[tokio::test]
    async fn test_progress_reports_every_chunk() {
        let src_dir = TempDir::new().unwrap();
        let source = LocalFsClient::new(src_dir.path());
        source
            .write("p.bin", Bytes::from(pattern(2500)))
            .await
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let engine = TransferEngine::new(1000).with_progress(move |written, total| {
            sink.lock().unwrap().push((written, total));
        });

        engine
            .copy(&source, "p.bin", &source, "q.bin")
            .await
            .unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(1000, 2500), (2000, 2500), (2500, 2500)]
        );
    }

    #[tokio::test]
    async fn test_concurrent_transfers_share_clients() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let source = LocalFsClient::new(src_dir.path());
        let destination = LocalFsClient::new(dst_dir.path());
        for i in 0..4 {
            source
                .write(&format!("f{i}.bin"), Bytes::from(pattern(3000 + i)))
                .await
                .unwrap();
        }

        let engine = TransferEngine::new(512);
        let names: Vec<String> = (0..4).map(|i| format!("f{i}.bin")).collect();
        let copies = names
            .iter()
            .map(|name| engine.copy(&source, name, &destination, name));
        let results = futures::future::join_all(copies).await;

        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap().bytes, (3000 + i) as u64);
        }
    }

    #[tokio::test]
    async fn test_download_creates_parent_directories() {
        let src_dir = TempDir::new().unwrap();
        let save_dir = TempDir::new().unwrap();
        let source = LocalFsClient::new(src_dir.path());
        source
            .write("docs/report.pdf", Bytes::from_static(b"%PDF-1.7"))
            .await
            .unwrap();

        let save_path = save_dir.path().join("a/b/report.pdf");
        let outcome = TransferEngine::default()
            .download(&source, "docs/report.pdf", &save_path)
            .await
            .unwrap();

        assert_eq!(outcome.bytes, 8);
        assert_eq!(std::fs::read(&save_path).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn test_temporary_download_is_removed_on_drop() {
        let src_dir = TempDir::new().unwrap();
        let source = LocalFsClient::new(src_dir.path());
        source
            .write("deep/name.txt", Bytes::from_static(b"temporary"))
            .await
            .unwrap();

        let engine = TransferEngine::default();
        let download = engine
            .download_to_temporary_file(&source, "deep/name.txt", None)
            .await
            .unwrap();
        let path = download.path().to_path_buf();
        assert_eq!(path.file_name().unwrap(), "name.txt");
        assert_eq!(std::fs::read(&path).unwrap(), b"temporary");
        assert_eq!(download.outcome().bytes, 9);

        drop(download);
        assert!(!path.exists());
        assert!(!path.parent().unwrap().exists());

        let renamed = engine
            .download_to_temporary_file(&source, "deep/name.txt", Some("other.txt"))
            .await
            .unwrap();
        assert_eq!(renamed.path().file_name().unwrap(), "other.txt");
    }

    #[tokio::test]
    async fn test_temporary_download_rejects_missing_name() {
        let src_dir = TempDir::new().unwrap();
        let source = LocalFsClient::new(src_dir.path());
        let engine = TransferEngine::default();

        assert!(matches!(
            engine.download_to_temporary_file(&source, "dir/", None).await,
            Err(Error::InvalidPath(_))
        ));
        assert!(
            engine
                .download_to_temporary_file(&source, "missing.txt", None)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_copy_onto_itself_is_rejected() {
        let dir = TempDir::new().unwrap();
        let client = LocalFsClient::new(dir.path());
        client
            .write("a.bin", Bytes::from(pattern(1024)))
            .await
            .unwrap();

        let engine = TransferEngine::new(256);
        for destination in ["a.bin", "/a.bin", "./a.bin"] {
            assert!(matches!(
                engine.copy(&client, "a.bin", &client, destination).await,
                Err(Error::InvalidPath(_))
            ));
        }
        assert_eq!(std::fs::read(dir.path().join("a.bin")).unwrap(), pattern(1024));
    }

    #[tokio::test]
    async fn test_source_is_stated_before_destination_opens() {
        let mut seq = mockall::Sequence::new();

        let mut source = MockStorageClient::new();
        source.expect_location().returning(|p| format!("mock://src/{p}"));
        source
            .expect_open_reader()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Box::new(MockObjectReader::new()) as Box<dyn ObjectReader>));
        source
            .expect_stat()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ObjectStat::new(0)));

        let mut writer = MockObjectWriter::new();
        writer.expect_close().times(1).returning(|| Ok(()));

        let mut destination = MockStorageClient::new();
        destination.expect_location().returning(|p| format!("mock://dst/{p}"));
        destination
            .expect_open_writer()
            .times(1)
            .in_sequence(&mut seq)
            .return_once(move |_| Ok(Box::new(writer) as Box<dyn ObjectWriter>));

        let outcome = TransferEngine::new(16)
            .copy(&source, "a", &destination, "b")
            .await
            .unwrap();
        assert_eq!(outcome, CopyOutcome { bytes: 0, chunks: 0 });
    }

    #[tokio::test]
    async fn test_failed_temporary_download_leaves_no_directory() {
        let mut reader = MockObjectReader::new();
        let mut reads = 0;
        reader.expect_read().returning(move |_| {
            reads += 1;
            if reads == 1 {
                Ok(Bytes::from(vec![3u8; 100]))
            } else {
                Ok(Bytes::new())
            }
        });

        let mut source = MockStorageClient::new();
        source.expect_location().returning(|p| format!("mock://src/{p}"));
        source
            .expect_open_reader()
            .return_once(move |_| Ok(Box::new(reader) as Box<dyn ObjectReader>));
        source.expect_stat().returning(|_| Ok(ObjectStat::new(1000)));

        let parent = TempDir::new().unwrap();
        let err = TransferEngine::new(64)
            .download_into_temporary_dir(parent.path(), &source, "data/report.bin", "report.bin")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::IncompleteCopy {
                expected: 1000,
                actual: 100,
                ..
            }
        ));
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_download_removes_partial_file() {
        let src_dir = TempDir::new().unwrap();
        let save_dir = TempDir::new().unwrap();
        let source = LocalFsClient::new(src_dir.path());
        source
            .write("big.bin", Bytes::from(pattern(4096)))
            .await
            .unwrap();

        let token = CancellationToken::new();
        let trigger = token.clone();
        let engine = TransferEngine::new(1024)
            .with_cancellation(token)
            .with_progress(move |_, _| trigger.cancel());

        let save_path = save_dir.path().join("out/big.bin");
        assert!(matches!(
            engine.download(&source, "big.bin", &save_path).await,
            Err(Error::Cancelled { written: 1024, .. })
        ));
        assert!(!save_path.exists());
    }
}
