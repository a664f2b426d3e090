//! Local filesystem backend
//!
//! A [`StorageClient`] rooted at a directory. Object paths are resolved
//! below the root, which is how downloads reuse the ordinary copy path.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::traits::{ObjectReader, ObjectStat, ObjectWriter, StorageClient, ensure_deleted};

/// Storage client backed by the local filesystem
#[derive(Debug, Clone)]
pub struct LocalFsClient {
    root: PathBuf,
}

impl LocalFsClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an object path below the root
    ///
    /// Leading `/` is ignored; `..` and other non-normal components are
    /// rejected so a path can never escape the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative.as_os_str().is_empty() {
            return Err(Error::InvalidPath(format!("empty object path '{path}'")));
        }
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(Error::InvalidPath(format!(
                "'{path}' escapes the storage root"
            )));
        }
        Ok(self.root.join(relative))
    }

    fn map_io(&self, err: io::Error, path: &str) -> Error {
        if err.kind() == io::ErrorKind::NotFound {
            Error::NotFound(self.location(path))
        } else {
            Error::Io(err)
        }
    }

    async fn create_parent(&self, target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageClient for LocalFsClient {
    fn location(&self, path: &str) -> String {
        let relative: PathBuf = Path::new(path.trim_start_matches('/'))
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        format!("file://{}", self.root.join(relative).display())
    }

    async fn open_reader(&self, path: &str) -> Result<Box<dyn ObjectReader>> {
        let target = self.resolve(path)?;
        let file = File::open(&target)
            .await
            .map_err(|e| self.map_io(e, path))?;
        Ok(Box::new(LocalFileReader { file }))
    }

    async fn open_writer(&self, path: &str) -> Result<Box<dyn ObjectWriter>> {
        let target = self.resolve(path)?;
        self.create_parent(&target).await?;
        let file = File::create(&target).await?;
        Ok(Box::new(LocalFileWriter {
            file: Some(file),
            path: target,
        }))
    }

    async fn stat(&self, path: &str) -> Result<ObjectStat> {
        let target = self.resolve(path)?;
        let metadata = fs::metadata(&target)
            .await
            .map_err(|e| self.map_io(e, path))?;

        if metadata.is_dir() {
            return Err(Error::InvalidPath(format!(
                "{} is a directory",
                self.location(path)
            )));
        }

        let mut stat = ObjectStat::new(metadata.len());
        stat.last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| jiff::Timestamp::try_from(t).ok());
        Ok(stat)
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let target = self.resolve(path)?;
        let data = fs::read(&target).await.map_err(|e| self.map_io(e, path))?;
        Ok(Bytes::from(data))
    }

    async fn write(&self, path: &str, data: Bytes) -> Result<()> {
        let target = self.resolve(path)?;
        self.create_parent(&target).await?;
        fs::write(&target, &data).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::Io(e)),
        }
        ensure_deleted(self, path).await
    }

    /// Returns a `file://` URL; local files have no expiry
    async fn presign_read(&self, path: &str, expires_secs: u64) -> Result<String> {
        self.stat(path).await?;
        let absolute = std::path::absolute(self.resolve(path)?)?;
        let url = url::Url::from_file_path(&absolute).map_err(|_| {
            Error::InvalidPath(format!("{} cannot be expressed as a URL", absolute.display()))
        })?;
        tracing::debug!(url = %url, expires_secs, "Local presign ignores expiry");
        Ok(url.to_string())
    }
}

/// Reader over an open local file
struct LocalFileReader {
    file: File,
}

#[async_trait]
impl ObjectReader for LocalFileReader {
    async fn read(&mut self, max_bytes: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(max_bytes);
        let mut filled = 0;
        while filled < max_bytes {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf.freeze())
    }
}

/// Writer over a local file; `abort` removes what was written
struct LocalFileWriter {
    file: Option<File>,
    path: PathBuf,
}

impl LocalFileWriter {
    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or_else(|| {
            Error::General(format!("{} is already closed", self.path.display()))
        })
    }
}

#[async_trait]
impl ObjectWriter for LocalFileWriter {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.file()?.write_all(&chunk).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let file = self.file()?;
        file.flush().await?;
        file.sync_all().await?;
        self.file = None;
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        if self.file.take().is_none() {
            return Ok(());
        }
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}
