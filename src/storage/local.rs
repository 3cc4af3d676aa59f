//!
//! Local-filesystem backend
//! ------------------------
//! Blobs are plain files directly under a single data directory. Uploads are
//! written to a dot-prefixed temp file next to the destination and renamed
//! into place on commit, so a blob is only ever visible at its full size.
//! Dot-prefixed entries (in-flight uploads included) and subdirectories are
//! invisible to `list`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::{BlobInfo, BlobReader, BlobSink, StorageBackend};

static UPLOAD_NONCE: AtomicU64 = AtomicU64::new(1);

pub struct LocalStore {
    data_dir: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `data_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> anyhow::Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }
}

#[async_trait]
impl StorageBackend for LocalStore {
    async fn list(&self) -> Result<Vec<BlobInfo>> {
        let mut entries = tokio::fs::read_dir(&self.data_dir)
            .await
            .map_err(|e| Error::backend(format!("list error: {}", e)))?;
        let mut blobs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::backend(format!("list error: {}", e)))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            blobs.push(BlobInfo { name, size: meta.len(), modified });
        }
        Ok(blobs)
    }

    async fn open_for_read(&self, name: &str) -> Result<BlobReader> {
        let path = self.blob_path(name);
        let file = match File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found(name));
            }
            Err(e) => return Err(Error::backend(format!("read error: {}", e))),
        };
        let meta = file
            .metadata()
            .await
            .map_err(|e| Error::backend(format!("read error: {}", e)))?;
        Ok(BlobReader { size: meta.len(), body: Box::new(file) })
    }

    async fn open_for_write(&self, name: &str, expected_size: u64) -> Result<Box<dyn BlobSink>> {
        let nonce = UPLOAD_NONCE.fetch_add(1, Ordering::Relaxed);
        let temp = self.data_dir.join(format!(".{}.{}.partial", name, nonce));
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)
            .await
            .map_err(|e| Error::backend(format!("write error: {}", e)))?;
        debug!(target: "ferry::storage", "upload of '{}' staged at {}", name, temp.display());
        Ok(Box::new(LocalSink {
            file: Some(file),
            temp,
            dest: self.blob_path(name),
            expected_size,
            written: 0,
        }))
    }
}

struct LocalSink {
    file: Option<File>,
    temp: PathBuf,
    dest: PathBuf,
    expected_size: u64,
    written: u64,
}

#[async_trait]
impl BlobSink for LocalSink {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::backend("write error: sink already closed"))?;
        file.write_all(chunk)
            .await
            .map_err(|e| Error::backend(format!("write error: {}", e)))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        if self.written != self.expected_size {
            let (written, expected) = (self.written, self.expected_size);
            self.abort().await;
            return Err(Error::incomplete(format!(
                "committed {} of {} bytes",
                written, expected
            )));
        }
        let mut file = self
            .file
            .take()
            .ok_or_else(|| Error::backend("write error: sink already closed"))?;
        file.flush()
            .await
            .map_err(|e| Error::backend(format!("write error: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| Error::backend(format!("write error: {}", e)))?;
        drop(file);
        tokio::fs::rename(&self.temp, &self.dest)
            .await
            .map_err(|e| Error::backend(format!("commit error: {}", e)))?;
        Ok(())
    }

    async fn abort(mut self: Box<Self>) {
        self.file.take();
        let _ = tokio::fs::remove_file(&self.temp).await;
    }
}

impl Drop for LocalSink {
    fn drop(&mut self) {
        // Covers every teardown path; after a successful commit the temp
        // name no longer exists and the removal is a no-op.
        self.file.take();
        let _ = std::fs::remove_file(&self.temp);
    }
}
