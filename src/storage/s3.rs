//!
//! S3 object-store backend
//! -----------------------
//! Blobs are objects in a single bucket. Uploads are spooled to a staging
//! file and pushed with one `put_object` on commit, so a partially received
//! upload can never surface as a truncated object. A custom endpoint (for
//! S3-compatible stores) switches the client to path-style addressing.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::{BlobInfo, BlobReader, BlobSink, StorageBackend};

static STAGING_NONCE: AtomicU64 = AtomicU64::new(1);

pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    staging_dir: PathBuf,
}

impl S3Store {
    pub fn new(
        sdk_config: &aws_config::SdkConfig,
        bucket: &str,
        endpoint: Option<&str>,
        staging_dir: &Path,
    ) -> anyhow::Result<Self> {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = aws_sdk_s3::Client::from_conf(builder.build());
        std::fs::create_dir_all(staging_dir)?;
        Ok(Self {
            client,
            bucket: bucket.to_string(),
            staging_dir: staging_dir.to_path_buf(),
        })
    }
}

fn to_utc(dt: &aws_sdk_s3::primitives::DateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos()).unwrap_or_else(Utc::now)
}

#[async_trait]
impl StorageBackend for S3Store {
    async fn list(&self) -> Result<Vec<BlobInfo>> {
        let mut blobs = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }
            let resp = req
                .send()
                .await
                .map_err(|e| Error::backend(format!("S3 list error: {}", DisplayErrorContext(&e))))?;
            for obj in resp.contents() {
                let Some(key) = obj.key() else { continue };
                blobs.push(BlobInfo {
                    name: key.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    modified: obj.last_modified().map(to_utc).unwrap_or_else(Utc::now),
                });
            }
            if resp.is_truncated() == Some(true) {
                continuation = resp.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        Ok(blobs)
    }

    async fn open_for_read(&self, name: &str) -> Result<BlobReader> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(name)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    return Err(Error::not_found(name));
                }
                return Err(Error::backend(format!(
                    "S3 get error: {}",
                    DisplayErrorContext(&service_err)
                )));
            }
        };
        let size = resp
            .content_length()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| Error::backend(format!("S3 get error: no content length for '{}'", name)))?;
        Ok(BlobReader { size, body: Box::new(resp.body.into_async_read()) })
    }

    async fn open_for_write(&self, name: &str, expected_size: u64) -> Result<Box<dyn BlobSink>> {
        let nonce = STAGING_NONCE.fetch_add(1, Ordering::Relaxed);
        let staging = self.staging_dir.join(format!("{}.{}.up", name, nonce));
        let file = File::create(&staging)
            .await
            .map_err(|e| Error::backend(format!("staging error: {}", e)))?;
        debug!(target: "ferry::storage", "upload of '{}' spooling to {}", name, staging.display());
        Ok(Box::new(S3Sink {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: name.to_string(),
            staging,
            file: Some(file),
            expected_size,
        }))
    }
}

struct S3Sink {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
    staging: PathBuf,
    file: Option<File>,
    expected_size: u64,
}

#[async_trait]
impl BlobSink for S3Sink {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| Error::backend("staging error: sink already closed"))?;
        file.write_all(chunk)
            .await
            .map_err(|e| Error::backend(format!("staging error: {}", e)))
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| Error::backend("staging error: sink already closed"))?;
        file.flush()
            .await
            .map_err(|e| Error::backend(format!("staging error: {}", e)))?;
        drop(file);
        let body = ByteStream::from_path(&self.staging)
            .await
            .map_err(|e| Error::backend(format!("staging error: {}", e)))?;
        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .content_length(self.expected_size as i64)
            .body(body)
            .send()
            .await;
        let _ = tokio::fs::remove_file(&self.staging).await;
        result
            .map(|_| ())
            .map_err(|e| Error::backend(format!("S3 put error: {}", DisplayErrorContext(&e))))
    }

    async fn abort(mut self: Box<Self>) {
        self.file.take();
        let _ = tokio::fs::remove_file(&self.staging).await;
    }
}

impl Drop for S3Sink {
    fn drop(&mut self) {
        // Covers every teardown path; after commit the spool file has
        // already been removed and this is a no-op.
        self.file.take();
        let _ = std::fs::remove_file(&self.staging);
    }
}
