//!
//! ferry configuration
//! -------------------
//! Environment-driven configuration, read once at startup and passed down as
//! a plain struct. The storage backend is selected here, explicitly, and
//! never re-decided at a call site.
//!
//! Variables:
//! - `FERRY_PORT`              listen port (default 5001)
//! - `FERRY_STORAGE`           `local` or `s3` (default `local`)
//! - `FERRY_DATA_DIR`          local-mode blob directory (default `./uploads`)
//! - `FERRY_BUCKET`            s3-mode bucket name (required for `s3`)
//! - `AWS_REGION`              s3-mode region (optional; SDK default chain otherwise)
//! - `FERRY_S3_ENDPOINT`       optional endpoint override for S3-compatible stores
//! - `FERRY_STAGING_DIR`       s3-mode upload spool directory (default: system temp)
//! - `FERRY_METRICS_NAMESPACE` CloudWatch namespace (default `Ferry`)

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub backend: BackendConfig,
    pub metrics_namespace: String,
}

/// Which storage backend to construct, chosen once at startup.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Local {
        data_dir: PathBuf,
    },
    S3 {
        bucket: String,
        region: Option<String>,
        endpoint: Option<String>,
        staging_dir: PathBuf,
    },
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = parse_port(env::var("FERRY_PORT").ok())?;
        let selector = env::var("FERRY_STORAGE").unwrap_or_else(|_| "local".to_string());
        let backend = match selector.to_ascii_lowercase().as_str() {
            "local" => BackendConfig::Local {
                data_dir: PathBuf::from(
                    env::var("FERRY_DATA_DIR").unwrap_or_else(|_| "./uploads".to_string()),
                ),
            },
            "s3" => BackendConfig::S3 {
                bucket: env::var("FERRY_BUCKET")
                    .context("FERRY_STORAGE=s3 requires FERRY_BUCKET")?,
                region: env::var("AWS_REGION").ok(),
                endpoint: env::var("FERRY_S3_ENDPOINT").ok(),
                staging_dir: env::var("FERRY_STAGING_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| env::temp_dir().join("ferry-staging")),
            },
            other => bail!("unknown FERRY_STORAGE '{}' (expected 'local' or 's3')", other),
        };
        let metrics_namespace =
            env::var("FERRY_METRICS_NAMESPACE").unwrap_or_else(|_| "Ferry".to_string());
        Ok(Config { port, backend, metrics_namespace })
    }

    /// Short human-readable mode tag for the startup banner.
    pub fn mode(&self) -> &'static str {
        match self.backend {
            BackendConfig::Local { .. } => "LOCAL FILESYSTEM",
            BackendConfig::S3 { .. } => "S3",
        }
    }
}

fn parse_port(raw: Option<String>) -> Result<u16> {
    match raw {
        None => Ok(5001),
        Some(s) => s
            .trim()
            .parse::<u16>()
            .with_context(|| format!("invalid FERRY_PORT '{}'", s)),
    }
}
