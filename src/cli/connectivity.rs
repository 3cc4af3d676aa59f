//!
//! Client transport for the ferry text protocol. One [`TransferClient`] owns
//! one connection; all server bytes flow through its buffered reader so line
//! responses and raw payload bytes never race each other.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::protocol::{CHUNK_SIZE, END_OF_LISTING};

pub struct TransferClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TransferClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to {}", addr))?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self { reader: BufReader::new(read_half), writer: write_half })
    }

    /// Fetch the listing. Returns the joined rows (or the `No files` line);
    /// a server-side `ERR` becomes an error.
    pub async fn list(&mut self) -> Result<String> {
        self.send_command("ls").await?;
        let mut line = self.read_line_trimmed().await?;
        if line.starts_with("ERR") {
            bail!("{}", line);
        }
        let mut rows = Vec::new();
        while line != END_OF_LISTING {
            rows.push(line);
            line = self.read_line_trimmed().await?;
        }
        Ok(rows.join("\n"))
    }

    /// Download `remote` into `dest`. Returns the byte count on success;
    /// a connection that ends before the announced size is an error.
    pub async fn download(&mut self, remote: &str, dest: &Path) -> Result<u64> {
        self.send_command(&format!("get {}", remote)).await?;
        let header = self.read_line_trimmed().await?;
        if header.starts_with("ERR") {
            bail!("{}", header);
        }
        let size: u64 = header
            .strip_prefix("OK ")
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(|| anyhow!("unexpected response: {}", header))?;

        // Ack the size header; the server holds the body until this arrives.
        self.writer.write_all(b"OK").await?;
        self.writer.flush().await?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("failed to create {}", dest.display()))?;
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut remaining = size;
        while remaining > 0 {
            let want = std::cmp::min(CHUNK_SIZE as u64, remaining) as usize;
            let n = self.reader.read(&mut chunk[..want]).await?;
            if n == 0 {
                bail!(
                    "connection closed after {} of {} bytes",
                    size - remaining,
                    size
                );
            }
            file.write_all(&chunk[..n]).await?;
            remaining -= n as u64;
        }
        file.flush().await?;
        Ok(size)
    }

    /// Upload the file at `local` under the blob name `remote`. Returns the
    /// uploaded byte count once the server confirms the commit.
    pub async fn upload(&mut self, local: &Path, remote: &str) -> Result<u64> {
        let size = tokio::fs::metadata(local)
            .await
            .with_context(|| format!("failed to stat {}", local.display()))?
            .len();
        self.send_command(&format!("put {} {}", remote, size)).await?;
        let ack = self.read_line_trimmed().await?;
        if !ack.starts_with("OK") {
            bail!("{}", ack);
        }

        let mut file = tokio::fs::File::open(local)
            .await
            .with_context(|| format!("failed to open {}", local.display()))?;
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            let n = file.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            self.writer.write_all(&chunk[..n]).await?;
        }
        self.writer.flush().await?;

        let status = self.read_line_trimmed().await?;
        if status != "OK" {
            bail!("{}", status);
        }
        Ok(size)
    }

    async fn send_command(&mut self, command: &str) -> Result<()> {
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_line_trimmed(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            bail!("server closed the connection");
        }
        Ok(line.trim_end().to_string())
    }
}
