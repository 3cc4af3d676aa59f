//!
//! Transfer session
//! ----------------
//! The per-connection state machine: read one command, dispatch to the
//! storage backend, drive the byte-exact streaming handshake for `get` and
//! `put`, and loop. Recoverable failures (malformed commands, missing blobs,
//! unreachable backend) are reported as a single `ERR <reason>` line and the
//! loop continues; stream-level failures close the connection. The request
//! side is newline-insensitive: each command is taken from one bounded read.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{self, Request, CHUNK_SIZE, END_OF_LISTING};
use crate::server::ServerContext;

/// Bound on a single socket read. Expiry loops back to a shutdown check
/// instead of closing; only a zero-byte read (peer EOF) or a socket error
/// ends the session.
const IDLE_READ_TIMEOUT: Duration = Duration::from_secs(10);

pub struct TransferSession {
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
}

impl TransferSession {
    pub fn new(stream: TcpStream, peer: SocketAddr, ctx: Arc<ServerContext>) -> Self {
        Self { stream, peer, ctx }
    }

    pub async fn run(mut self) {
        info!(target: "ferry::session", "connected: {}", self.peer);
        match self.command_loop().await {
            Ok(()) => info!(target: "ferry::session", "connection closed: {}", self.peer),
            Err(e) => {
                warn!(target: "ferry::session", "session ended: peer={} error={}", self.peer, e);
            }
        }
        let _ = self.stream.shutdown().await;
    }

    async fn command_loop(&mut self) -> Result<()> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = self.recv_some(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            let text = String::from_utf8_lossy(&buf[..n]);
            let line = text.trim();
            debug!(target: "ferry::session", "peer={} command: {:?}", self.peer, line);
            let request = match protocol::parse_request(line) {
                Ok(request) => request,
                Err(e) => {
                    self.reply_err(&e).await?;
                    continue;
                }
            };
            let outcome = match request {
                Request::List => self.handle_list().await,
                Request::Get { name } => self.handle_get(&name).await,
                Request::Put { name, size } => self.handle_put(&name, size).await,
            };
            if let Err(e) = outcome {
                if e.is_fatal() {
                    return Err(e);
                }
                self.reply_err(&e).await?;
            }
        }
    }

    /// `ls`: rows in backend order, `No files` when empty, closed by the
    /// listing sentinel. `ERR` replies stay single-line and unsentineled.
    async fn handle_list(&mut self) -> Result<()> {
        let blobs = self.ctx.backend.list().await?;
        let mut response = String::new();
        if blobs.is_empty() {
            response.push_str("No files\n");
        } else {
            for blob in &blobs {
                response.push_str(&protocol::format_listing_row(
                    blob.size,
                    blob.modified,
                    &blob.name,
                ));
                response.push('\n');
            }
        }
        response.push_str(END_OF_LISTING);
        response.push('\n');
        self.send(response.as_bytes()).await?;
        debug!(target: "ferry::session", "peer={} listed {} blob(s)", self.peer, blobs.len());
        Ok(())
    }

    /// `get`: announce `OK <size>`, hold the body until the peer acks the
    /// header, then stream exactly `size` bytes. A backend stream that ends
    /// early is unrecoverable: the announced size can no longer be honored.
    async fn handle_get(&mut self, raw_name: &str) -> Result<()> {
        let name = protocol::sanitize_name(raw_name)
            .ok_or_else(|| Error::protocol("Invalid GET format"))?;
        let reader = self.ctx.backend.open_for_read(&name).await?;
        let size = reader.size;
        self.send(format!("OK {}\n", size).as_bytes()).await?;

        let mut ack = vec![0u8; CHUNK_SIZE];
        if self.recv_some(&mut ack).await? == 0 {
            return Err(Error::incomplete(format!(
                "peer closed before acking download of '{}'",
                name
            )));
        }

        let mut body = reader.body;
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut sent: u64 = 0;
        while sent < size {
            let want = std::cmp::min(CHUNK_SIZE as u64, size - sent) as usize;
            let n = body.read(&mut chunk[..want]).await.map_err(|e| {
                Error::incomplete(format!("backend stream failed for '{}': {}", name, e))
            })?;
            if n == 0 {
                return Err(Error::incomplete(format!(
                    "backend stream ended at {} of {} bytes for '{}'",
                    sent, size, name
                )));
            }
            self.send(&chunk[..n]).await?;
            sent += n as u64;
        }
        self.ctx.metrics.emit("Downloads", 1.0);
        info!(target: "ferry::session", "sent '{}' ({} bytes) to {}", name, size, self.peer);
        Ok(())
    }

    /// `put`: ack with `OK`, read exactly `size` bytes into the backend
    /// sink, then commit. Fewer bytes than declared is a hard transfer
    /// error; the sink is aborted so nothing partial becomes visible.
    async fn handle_put(&mut self, raw_name: &str, size: u64) -> Result<()> {
        let name = protocol::sanitize_name(raw_name)
            .ok_or_else(|| Error::protocol("Invalid PUT format"))?;
        let mut sink = self
            .ctx
            .backend
            .open_for_write(&name, size)
            .await
            .map_err(|e| Error::backend(format!("Upload failed: {}", e)))?;
        self.send(b"OK\n").await?;

        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut received: u64 = 0;
        while received < size {
            let want = std::cmp::min(CHUNK_SIZE as u64, size - received) as usize;
            let n = match self.recv_some(&mut chunk[..want]).await {
                Ok(0) => {
                    sink.abort().await;
                    return Err(Error::incomplete(format!(
                        "peer sent {} of {} bytes for '{}'",
                        received, size, name
                    )));
                }
                Ok(n) => n,
                Err(e) => {
                    sink.abort().await;
                    return Err(e);
                }
            };
            if let Err(e) = sink.write_chunk(&chunk[..n]).await {
                sink.abort().await;
                return Err(Error::incomplete(format!(
                    "backend write failed for '{}': {}",
                    name, e
                )));
            }
            received += n as u64;
        }

        match sink.commit().await {
            Ok(()) => {
                self.send(b"OK\n").await?;
                self.ctx.metrics.emit("Uploads", 1.0);
                info!(target: "ferry::session", "stored '{}' ({} bytes) from {}", name, size, self.peer);
                Ok(())
            }
            Err(e) => {
                warn!(target: "ferry::session", "commit of '{}' failed: {}", name, e);
                self.send(format!("ERR Upload failed: {}\n", e).as_bytes())
                    .await?;
                Ok(())
            }
        }
    }

    /// One bounded read. Loops on idle expiry until data arrives or the
    /// shutdown flag is set; shutdown reads as EOF so in-flight transfers
    /// take the incomplete path and command reads close cleanly.
    async fn recv_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            if self.ctx.is_shutdown() {
                return Ok(0);
            }
            match timeout(IDLE_READ_TIMEOUT, self.stream.read(buf)).await {
                Err(_) => continue,
                Ok(Ok(n)) => return Ok(n),
                Ok(Err(e)) => return Err(Error::ConnectionFault(e)),
            }
        }
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(Error::ConnectionFault)
    }

    async fn reply_err(&mut self, error: &Error) -> Result<()> {
        debug!(target: "ferry::session", "peer={} recoverable error: {}", self.peer, error);
        if let Some(reply) = error.wire_reply() {
            self.send(format!("{}\n", reply).as_bytes()).await?;
        }
        Ok(())
    }
}
