//! Minimal async client for the hush relay.
//!
//! Speaks the encrypted line protocol over TCP: every outbound line is
//! encoded as an independent frame, every inbound frame is decrypted back
//! into a protocol line. Used by bots, tooling, and the server's own
//! integration tests.

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::frame::FrameCipher;

pub struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    cipher: FrameCipher,
    buf: String,
}

impl Client {
    pub async fn connect(addr: &str, key: &[u8; 32]) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            cipher: FrameCipher::new(key),
            buf: String::new(),
        })
    }

    /// Encrypt and send one protocol line.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        let frame = self.cipher.encode(line)?;
        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        tracing::debug!("-> {line}");
        Ok(())
    }

    /// Read and decrypt the next protocol line.
    pub async fn read_line(&mut self) -> Result<String> {
        loop {
            self.buf.clear();
            let n = self.reader.read_line(&mut self.buf).await?;
            if n == 0 {
                bail!("server closed the connection");
            }
            let frame = self.buf.trim_end();
            if frame.is_empty() {
                continue;
            }
            let line = self.cipher.decode(frame)?;
            tracing::debug!("<- {line}");
            return Ok(line);
        }
    }

    /// Read lines until one contains `needle`, returning that line.
    ///
    /// Bails after `limit` lines so a missing reply fails the caller
    /// instead of hanging it.
    pub async fn read_until_containing(&mut self, needle: &str, limit: usize) -> Result<String> {
        for _ in 0..limit {
            let line = self.read_line().await?;
            if line.contains(needle) {
                return Ok(line);
            }
        }
        bail!("no line containing {needle:?} within {limit} lines");
    }
}
