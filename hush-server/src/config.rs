//! Server configuration (command-line flags and environment).

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "hushd", about = "Encrypted IRC-style chat relay")]
pub struct ServerConfig {
    /// Address to listen on for client connections.
    #[arg(long, default_value = "127.0.0.1:6667")]
    pub listen_addr: String,

    /// Server name used in logs.
    #[arg(long, default_value = "hush.local")]
    pub server_name: String,

    /// Base64-encoded 32-byte frame key.
    #[arg(long, env = "HUSH_KEY")]
    pub key: Option<String>,

    /// Path to a file containing the base64-encoded frame key.
    #[arg(long)]
    pub key_file: Option<String>,

    /// Channel every new session is placed in on registration.
    #[arg(long, default_value = "#General")]
    pub default_channel: String,
}

impl ServerConfig {
    /// Resolve the frame key: `--key` wins, then `--key-file`. With
    /// neither, a fresh random key is generated and logged so clients can
    /// still connect to a dev instance.
    pub fn frame_key(&self) -> Result<[u8; 32]> {
        let encoded = match (&self.key, &self.key_file) {
            (Some(key), _) => key.trim().to_string(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read key file {path}"))?
                .trim()
                .to_string(),
            (None, None) => {
                let key: [u8; 32] = rand::random();
                tracing::warn!(
                    "No frame key configured, generated ephemeral key {}",
                    STANDARD.encode(key)
                );
                return Ok(key);
            }
        };
        let bytes = STANDARD
            .decode(&encoded)
            .context("frame key is not valid base64")?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("frame key must be 32 bytes, got {}", bytes.len()))
    }
}
