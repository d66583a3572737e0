//! Per-line authenticated encryption for the wire protocol.
//!
//! Every protocol line travels as one independently encrypted frame:
//!
//! ```text
//! SEC1:<b64url(nonce)>:<b64url(ciphertext)>
//! ```
//!
//! followed by CRLF. A fresh random nonce is drawn per frame, so encoding
//! the same line twice produces different bytes on the wire. The payload
//! is the plaintext protocol line without any line terminator; framing is
//! the transport's job.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Marker prefix on every encrypted frame.
pub const FRAME_PREFIX: &str = "SEC1:";

/// AES-256-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("key material must be 32 bytes of base64")]
    Key,
    #[error("line is not a SEC1 frame")]
    NotAFrame,
    #[error("malformed frame")]
    Malformed,
    #[error("frame failed authentication")]
    Authentication,
    #[error("frame payload is not valid UTF-8")]
    Encoding,
    #[error("encryption failure")]
    Crypto,
}

/// Symmetric frame cipher. Cheap to clone; the writer task and the read
/// loop of a connection each hold one.
#[derive(Clone)]
pub struct FrameCipher {
    cipher: Aes256Gcm,
}

impl FrameCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Build a cipher from a base64 (standard alphabet) encoded 32-byte key.
    pub fn from_base64(encoded: &str) -> Result<Self, FrameError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| FrameError::Key)?;
        let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| FrameError::Key)?;
        Ok(Self::new(&key))
    }

    /// Encrypt one protocol line into a frame (without the trailing CRLF).
    pub fn encode(&self, line: &str) -> Result<String, FrameError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, line.as_bytes())
            .map_err(|_| FrameError::Crypto)?;
        Ok(format!(
            "{FRAME_PREFIX}{}:{}",
            URL_SAFE_NO_PAD.encode(nonce),
            URL_SAFE_NO_PAD.encode(&ciphertext)
        ))
    }

    /// Decrypt one frame back into the plaintext protocol line.
    ///
    /// Trailing CR/LF on the frame is tolerated, so the output of a
    /// buffered `read_line` can be passed straight in.
    pub fn decode(&self, frame: &str) -> Result<String, FrameError> {
        let body = frame
            .trim_end_matches(['\r', '\n'])
            .strip_prefix(FRAME_PREFIX)
            .ok_or(FrameError::NotAFrame)?;
        let (nonce_b64, ciphertext_b64) = body.split_once(':').ok_or(FrameError::Malformed)?;
        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(nonce_b64)
            .map_err(|_| FrameError::Malformed)?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(FrameError::Malformed);
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext_b64)
            .map_err(|_| FrameError::Malformed)?;
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_| FrameError::Authentication)?;
        String::from_utf8(plaintext).map_err(|_| FrameError::Encoding)
    }
}
