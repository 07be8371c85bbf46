//! Length-prefixed frame codec over any async byte stream.
//!
//! Each frame is: `[u32 little-endian length][JSON payload]`.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::Message;

/// Maximum allowed frame payload (1 MiB).
pub const MAX_FRAME: u32 = 1024 * 1024;

/// Errors raised while reading or writing frames.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FrameError {
    /// The stream ended inside a length prefix or payload.
    #[error("stream closed mid-frame")]
    Truncated,

    /// The declared payload length is above [`MAX_FRAME`].
    #[error("frame of {len} bytes exceeds 1 MiB limit")]
    TooLarge {
        /// Declared (or computed) payload length.
        len: u64,
    },

    /// The payload is not a valid message.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The message could not be serialized.
    #[error("unable to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Any other I/O failure on the underlying stream.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Serializes `msg` into a complete frame (prefix and payload).
pub fn encode(msg: &Message) -> Result<Vec<u8>, FrameError> {
    let payload = serde_json::to_vec(msg).map_err(FrameError::Encode)?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|&len| len <= MAX_FRAME)
        .ok_or(FrameError::TooLarge {
            len: payload.len() as u64,
        })?;

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Encodes `msg` and writes it to `w` in one `write_all`, then flushes.
///
/// Nothing reaches the stream if encoding fails.
pub async fn send(w: &mut (impl AsyncWrite + Unpin), msg: &Message) -> Result<(), FrameError> {
    let frame = encode(msg)?;
    w.write_all(&frame).await?;
    w.flush().await?;
    Ok(())
}

/// Reads exactly one frame from `r` and decodes it.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
/// Never reads past the end of the current frame; an oversized frame is
/// rejected before any of its payload is consumed.
pub async fn recv(r: &mut (impl AsyncRead + Unpin)) -> Result<Option<Message>, FrameError> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match r.read(&mut header[filled..]).await? {
            0 if filled == 0 => return Ok(None),
            0 => return Err(FrameError::Truncated),
            n => filled += n,
        }
    }

    let len = u32::from_le_bytes(header);
    if len > MAX_FRAME {
        return Err(FrameError::TooLarge {
            len: u64::from(len),
        });
    }

    let mut payload = vec![0u8; len as usize];
    r.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::Truncated
        } else {
            FrameError::Io(e)
        }
    })?;

    serde_json::from_slice(&payload)
        .map(Some)
        .map_err(FrameError::Malformed)
}
