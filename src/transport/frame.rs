// MIT License - Copyright (c) 2026 Peter Wright
// Length-prefixed encrypted framing

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::trace;

use crate::constants::{BODY_READ_TIMEOUT, IDLE_READ_TIMEOUT, LENGTH_PREFIX_SIZE, MAX_FRAME_LEN};
use crate::crypto::{decrypt, encrypt, RelayKey};
use crate::error::{RelayError, Result};

/// Per-read deadlines for [`read_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTimeouts {
    /// Wait for the length prefix. Bounded by the heartbeat interval.
    pub idle: Duration,
    /// Wait for the body once the prefix has arrived.
    pub body: Duration,
}

impl Default for FrameTimeouts {
    fn default() -> Self {
        Self {
            idle: IDLE_READ_TIMEOUT,
            body: BODY_READ_TIMEOUT,
        }
    }
}

/// Read one frame and return its decrypted payload.
///
/// Wire format: `[len: u32 BE][nonce(12) || ciphertext || tag(16)]`.
pub async fn read_message<R>(reader: &mut R, key: &RelayKey, timeouts: &FrameTimeouts) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    timeout(timeouts.idle, reader.read_exact(&mut prefix))
        .await
        .map_err(|_| RelayError::IdleTimeout(timeouts.idle))?
        .map_err(map_read_error)?;

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(RelayError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut body = vec![0u8; len];
    timeout(timeouts.body, reader.read_exact(&mut body))
        .await
        .map_err(|_| RelayError::ReadTimeout(timeouts.body))?
        .map_err(map_read_error)?;

    trace!("Frame received ({} bytes)", len);
    decrypt(key, &body)
}

/// Encrypt `plaintext`, frame it and write it as a single buffer, then flush.
pub async fn write_message<W>(writer: &mut W, key: &RelayKey, plaintext: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let blob = encrypt(key, plaintext)?;
    let frame = encode_frame(&blob)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    trace!("Frame sent ({} bytes)", blob.len());
    Ok(())
}

/// Prefix an already-encrypted payload with its big-endian length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(RelayError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// A short read means the peer closed mid-frame; everything else stays an I/O error.
fn map_read_error(e: io::Error) -> RelayError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        RelayError::ConnectionClosed
    } else {
        RelayError::Io(e)
    }
}
