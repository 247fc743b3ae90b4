// crates/convoy-proto/src/framing.rs
// ============================================================================
// Module: Length-Prefixed Framing
// Description: Binary frame codec for the agent control channel.
// Purpose: Read and write length-prefixed JSON frames with strict size limits.
// Dependencies: bytes, serde, serde_json, tokio
// ============================================================================

//! ## Overview
//! Every message on the agent channel is one frame: a 4-byte big-endian
//! payload length followed by that many JSON bytes. Frames above
//! [`MAX_FRAME_BYTES`] are rejected before the payload is read so a hostile
//! peer cannot force unbounded allocation. A clean close between frames reads
//! as end-of-stream; a close mid-frame is a truncation error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use bytes::BufMut;
use bytes::BytesMut;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted frame payload size (4 MiB).
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Length prefix size in bytes.
const LEN_PREFIX_BYTES: usize = 4;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Frame codec errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Frame payload exceeds the size limit.
    #[error("frame exceeds size limit ({actual} > {limit})")]
    TooLarge {
        /// Declared payload size in bytes.
        actual: usize,
        /// Maximum accepted payload size in bytes.
        limit: usize,
    },
    /// Peer closed the connection mid-frame.
    #[error("connection closed mid-frame")]
    Truncated,
    /// Underlying transport failure.
    #[error("frame io error: {0}")]
    Io(String),
    /// Payload failed to encode or decode.
    #[error("frame codec error: {0}")]
    Codec(String),
}

impl From<std::io::Error> for FrameError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(err.to_string())
        }
    }
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Encodes a value into a single length-prefixed frame.
///
/// # Errors
///
/// Returns [`FrameError::Codec`] when serialization fails and
/// [`FrameError::TooLarge`] when the payload exceeds [`MAX_FRAME_BYTES`].
pub fn encode_frame<T: Serialize>(value: &T) -> Result<BytesMut, FrameError> {
    let payload = serde_json::to_vec(value).map_err(|err| FrameError::Codec(err.to_string()))?;
    if payload.len() > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge {
            actual: payload.len(),
            limit: MAX_FRAME_BYTES,
        });
    }
    let mut frame = BytesMut::with_capacity(LEN_PREFIX_BYTES + payload.len());
    frame.put_u32(u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        actual: payload.len(),
        limit: MAX_FRAME_BYTES,
    })?);
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Writes a value as one frame to the transport.
///
/// # Errors
///
/// Returns [`FrameError`] when encoding or the write fails.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(value)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

// ============================================================================
// SECTION: Decoding
// ============================================================================

/// Reads one frame from the transport.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly between
/// frames.
///
/// # Errors
///
/// Returns [`FrameError::Truncated`] when the connection closes mid-frame,
/// [`FrameError::TooLarge`] when the declared length exceeds
/// [`MAX_FRAME_BYTES`], and [`FrameError::Codec`] when the payload is not a
/// valid message.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0_u8; LEN_PREFIX_BYTES];
    let first = reader.read(&mut len_buf[.. 1]).await?;
    if first == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut len_buf[1 ..]).await?;
    let declared = usize::try_from(u32::from_be_bytes(len_buf))
        .map_err(|_| FrameError::Codec("frame length does not fit platform".to_string()))?;
    if declared > MAX_FRAME_BYTES {
        return Err(FrameError::TooLarge {
            actual: declared,
            limit: MAX_FRAME_BYTES,
        });
    }
    let mut payload = vec![0_u8; declared];
    reader.read_exact(&mut payload).await?;
    let value =
        serde_json::from_slice(&payload).map_err(|err| FrameError::Codec(err.to_string()))?;
    Ok(Some(value))
}
