//! Length-prefixed framing for the game server stream.
//!
//! ```text
//! +-------------------+--------------------------------------+
//! | length (4 bytes)  | payload (length bytes)               |
//! | u32 little-endian | [version][postcard WireMessage]      |
//! +-------------------+--------------------------------------+
//! ```
//!
//! The length does not include the prefix itself. A zero-length frame is a
//! keepalive and carries no message.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::messages::{MessageError, WireMessage, deserialize_message, serialize_message};

/// Configuration for the framing layer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum allowed payload size in bytes. Default: 1 MB.
    pub max_payload_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1_048_576,
        }
    }
}

impl FrameConfig {
    /// Framing limited to `max_payload_size` bytes per frame.
    pub fn with_max(max_payload_size: u32) -> Self {
        Self { max_payload_size }
    }

    fn check(&self, size: usize) -> Result<u32, FrameError> {
        let max = self.max_payload_size;
        match u32::try_from(size) {
            Ok(size) if size <= max => Ok(size),
            Ok(size) => Err(FrameError::PayloadTooLarge { size, max }),
            Err(_) => Err(FrameError::PayloadTooLarge {
                size: u32::MAX,
                max,
            }),
        }
    }
}

/// Errors that can occur while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload size exceeds the configured maximum.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// The actual payload size.
        size: u32,
        /// The configured maximum.
        max: u32,
    },

    /// The connection was closed before a complete frame was received.
    #[error("connection closed")]
    ConnectionClosed,

    /// The frame arrived intact but did not hold a valid message.
    #[error("bad message: {0}")]
    Message(#[from] MessageError),

    /// Encoding an outgoing message failed.
    #[error("encode error: {0}")]
    Encode(#[source] postcard::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn closed_or_io(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

/// Read a single length-prefixed frame and return its payload.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(closed_or_io)?;

    let payload_len = u32::from_le_bytes(len_buf);
    if payload_len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: config.max_payload_size,
        });
    }

    let mut payload = vec![0u8; payload_len as usize];
    if payload_len > 0 {
        reader.read_exact(&mut payload).await.map_err(closed_or_io)?;
    }
    Ok(payload)
}

/// Write a single length-prefixed frame.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let len = config.check(payload.len())?;
    writer.write_all(&len.to_le_bytes()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Read frames until one carries a message. Keepalive frames are skipped.
pub async fn read_message<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<WireMessage, FrameError> {
    loop {
        let payload = read_frame(reader, config).await?;
        if payload.is_empty() {
            tracing::trace!("keepalive frame");
            continue;
        }
        return Ok(deserialize_message(&payload)?);
    }
}

/// Encode `msg` and write it as one frame.
pub async fn write_message<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg: &WireMessage,
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let payload = serialize_message(msg).map_err(FrameError::Encode)?;
    write_frame(writer, &payload, config).await
}
