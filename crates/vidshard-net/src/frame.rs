//! Length-prefixed postcard framing.
//!
//! A frame is a 4-byte big-endian length followed by that many bytes of
//! postcard-encoded payload.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::NetError;

/// Maximum frame size: 64 MB. Video segments are a few MB at most.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Serialize `message` and write it as one frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), NetError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload =
        postcard::to_allocvec(message).map_err(|e| NetError::Serialization(e.to_string()))?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(NetError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and deserialize it.
///
/// Returns `Ok(None)` if the stream ended cleanly before a new frame began.
/// A stream that ends mid-frame is an error.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, NetError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(NetError::Io(e)),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(NetError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    let message =
        postcard::from_bytes(&payload).map_err(|e| NetError::Serialization(e.to_string()))?;
    Ok(Some(message))
}
