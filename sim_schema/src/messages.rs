use std::io::{self, Read, Write};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::{InputFrame, PlayerId, Tick, WorldDelta, WorldSnapshot};

/// Upper bound on a single framed message.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    Hello { player: PlayerId },
    Input(InputFrame),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    Welcome { player: PlayerId, tick: Tick },
    Snapshot(WorldSnapshot),
    Delta(WorldDelta),
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame encode/decode failed: {0}")]
    Codec(#[from] bincode::Error),
    #[error("frame io failed: {0}")]
    Io(#[from] io::Error),
    #[error("frame of {0} bytes exceeds limit")]
    Oversize(usize),
}

/// Serialize `message` behind a little-endian `u32` length prefix.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, FrameError> {
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::Oversize(payload.len()));
    }
    let mut buffer = Vec::with_capacity(4 + payload.len());
    buffer.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buffer.extend_from_slice(&payload);
    Ok(buffer)
}

pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<(), FrameError> {
    let frame = encode_frame(message)?;
    writer.write_all(&frame)?;
    Ok(())
}

/// Block until one complete frame is read from `reader`.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, FrameError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::Oversize(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    decode_message(&payload)
}

/// Decode an unframed payload.
pub fn decode_message<T: DeserializeOwned>(payload: &[u8]) -> Result<T, FrameError> {
    Ok(bincode::deserialize(payload)?)
}
