use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::flags;

/// Frame prefix: flags (1) + length (8) + length check (8) = 17 bytes.
pub const PREFIX_SIZE: usize = 17;

/// Maximum number of options a frame can carry (the count is one byte).
pub const MAX_OPTIONS: usize = u8::MAX as usize;

/// Default maximum body size: 128 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 128 * 1024 * 1024;

/// A single Goridge frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// The frame payload. May be empty.
    pub payload: Bytes,
    /// Unsigned options; `[sequence, method_name_len]` for RPC traffic.
    pub options: Vec<u32>,
    /// Codec id and control bits.
    pub flags: u8,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>, options: Vec<u32>, flags: u8) -> Self {
        Self {
            payload: payload.into(),
            options,
            flags,
        }
    }

    /// Size of the length-delimited part (option block + payload).
    pub fn body_len(&self) -> usize {
        1 + 4 * self.options.len() + self.payload.len()
    }

    /// The total wire size of this frame (prefix + body).
    pub fn wire_size(&self) -> usize {
        PREFIX_SIZE + self.body_len()
    }

    /// Codec id carried in the low flag bits.
    pub fn codec_id(&self) -> u8 {
        flags::codec_id(self.flags)
    }

    /// Whether the peer flagged this frame as a failure report.
    pub fn is_error(&self) -> bool {
        flags::is_error(self.flags)
    }

    /// Whether this frame carries protocol metadata.
    pub fn is_control(&self) -> bool {
        flags::is_control(self.flags)
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌─────────┬─────────────┬─────────────┬───────┬─────────────┬──────────┐
/// │ Flags   │ Length      │ Length      │ Count │ Options     │ Payload  │
/// │ (1B)    │ (8B LE)     │ (8B LE)     │ (1B)  │ (Count*4B)  │          │
/// └─────────┴─────────────┴─────────────┴───────┴─────────────┴──────────┘
///                         Length = 1 + Count*4 + payload bytes
/// ```
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    if frame.options.len() > MAX_OPTIONS {
        return Err(FrameError::InvalidOptions(format!(
            "{} options exceed the limit of {MAX_OPTIONS}",
            frame.options.len()
        )));
    }

    let body_len = frame.body_len();
    dst.reserve(PREFIX_SIZE + body_len);
    dst.put_u8(frame.flags);
    dst.put_u64_le(body_len as u64);
    dst.put_u64_le(body_len as u64);
    dst.put_u8(frame.options.len() as u8);
    for option in &frame.options {
        dst.put_u32_le(*option);
    }
    dst.put_slice(&frame.payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    let Some(body_len) = complete_body_len(src, max_payload)? else {
        return Ok(None); // Need more data
    };

    let flags = src[0];
    src.advance(PREFIX_SIZE);
    let mut body = src.split_to(body_len).freeze();
    let options = split_options(&mut body)?;

    Ok(Some(Frame {
        payload: body,
        options,
        flags,
    }))
}

/// Check whether `src` starts with a complete frame, without consuming it.
pub fn has_complete_frame(src: &[u8], max_payload: usize) -> Result<bool> {
    Ok(complete_body_len(src, max_payload)?.is_some())
}

fn complete_body_len(src: &[u8], max_payload: usize) -> Result<Option<usize>> {
    if src.len() < PREFIX_SIZE {
        return Ok(None);
    }

    let mut prefix = &src[1..PREFIX_SIZE];
    let length = prefix.get_u64_le();
    let check = prefix.get_u64_le();
    if length != check {
        return Err(FrameError::Prefix { length, check });
    }

    let body_len = usize::try_from(length).map_err(|_| FrameError::PayloadTooLarge {
        size: usize::MAX,
        max: max_payload,
    })?;
    if body_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: max_payload,
        });
    }

    if src.len() < PREFIX_SIZE + body_len {
        return Ok(None);
    }
    Ok(Some(body_len))
}

fn split_options(body: &mut Bytes) -> Result<Vec<u32>> {
    if !body.has_remaining() {
        return Err(FrameError::InvalidOptions(
            "missing option count".to_string(),
        ));
    }

    let count = body.get_u8() as usize;
    if body.remaining() < count * 4 {
        return Err(FrameError::InvalidOptions(format!(
            "{count} options declared but only {} bytes remain",
            body.remaining()
        )));
    }

    Ok((0..count).map(|_| body.get_u32_le()).collect())
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 128 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
