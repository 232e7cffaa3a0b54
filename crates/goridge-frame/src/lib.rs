//! Goridge wire frames.
//!
//! Every frame on a stream transport is a fixed 17-byte prefix followed by
//! the frame body:
//! - 1 byte of flags (codec id in the low bits, `ERROR` / `CONTROL` above)
//! - 8 bytes little-endian body length
//! - the same 8 bytes again, as a cheap desynchronization check
//!
//! The body starts with a small block of `u32` options (conventionally
//! `[sequence, method_name_len]`) followed by the payload bytes.

pub mod codec;
pub mod error;
pub mod flags;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, has_complete_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD,
    MAX_OPTIONS, PREFIX_SIZE,
};
pub use error::{FrameError, Result};
pub use flags::{CODEC_JSON, CODEC_MASK, CODEC_MSGPACK, CODEC_RAW, CONTROL, ERROR};
pub use reader::FrameReader;
pub use writer::FrameWriter;
