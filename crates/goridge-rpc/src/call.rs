//! Request framing and response decoding shared by both engines.

use goridge_frame::Frame;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{Codec, DecodeOptions};
use crate::error::{Result, RpcError};

/// Remote method name: `Prefix.Method` when a service prefix is set.
pub(crate) fn method_name(prefix: Option<&str>, method: &str) -> String {
    match prefix {
        Some(prefix) => {
            let mut chars = method.chars();
            match chars.next() {
                Some(first) => format!("{prefix}.{}{}", first.to_uppercase(), chars.as_str()),
                None => format!("{prefix}."),
            }
        }
        None => method.to_string(),
    }
}

/// Frame for one call: body is the method name followed by the encoded
/// payload, options are `[sequence, method_len]`.
pub(crate) fn build_request_frame<T: Serialize + ?Sized>(
    method: &str,
    payload: &T,
    sequence: u32,
    codec: Codec,
) -> Result<Frame> {
    let method_len = u32::try_from(method.len())
        .map_err(|_| RpcError::Protocol(format!("method name of {} bytes", method.len())))?;
    let encoded = codec.encode(payload)?;

    let mut body = Vec::with_capacity(method.len() + encoded.len());
    body.extend_from_slice(method.as_bytes());
    body.extend_from_slice(&encoded);

    Ok(Frame::new(body, vec![sequence, method_len], codec.id()))
}

/// Sequence number a response frame answers.
pub(crate) fn response_sequence(frame: &Frame) -> Result<u32> {
    match frame.options.as_slice() {
        [sequence, _] => Ok(*sequence),
        other => Err(RpcError::Protocol(format!(
            "response carries {} options, expected 2",
            other.len()
        ))),
    }
}

/// Decode the result carried by a response frame.
///
/// A frame flagged `ERROR` becomes [`RpcError::Service`] naming `relay`.
pub(crate) fn decode_response<R: DeserializeOwned>(
    frame: &Frame,
    relay: &str,
    codec: Codec,
    options: DecodeOptions,
) -> Result<R> {
    response_sequence(frame)?;
    let offset = frame.options[1] as usize;
    let Some(body) = frame.payload.get(offset..) else {
        return Err(RpcError::Protocol(format!(
            "method length {offset} exceeds payload of {} bytes",
            frame.payload.len()
        )));
    };

    if frame.is_error() {
        return Err(RpcError::Service {
            message: String::from_utf8_lossy(body).into_owned(),
            relay: relay.to_string(),
        });
    }
    Ok(codec.decode(body, options)?)
}
