//! In-process stand-in for a remote worker, used by the engine tests.
//!
//! Methods:
//! - `Service.Ping`: returns `"pong"`
//! - `Service.Echo`: returns the argument unchanged
//! - `Service.Negate`: returns `-x` for an integer argument
//! - `Service.Sleep`: sleeps for the argument in milliseconds, then echoes it
//! - `Service.Hangup`: closes the connection without answering
//! - anything else: an `ERROR` frame

use std::os::unix::net::UnixStream;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use goridge_frame::{Frame, FrameReader, FrameWriter, ERROR};
use goridge_relay::{Relay, SocketRelay};

use crate::codec::{Codec, DecodeOptions};

/// Serve frames on `stream` until the client goes away.
pub(crate) fn spawn(stream: UnixStream) -> JoinHandle<()> {
    thread::spawn(move || {
        let reader = stream.try_clone().unwrap();
        let mut reader = FrameReader::new(reader);
        let mut writer = FrameWriter::new(stream);

        while let Ok(request) = reader.read_frame() {
            let Some(response) = respond(&request) else {
                return;
            };
            if writer.write_frame(&response).is_err() {
                return;
            }
        }
    })
}

/// A relay connected to a fresh worker thread.
pub(crate) fn connected_relay() -> (Box<dyn Relay>, JoinHandle<()>) {
    let (client, server) = UnixStream::pair().unwrap();
    let worker = spawn(server);
    (Box::new(SocketRelay::from_unix_stream(client).unwrap()), worker)
}

/// `count` relays, each with its own worker thread.
pub(crate) fn pool(count: usize) -> (Vec<Box<dyn Relay>>, Vec<JoinHandle<()>>) {
    (0..count).map(|_| connected_relay()).unzip()
}

/// Compute the reply for one request, or `None` to hang up.
pub(crate) fn respond(request: &Frame) -> Option<Frame> {
    let sequence = request.options[0];
    let method_len = request.options[1] as usize;
    let (method, body) = request.payload.split_at(method_len);
    let method = String::from_utf8_lossy(method).into_owned();
    let codec = Codec::from_id(request.codec_id()).unwrap();

    let result: Result<Vec<u8>, String> = match method.as_str() {
        "Service.Ping" => Ok(codec.encode("pong").unwrap()),
        "Service.Echo" => Ok(body.to_vec()),
        "Service.Negate" => codec
            .decode::<i64>(body, DecodeOptions::NONE)
            .map(|value| codec.encode(&-value).unwrap())
            .map_err(|err| err.to_string()),
        "Service.Sleep" => codec
            .decode::<u64>(body, DecodeOptions::NONE)
            .map(|millis| {
                thread::sleep(Duration::from_millis(millis));
                body.to_vec()
            })
            .map_err(|err| err.to_string()),
        "Service.Hangup" => return None,
        "Service.Fail" => Err(codec
            .decode::<String>(body, DecodeOptions::NONE)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned())),
        other => Err(format!("unknown method {other}")),
    };

    let (result, flags) = match result {
        Ok(bytes) => (bytes, codec.id()),
        Err(message) => (message.into_bytes(), codec.id() | ERROR),
    };
    let mut payload = method.into_bytes();
    payload.extend_from_slice(&result);
    Some(Frame::new(payload, vec![sequence, method_len as u32], flags))
}
