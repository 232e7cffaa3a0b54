use std::fmt;

use goridge_relay::Relay;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{trace, warn};

use crate::call;
use crate::codec::{Codec, DecodeOptions};
use crate::error::{Result, RpcError};
use crate::sequence::SequenceCounter;

/// Synchronous client over a single relay.
///
/// Each call sends one request and blocks for its response. Not suitable
/// for concurrent calls; use [`MultiRpc`](crate::MultiRpc) for that.
pub struct Rpc {
    relay: Box<dyn Relay>,
    codec: Codec,
    prefix: Option<String>,
    sequence: SequenceCounter,
}

impl Rpc {
    /// Client over `relay` with the JSON codec and a fresh sequence counter.
    pub fn new(relay: Box<dyn Relay>) -> Self {
        Self {
            relay,
            codec: Codec::default(),
            prefix: None,
            sequence: SequenceCounter::new(),
        }
    }

    /// Client for a connection string such as `tcp://127.0.0.1:6001`.
    pub fn create(connection: &str) -> Result<Self> {
        Ok(Self::new(goridge_relay::create(connection)?))
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Prefix every method with `prefix.` (and title-case the method).
    pub fn with_service_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Draw sequence numbers from a shared counter.
    pub fn with_sequence(mut self, sequence: SequenceCounter) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn service_prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn relay(&self) -> &dyn Relay {
        self.relay.as_ref()
    }

    pub fn relay_mut(&mut self) -> &mut dyn Relay {
        self.relay.as_mut()
    }

    pub fn into_relay(self) -> Box<dyn Relay> {
        self.relay
    }

    /// Call `method` with `payload` and decode the result.
    pub fn call<T, R>(&mut self, method: &str, payload: &T) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call_with_options(method, payload, DecodeOptions::NONE)
    }

    /// Like [`call`](Self::call) with explicit decode options.
    pub fn call_with_options<T, R>(
        &mut self,
        method: &str,
        payload: &T,
        options: DecodeOptions,
    ) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let method = call::method_name(self.prefix.as_deref(), method);
        let sequence = self.sequence.next();
        let request = call::build_request_frame(&method, payload, sequence, self.codec)?;

        trace!(method = %method, sequence, relay = %self.relay, "rpc call");
        self.relay.send(&request)?;
        let response = self.relay.wait_frame()?;

        let got = match call::response_sequence(&response) {
            Ok(got) => got,
            Err(err) => {
                self.relay.close();
                return Err(err);
            }
        };
        if got != sequence {
            warn!(expected = sequence, got, relay = %self.relay, "discarding desynchronized relay");
            self.relay.close();
            return Err(RpcError::SequenceMismatch {
                expected: sequence,
                got,
            });
        }

        call::decode_response(&response, &self.relay.to_string(), self.codec, options)
    }
}

impl fmt::Debug for Rpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rpc")
            .field("relay", &self.relay.to_string())
            .field("codec", &self.codec)
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::thread;

    use bytes::Bytes;
    use goridge_frame::{Frame, FrameReader, FrameWriter, CODEC_JSON};
    use goridge_relay::{SocketRelay, TransportError};
    use serde_json::{json, Value};

    use super::*;
    use crate::test_worker;

    #[test]
    fn ping_pong() {
        let (relay, worker) = test_worker::connected_relay();
        let mut rpc = Rpc::new(relay);

        let pong: String = rpc.call("Service.Ping", "ping").unwrap();
        assert_eq!(pong, "pong");

        drop(rpc);
        worker.join().unwrap();
    }

    #[test]
    fn codecs_round_trip_through_worker() {
        let (relay, worker) = test_worker::connected_relay();
        let mut rpc = Rpc::new(relay);

        let value = json!({"name": "job", "ids": [1, 2, 3], "nested": {"ok": true}});
        let echoed: Value = rpc.call("Service.Echo", &value).unwrap();
        assert_eq!(echoed, value);

        let mut rpc = rpc.with_codec(Codec::MsgPack);
        let negated: i64 = rpc.call("Service.Negate", &41i64).unwrap();
        assert_eq!(negated, -41);

        let mut rpc = rpc.with_codec(Codec::Raw);
        let raw: Bytes = rpc.call("Service.Echo", &Bytes::from_static(b"\x00\x01\x02")).unwrap();
        assert_eq!(raw.as_ref(), b"\x00\x01\x02");

        drop(rpc);
        worker.join().unwrap();
    }

    #[test]
    fn service_prefix_names_method() {
        let (relay, worker) = test_worker::connected_relay();
        let mut rpc = Rpc::new(relay).with_service_prefix("Service");
        assert_eq!(rpc.service_prefix(), Some("Service"));

        let value: i64 = rpc.call("negate", &10).unwrap();
        assert_eq!(value, -10);

        drop(rpc);
        worker.join().unwrap();
    }

    #[test]
    fn service_error_carries_message() {
        let (relay, worker) = test_worker::connected_relay();
        let mut rpc = Rpc::new(relay).with_codec(Codec::Raw);

        let err = rpc.call::<_, Bytes>("Service.Fail", "boom").unwrap_err();
        match err {
            RpcError::Service { message, .. } => assert_eq!(message, "boom"),
            other => panic!("expected service error, got {other:?}"),
        }

        // The relay stays usable after a service error.
        let echoed: String = rpc.call("Service.Echo", "still here").unwrap();
        assert_eq!(echoed, "still here");

        drop(rpc);
        worker.join().unwrap();
    }

    #[test]
    fn sequences_come_from_shared_counter() {
        let (relay, worker) = test_worker::connected_relay();
        let counter = SequenceCounter::starting_after(99);
        let mut rpc = Rpc::new(relay).with_sequence(counter.clone());

        let _: String = rpc.call("Service.Ping", &()).unwrap();
        assert_eq!(counter.last(), 100);
        assert_eq!(counter.next(), 101);
        let _: String = rpc.call("Service.Ping", &()).unwrap();
        assert_eq!(counter.last(), 102);

        drop(rpc);
        worker.join().unwrap();
    }

    #[test]
    fn sequence_mismatch_closes_relay() {
        let (client, server) = UnixStream::pair().unwrap();
        let peer = thread::spawn(move || {
            let mut reader = FrameReader::new(server.try_clone().unwrap());
            let mut writer = FrameWriter::new(server);
            let request = reader.read_frame().unwrap();
            let mut reply = request.clone();
            reply.options[0] += 1;
            writer.write_frame(&reply).unwrap();
        });

        let relay = SocketRelay::from_unix_stream(client).unwrap();
        let mut rpc = Rpc::new(Box::new(relay));
        let err = rpc.call::<_, Value>("Service.Echo", &1).unwrap_err();
        assert!(matches!(err, RpcError::SequenceMismatch { expected: 1, got: 2 }));
        assert!(err.is_protocol());
        assert!(!rpc.relay().is_connected());

        peer.join().unwrap();
    }

    #[test]
    fn hangup_is_transport_error() {
        let (relay, worker) = test_worker::connected_relay();
        let mut rpc = Rpc::new(relay);

        let err = rpc.call::<_, Value>("Service.Hangup", &()).unwrap_err();
        assert!(matches!(err, RpcError::Transport(TransportError::Frame(_))));
        worker.join().unwrap();
    }

    #[test]
    fn corrupt_response_is_protocol_error() {
        let (client, server) = UnixStream::pair().unwrap();
        let peer = thread::spawn(move || {
            let mut reader = FrameReader::new(server.try_clone().unwrap());
            let mut writer = FrameWriter::new(server);
            let request = reader.read_frame().unwrap();
            writer
                .write_frame(&Frame::new(request.payload, vec![request.options[0]], CODEC_JSON))
                .unwrap();
        });

        let relay = SocketRelay::from_unix_stream(client).unwrap();
        let mut rpc = Rpc::new(Box::new(relay));
        let err = rpc.call::<_, Value>("Service.Echo", &1).unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));

        peer.join().unwrap();
    }

    #[test]
    fn create_rejects_bad_connection() {
        let err = Rpc::create("ftp://nowhere").unwrap_err();
        assert!(matches!(
            err,
            RpcError::Transport(TransportError::InvalidConnection { .. })
        ));
        assert!(Rpc::create("tcp://127.0.0.1:6001").is_ok());
    }
}
