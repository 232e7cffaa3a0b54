use std::fmt::Display;

use goridge_relay::TransportError;

/// Errors raised while encoding or decoding a payload.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("json encode failed: {0}")]
    JsonEncode(#[source] serde_json::Error),

    #[error("json decode failed: {0}")]
    JsonDecode(#[source] serde_json::Error),

    #[error("msgpack encode failed: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    #[error("msgpack decode failed: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// The raw codec only carries byte strings.
    #[error("raw codec: {0}")]
    Raw(String),
}

impl serde::ser::Error for CodecError {
    fn custom<T: Display>(msg: T) -> Self {
        CodecError::Raw(msg.to_string())
    }
}

impl serde::de::Error for CodecError {
    fn custom<T: Display>(msg: T) -> Self {
        CodecError::Raw(msg.to_string())
    }
}

/// Errors that can occur in RPC operations.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The relay's channel is broken.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// Malformed frame or a response that does not fit the request.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A single-relay call received somebody else's response.
    #[error("rpc sequence mismatch: expected {expected}, got {got}")]
    SequenceMismatch { expected: u32, got: u32 },

    /// The sequence was never submitted, or its response was already taken.
    #[error("unknown sequence {0}")]
    UnknownSequence(u32),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The worker ran the call and reported a failure.
    #[error("error '{message}' on '{relay}'")]
    Service { message: String, relay: String },

    /// Every relay in the pool is gone.
    #[error("no relays available")]
    NoRelays,

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RpcError {
    /// Whether this is a protocol-class failure: a corrupt frame, a
    /// mismatched or unknown sequence.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            RpcError::Protocol(_) | RpcError::SequenceMismatch { .. } | RpcError::UnknownSequence(_)
        )
    }
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        if err.is_integrity() {
            RpcError::Protocol(err.to_string())
        } else {
            RpcError::Transport(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use goridge_frame::FrameError;

    use super::*;

    #[test]
    fn integrity_failures_become_protocol_errors() {
        let err: RpcError = TransportError::Frame(FrameError::Prefix {
            length: 3,
            check: 4,
        })
        .into();
        assert!(matches!(err, RpcError::Protocol(_)));
        assert!(err.is_protocol());

        let err: RpcError = TransportError::Frame(FrameError::ConnectionClosed).into();
        assert!(matches!(err, RpcError::Transport(_)));
        assert!(!err.is_protocol());
    }

    #[test]
    fn service_error_names_relay() {
        let err = RpcError::Service {
            message: "boom".to_string(),
            relay: "tcp://127.0.0.1:6001".to_string(),
        };
        assert_eq!(err.to_string(), "error 'boom' on 'tcp://127.0.0.1:6001'");
    }
}
