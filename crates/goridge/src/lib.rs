//! Client for the Goridge binary RPC protocol.
//!
//! Goridge carries RPC calls to a worker process over a TCP socket, a Unix
//! socket or a pair of pipes.
//!
//! # Crate Structure
//!
//! - [`frame`]: wire frames, flag bits, blocking frame reader and writer
//! - [`relay`]: duplex relays, connection strings, readiness polling
//! - [`rpc`]: payload codecs, the single-relay [`Rpc`] client and the
//!   pooled [`MultiRpc`] client

/// Re-export frame types.
pub mod frame {
    pub use goridge_frame::*;
}

/// Re-export relay types.
pub mod relay {
    pub use goridge_relay::*;
}

/// Re-export RPC client types.
pub mod rpc {
    pub use goridge_rpc::*;
}

pub use goridge_relay::{create as create_relay, Relay, TransportError};
pub use goridge_rpc::{
    Codec, DecodeOptions, MultiRpc, MultiRpcConfig, Result, Rpc, RpcError, SequenceCounter,
};
