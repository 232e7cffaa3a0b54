//! Goridge RPC clients.
//!
//! - [`Rpc`] makes blocking calls over a single relay.
//! - [`MultiRpc`] owns a pool of relays and multiplexes synchronous,
//!   fire-and-forget and asynchronous calls over them, correlating
//!   responses by sequence number.
//!
//! Payloads are encoded with a [`Codec`] (raw bytes, JSON or MessagePack)
//! whose id travels in the frame flags.
//!
//! ```no_run
//! use goridge_rpc::MultiRpc;
//!
//! # fn main() -> goridge_rpc::Result<()> {
//! let mut rpc = MultiRpc::create("tcp://127.0.0.1:6001", 4)?;
//! let sequences: Vec<u32> = (0..16)
//!     .map(|i| rpc.call_async("Service.Echo", &i))
//!     .collect::<Result<_, _>>()?;
//! for (sequence, value) in rpc.get_responses::<i32>(&sequences)? {
//!     println!("{sequence}: {}", value?);
//! }
//! # Ok(())
//! # }
//! ```

mod call;
pub mod codec;
pub mod error;
pub mod multi;
pub mod rpc;
pub mod sequence;

#[cfg(test)]
pub(crate) mod test_worker;

pub use codec::{Codec, DecodeOptions};
pub use error::{CodecError, Result, RpcError};
pub use multi::{
    MultiRpc, MultiRpcConfig, Responses, DEFAULT_FLUSH_LIMIT, DEFAULT_RESPONSE_BUFFER_LIMIT,
};
pub use rpc::Rpc;
pub use sequence::SequenceCounter;
