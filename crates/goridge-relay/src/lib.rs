//! Duplex relays for the Goridge protocol.
//!
//! A relay carries [`Frame`](goridge_frame::Frame)s to and from a remote
//! worker. This crate provides:
//! - the [`Relay`] trait and its poll-handle capability
//! - [`SocketRelay`] over TCP or Unix domain sockets, connected lazily
//! - [`StreamRelay`] over a reader/writer pair (process pipes, stdio)
//! - [`create`] for `tcp://`, `unix://` and `pipes://` connection strings
//! - [`select_ready`], which asks the OS which of several relays can be read

#[cfg(not(unix))]
compile_error!("goridge-relay currently supports Unix platforms only");

pub mod error;
pub mod factory;
pub mod select;
pub mod socket;
pub mod stream;
pub mod traits;

mod sys;

pub use error::{Result, TransportError};
pub use factory::{create, parse, Endpoint, StdPipe};
pub use select::{select_ready, Readiness};
pub use socket::{SocketAddress, SocketConfig, SocketRelay};
pub use stream::StreamRelay;
pub use traits::{PollHandle, Relay, RelayKind};
