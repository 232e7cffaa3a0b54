use std::fmt;
use std::os::fd::BorrowedFd;

use goridge_frame::Frame;

use crate::error::Result;

/// The transport family behind a relay.
///
/// Relays of different kinds are never mixed in one readiness check or
/// one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayKind {
    /// TCP or Unix domain socket.
    Socket,
    /// Pollable pipe pair (stdio, child process pipes).
    Pipe,
    /// Arbitrary reader/writer with no pollable handle.
    Stream,
}

impl RelayKind {
    pub fn name(self) -> &'static str {
        match self {
            RelayKind::Socket => "socket",
            RelayKind::Pipe => "pipe",
            RelayKind::Stream => "stream",
        }
    }

    /// Whether relays of this kind expose an OS handle for readiness polling.
    pub fn is_multiplexable(self) -> bool {
        !matches!(self, RelayKind::Stream)
    }
}

/// What a relay offers to the readiness multiplexer.
#[derive(Debug)]
pub enum PollHandle<'a> {
    /// Not connected yet. Can take new work at once, so counts as ready.
    Unconnected,
    /// A complete frame is already buffered in user space.
    Buffered,
    /// Pollable descriptor to wait on.
    Fd(BorrowedFd<'a>),
    /// No pollable handle; readiness cannot be observed without blocking.
    Unsupported,
}

/// Blocking, duplex frame channel to a remote worker.
pub trait Relay: fmt::Display + Send {
    /// Send one frame, connecting first if needed.
    fn send(&mut self, frame: &Frame) -> Result<()>;

    /// Block until the next frame arrives.
    fn wait_frame(&mut self) -> Result<Frame>;

    /// Non-blocking check for a readable frame.
    fn has_frame(&self) -> Result<bool>;

    /// Whether the underlying channel is open and the peer still there.
    fn is_connected(&self) -> bool;

    /// Establish the underlying connection eagerly.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Drop the underlying connection. Relays that can reconnect do so on
    /// the next `send`.
    fn close(&mut self) {}

    fn kind(&self) -> RelayKind;

    fn poll_handle(&self) -> PollHandle<'_>;

    /// Open a fresh, unconnected handle to the same endpoint.
    fn duplicate(&self) -> Result<Box<dyn Relay>>;
}
