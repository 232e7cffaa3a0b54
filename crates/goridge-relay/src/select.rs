use std::time::Duration;

use tracing::trace;

use crate::error::{Result, TransportError};
use crate::sys;
use crate::traits::{PollHandle, Relay};

/// Outcome of [`select_ready`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Nothing became ready within the timeout.
    Empty,
    /// Positions (ascending) of the relays that can be read without
    /// blocking, or that are not connected yet.
    Ready(Vec<usize>),
}

impl Readiness {
    pub fn is_empty(&self) -> bool {
        matches!(self, Readiness::Empty)
    }

    /// The ready positions, empty when nothing is ready.
    pub fn into_positions(self) -> Vec<usize> {
        match self {
            Readiness::Empty => Vec::new(),
            Readiness::Ready(positions) => positions,
        }
    }
}

/// Ask the OS which relays have data waiting.
///
/// Unconnected relays and relays holding a buffered frame are ready at once,
/// in which case the descriptors are only probed, not waited on. All
/// descriptor-backed relays are checked in a single `poll(2)` call; hang-ups
/// and errors count as ready so the caller observes them on the next read.
///
/// Relays without a pollable handle are never reported. Mixing them with
/// descriptor-backed relays is an error.
pub fn select_ready(relays: &[&dyn Relay], timeout: Duration) -> Result<Readiness> {
    let mut ready = Vec::new();
    let mut fds = Vec::new();
    let mut positions = Vec::new();
    let mut unsupported = false;

    for (position, relay) in relays.iter().enumerate() {
        match relay.poll_handle() {
            PollHandle::Unconnected | PollHandle::Buffered => ready.push(position),
            PollHandle::Fd(fd) => {
                fds.push(sys::pollfd(fd));
                positions.push(position);
            }
            PollHandle::Unsupported => unsupported = true,
        }
    }

    if unsupported && !fds.is_empty() {
        return Err(TransportError::MixedRelayKinds);
    }

    if !fds.is_empty() {
        let wait = if ready.is_empty() {
            timeout
        } else {
            Duration::ZERO
        };
        let events = sys::poll(&mut fds, wait)?;
        trace!(relays = fds.len(), events, ?wait, "polled relays");
        if events > 0 {
            ready.extend(
                fds.iter()
                    .zip(&positions)
                    .filter(|(fd, _)| fd.revents & sys::READABLE != 0)
                    .map(|(_, position)| *position),
            );
        }
    }

    if ready.is_empty() {
        return Ok(Readiness::Empty);
    }
    ready.sort_unstable();
    Ok(Readiness::Ready(ready))
}
