use std::fmt;
use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};

use goridge_frame::{Frame, FrameConfig, FrameReader, FrameWriter};
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::sys;
use crate::traits::{PollHandle, Relay, RelayKind};

/// Relay over a separate reader and writer, such as a child process's
/// stdout/stdin or this process's own stdio.
///
/// A stream relay is always connected until its first I/O failure, and it
/// cannot reopen or duplicate its endpoint.
pub struct StreamRelay<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    /// Descriptor of `reader`, kept only for [`RelayKind::Pipe`] relays.
    read_fd: Option<RawFd>,
    label: String,
    closed: bool,
}

impl<R: Read, W: Write> StreamRelay<R, W> {
    /// Wrap an arbitrary reader/writer pair. Such relays cannot be polled.
    pub fn new(reader: R, writer: W) -> Self {
        Self::build(reader, writer, None, FrameConfig::default())
    }

    /// Replace the display label (`stream` or `pipes` by default).
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Limit the frame body size in both directions.
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.reader.set_max_payload_size(max_payload_size);
        self.writer.set_max_payload_size(max_payload_size);
        self
    }

    fn build(reader: R, writer: W, read_fd: Option<RawFd>, config: FrameConfig) -> Self {
        let label = match read_fd {
            Some(_) => "pipes",
            None => "stream",
        };
        Self {
            reader: FrameReader::with_config(reader, config.clone()),
            writer: FrameWriter::with_config(writer, config),
            read_fd,
            label: label.to_string(),
            closed: false,
        }
    }

    fn fail<T>(&mut self, err: goridge_frame::FrameError) -> Result<T> {
        debug!(relay = %self.label, error = %err, "stream relay failed");
        self.closed = true;
        Err(err.into())
    }
}

impl<R: Read + AsFd, W: Write> StreamRelay<R, W> {
    /// Wrap a pollable pipe pair. Readiness is observed on `reader`.
    pub fn pipes(reader: R, writer: W) -> Self {
        let fd = reader.as_fd().as_raw_fd();
        Self::build(reader, writer, Some(fd), FrameConfig::default())
    }
}

impl<R, W> Relay for StreamRelay<R, W>
where
    R: Read + Send,
    W: Write + Send,
{
    fn send(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(TransportError::NotConnected(self.label.clone()));
        }
        match self.writer.write_frame(frame) {
            Ok(()) => Ok(()),
            Err(err) => self.fail(err),
        }
    }

    fn wait_frame(&mut self) -> Result<Frame> {
        if self.closed {
            return Err(TransportError::NotConnected(self.label.clone()));
        }
        match self.reader.read_frame() {
            Ok(frame) => Ok(frame),
            Err(err) => self.fail(err),
        }
    }

    fn has_frame(&self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        if self.reader.has_buffered_frame() {
            return Ok(true);
        }
        match self.borrowed_fd() {
            Some(fd) => Ok(sys::is_readable(fd)?),
            None => Ok(false),
        }
    }

    fn is_connected(&self) -> bool {
        if self.closed {
            return false;
        }
        match self.borrowed_fd() {
            Some(fd) => self.reader.has_buffered_frame() || !sys::peer_closed(fd),
            None => true,
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn kind(&self) -> RelayKind {
        match self.read_fd {
            Some(_) => RelayKind::Pipe,
            None => RelayKind::Stream,
        }
    }

    fn poll_handle(&self) -> PollHandle<'_> {
        if self.reader.has_buffered_frame() {
            return PollHandle::Buffered;
        }
        match self.borrowed_fd() {
            Some(fd) => PollHandle::Fd(fd),
            None => PollHandle::Unsupported,
        }
    }

    fn duplicate(&self) -> Result<Box<dyn Relay>> {
        Err(TransportError::NotDuplicable(self.label.clone()))
    }
}

impl<R, W> StreamRelay<R, W> {
    fn borrowed_fd(&self) -> Option<BorrowedFd<'_>> {
        // SAFETY: the descriptor was taken from `self.reader`, which owns it
        // for as long as `self` lives, and the borrow is tied to `&self`.
        self.read_fd.map(|fd| unsafe { BorrowedFd::borrow_raw(fd) })
    }
}

impl<R, W> fmt::Display for StreamRelay<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl<R, W> fmt::Debug for StreamRelay<R, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRelay")
            .field("label", &self.label)
            .field("pollable", &self.read_fd.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}
