use std::fmt;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use goridge_frame::{Frame, FrameConfig, FrameReader, FrameWriter, DEFAULT_MAX_PAYLOAD};
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::sys;
use crate::traits::{PollHandle, Relay, RelayKind};

/// Where a [`SocketRelay`] connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketAddress {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketAddress::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            SocketAddress::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Socket relay configuration.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Timeout for establishing a TCP connection. Unix sockets connect
    /// without a timeout.
    pub connect_timeout: Option<Duration>,
    /// Read timeout applied to the connected socket.
    pub read_timeout: Option<Duration>,
    /// Write timeout applied to the connected socket.
    pub write_timeout: Option<Duration>,
    /// Maximum frame body size in either direction.
    pub max_payload_size: usize,
    /// Disable Nagle's algorithm on TCP connections.
    pub nodelay: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(5)),
            read_timeout: None,
            write_timeout: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            nodelay: true,
        }
    }
}

impl SocketConfig {
    fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        }
    }
}

/// A connected socket stream of either family.
enum SocketStream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Read for SocketStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            SocketStream::Tcp(stream) => stream.read(buf),
            SocketStream::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for SocketStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            SocketStream::Tcp(stream) => stream.write(buf),
            SocketStream::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            SocketStream::Tcp(stream) => stream.flush(),
            SocketStream::Unix(stream) => stream.flush(),
        }
    }
}

impl AsFd for SocketStream {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            SocketStream::Tcp(stream) => stream.as_fd(),
            SocketStream::Unix(stream) => stream.as_fd(),
        }
    }
}

impl SocketStream {
    fn set_timeouts(&self, config: &FrameConfig) -> std::io::Result<()> {
        match self {
            SocketStream::Tcp(stream) => {
                stream.set_read_timeout(config.read_timeout)?;
                stream.set_write_timeout(config.write_timeout)
            }
            SocketStream::Unix(stream) => {
                stream.set_read_timeout(config.read_timeout)?;
                stream.set_write_timeout(config.write_timeout)
            }
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    fn try_clone(&self) -> std::io::Result<Self> {
        match self {
            SocketStream::Tcp(stream) => stream.try_clone().map(SocketStream::Tcp),
            SocketStream::Unix(stream) => stream.try_clone().map(SocketStream::Unix),
        }
    }

    fn shutdown(&self) {
        let _ = match self {
            SocketStream::Tcp(stream) => stream.shutdown(Shutdown::Both),
            SocketStream::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
    }
}

struct Connection {
    reader: FrameReader<SocketStream>,
    writer: FrameWriter<SocketStream>,
}

impl Connection {
    fn open(stream: SocketStream, config: &SocketConfig) -> std::io::Result<Self> {
        let frame_config = config.frame_config();
        stream.set_timeouts(&frame_config)?;
        let reader_stream = stream.try_clone()?;
        Ok(Self {
            reader: FrameReader::with_config(reader_stream, frame_config.clone()),
            writer: FrameWriter::with_config(stream, frame_config),
        })
    }
}

/// Relay over a TCP or Unix domain socket.
///
/// The connection is opened lazily on the first `send` (or an explicit
/// `connect`). Any read or write failure drops it, and the next `send`
/// reconnects.
pub struct SocketRelay {
    address: Option<SocketAddress>,
    config: SocketConfig,
    conn: Option<Connection>,
}

impl SocketRelay {
    /// Create an unconnected relay for `address`.
    pub fn new(address: SocketAddress) -> Self {
        Self {
            address: Some(address),
            config: SocketConfig::default(),
            conn: None,
        }
    }

    /// Unconnected TCP relay.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(SocketAddress::Tcp {
            host: host.into(),
            port,
        })
    }

    /// Unconnected Unix domain socket relay.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::new(SocketAddress::Unix(path.into()))
    }

    /// Wrap an already-connected Unix stream. Such a relay cannot reconnect
    /// or be duplicated.
    pub fn from_unix_stream(stream: UnixStream) -> Result<Self> {
        Self::from_stream(SocketStream::Unix(stream), SocketConfig::default())
    }

    /// Wrap an already-connected TCP stream. Such a relay cannot reconnect
    /// or be duplicated.
    pub fn from_tcp_stream(stream: TcpStream) -> Result<Self> {
        Self::from_stream(SocketStream::Tcp(stream), SocketConfig::default())
    }

    fn from_stream(stream: SocketStream, config: SocketConfig) -> Result<Self> {
        let conn = Connection::open(stream, &config)?;
        Ok(Self {
            address: None,
            config,
            conn: Some(conn),
        })
    }

    /// Override the socket configuration. Applies to the next connection.
    pub fn with_config(mut self, config: SocketConfig) -> Self {
        self.config = config;
        self
    }

    /// The endpoint this relay connects to, if it owns one.
    pub fn address(&self) -> Option<&SocketAddress> {
        self.address.as_ref()
    }

    /// Current socket configuration.
    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    fn open(&self, address: &SocketAddress) -> Result<SocketStream> {
        let connect_err = |source: std::io::Error| TransportError::Connect {
            address: address.to_string(),
            source,
        };

        match address {
            SocketAddress::Tcp { host, port } => {
                let stream = match self.config.connect_timeout {
                    Some(timeout) => connect_tcp_timeout(host, *port, timeout),
                    None => TcpStream::connect((host.as_str(), *port)),
                }
                .map_err(connect_err)?;
                stream.set_nodelay(self.config.nodelay).map_err(connect_err)?;
                Ok(SocketStream::Tcp(stream))
            }
            SocketAddress::Unix(path) => UnixStream::connect(path)
                .map(SocketStream::Unix)
                .map_err(connect_err),
        }
    }

    /// Drop the connection after a failed read or write.
    fn fail<T>(&mut self, err: goridge_frame::FrameError) -> Result<T> {
        debug!(relay = %self, error = %err, "dropping socket connection");
        self.close();
        Err(err.into())
    }
}

fn connect_tcp_timeout(host: &str, port: u16, timeout: Duration) -> std::io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "host did not resolve to any address",
        )
    }))
}

impl Relay for SocketRelay {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        self.connect()?;
        let Some(conn) = self.conn.as_mut() else {
            return Err(TransportError::NotConnected(self.to_string()));
        };
        match conn.writer.write_frame(frame) {
            Ok(()) => Ok(()),
            Err(err) => self.fail(err),
        }
    }

    fn wait_frame(&mut self) -> Result<Frame> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(TransportError::NotConnected(self.to_string()));
        };
        match conn.reader.read_frame() {
            Ok(frame) => {
                trace!(relay = %self, options = ?frame.options, "received frame");
                Ok(frame)
            }
            Err(err) => self.fail(err),
        }
    }

    fn has_frame(&self) -> Result<bool> {
        let Some(conn) = self.conn.as_ref() else {
            return Ok(false);
        };
        if conn.reader.has_buffered_frame() {
            return Ok(true);
        }
        Ok(sys::is_readable(conn.reader.get_ref().as_fd())?)
    }

    fn is_connected(&self) -> bool {
        match self.conn.as_ref() {
            Some(conn) => {
                conn.reader.has_buffered_frame()
                    || !sys::peer_closed(conn.reader.get_ref().as_fd())
            }
            None => false,
        }
    }

    fn connect(&mut self) -> Result<()> {
        if self.conn.is_some() {
            return Ok(());
        }
        let Some(address) = self.address.as_ref() else {
            return Err(TransportError::NotConnected(self.to_string()));
        };

        let stream = self.open(address)?;
        let conn = Connection::open(stream, &self.config).map_err(|source| {
            TransportError::Connect {
                address: address.to_string(),
                source,
            }
        })?;
        debug!(address = %address, "relay connected");
        self.conn = Some(conn);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.writer.get_ref().shutdown();
            debug!(relay = %self, "relay closed");
        }
    }

    fn kind(&self) -> RelayKind {
        RelayKind::Socket
    }

    fn poll_handle(&self) -> PollHandle<'_> {
        match self.conn.as_ref() {
            None => PollHandle::Unconnected,
            Some(conn) if conn.reader.has_buffered_frame() => PollHandle::Buffered,
            Some(conn) => PollHandle::Fd(conn.reader.get_ref().as_fd()),
        }
    }

    fn duplicate(&self) -> Result<Box<dyn Relay>> {
        match &self.address {
            Some(address) => Ok(Box::new(
                SocketRelay::new(address.clone()).with_config(self.config.clone()),
            )),
            None => Err(TransportError::NotDuplicable(self.to_string())),
        }
    }
}

impl fmt::Display for SocketRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            Some(address) => write!(f, "{address}"),
            None => f.write_str("socket"),
        }
    }
}

impl fmt::Debug for SocketRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketRelay")
            .field("address", &self.address)
            .field("connected", &self.conn.is_some())
            .finish()
    }
}

impl Drop for SocketRelay {
    fn drop(&mut self) {
        self.close();
    }
}
