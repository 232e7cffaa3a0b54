//! Build relays from connection strings.
//!
//! Supported forms:
//! - `tcp://host:port`
//! - `unix:///path/to/socket` (or `unix://relative.sock`)
//! - `pipes://stdin:stdout`, where each side is one of `stdin`, `stdout`,
//!   `stderr`
//!
//! Scheme and pipe names are case-insensitive.

use std::fs::File;
use std::io;
use std::os::fd::AsFd;
use std::path::PathBuf;

use crate::error::{Result, TransportError};
use crate::socket::{SocketAddress, SocketRelay};
use crate::stream::StreamRelay;
use crate::traits::Relay;

/// A standard stream of the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdPipe {
    Stdin,
    Stdout,
    Stderr,
}

impl StdPipe {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "stdin" => Some(StdPipe::Stdin),
            "stdout" => Some(StdPipe::Stdout),
            "stderr" => Some(StdPipe::Stderr),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StdPipe::Stdin => "stdin",
            StdPipe::Stdout => "stdout",
            StdPipe::Stderr => "stderr",
        }
    }

    /// Open an owned handle onto the stream's descriptor.
    fn open(self) -> io::Result<File> {
        let fd = match self {
            StdPipe::Stdin => io::stdin().as_fd().try_clone_to_owned()?,
            StdPipe::Stdout => io::stdout().as_fd().try_clone_to_owned()?,
            StdPipe::Stderr => io::stderr().as_fd().try_clone_to_owned()?,
        };
        Ok(File::from(fd))
    }
}

/// A parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Socket(SocketAddress),
    /// Read frames from `input`, write frames to `output`.
    Pipes { input: StdPipe, output: StdPipe },
}

/// Parse a connection string without opening anything.
pub fn parse(connection: &str) -> Result<Endpoint> {
    let Some((scheme, rest)) = connection.split_once("://") else {
        return Err(TransportError::invalid_connection(
            connection,
            "expected <scheme>://<address>",
        ));
    };

    match scheme.to_ascii_lowercase().as_str() {
        "tcp" => parse_tcp(connection, rest),
        "unix" => {
            if rest.is_empty() {
                return Err(TransportError::invalid_connection(
                    connection,
                    "socket path is empty",
                ));
            }
            Ok(Endpoint::Socket(SocketAddress::Unix(PathBuf::from(rest))))
        }
        "pipes" => {
            let Some((input, output)) = rest.split_once(':') else {
                return Err(TransportError::invalid_connection(
                    connection,
                    "expected pipes://<input>:<output>",
                ));
            };
            let pipe = |name: &str| {
                StdPipe::parse(name).ok_or_else(|| {
                    TransportError::invalid_connection(
                        connection,
                        format!("unknown pipe '{name}', expected stdin, stdout or stderr"),
                    )
                })
            };
            Ok(Endpoint::Pipes {
                input: pipe(input)?,
                output: pipe(output)?,
            })
        }
        other => Err(TransportError::invalid_connection(
            connection,
            format!("unsupported scheme '{other}'"),
        )),
    }
}

fn parse_tcp(connection: &str, rest: &str) -> Result<Endpoint> {
    let Some((host, port)) = rest.rsplit_once(':') else {
        return Err(TransportError::invalid_connection(
            connection,
            "expected tcp://<host>:<port>",
        ));
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(TransportError::invalid_connection(connection, "host is empty"));
    }
    let port: u16 = port.parse().map_err(|_| {
        TransportError::invalid_connection(connection, format!("invalid port '{port}'"))
    })?;

    Ok(Endpoint::Socket(SocketAddress::Tcp {
        host: host.to_string(),
        port,
    }))
}

/// Create an unconnected relay for a connection string.
///
/// Socket relays connect on first use. Pipe relays wrap duplicated handles
/// of this process's standard streams.
pub fn create(connection: &str) -> Result<Box<dyn Relay>> {
    match parse(connection)? {
        Endpoint::Socket(address) => Ok(Box::new(SocketRelay::new(address))),
        Endpoint::Pipes { input, output } => {
            let reader = input.open()?;
            let writer = output.open()?;
            let label = format!("pipes://{}:{}", input.name(), output.name());
            Ok(Box::new(StreamRelay::pipes(reader, writer).with_label(label)))
        }
    }
}
