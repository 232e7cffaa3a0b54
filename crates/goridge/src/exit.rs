use std::fmt;
use std::io;

use goridge_frame::FrameError;
use goridge_relay::TransportError;
use goridge_rpc::RpcError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const PROTOCOL_ERROR: i32 = 65;
pub const SERVICE_ERROR: i32 = 70;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        _ => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { address, source } => {
            io_error(&format!("{context}: {address}"), source)
        }
        TransportError::Io(source) => io_error(context, source),
        TransportError::Frame(FrameError::Io(source)) => io_error(context, source),
        TransportError::InvalidConnection { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other if other.is_integrity() => {
            CliError::new(PROTOCOL_ERROR, format!("{context}: {other}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn rpc_error(context: &str, err: RpcError) -> CliError {
    match err {
        RpcError::Transport(err) => transport_error(context, err),
        RpcError::Codec(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        RpcError::Service { .. } => CliError::new(SERVICE_ERROR, format!("{context}: {err}")),
        RpcError::Config(_) => CliError::new(USAGE, format!("{context}: {err}")),
        RpcError::NoRelays => CliError::new(FAILURE, format!("{context}: {err}")),
        other if other.is_protocol() => {
            CliError::new(PROTOCOL_ERROR, format!("{context}: {other}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
