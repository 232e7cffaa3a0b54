use goridge_frame::FrameError;

/// Errors that can occur in relay operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the specified address.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    /// An I/O error occurred outside of frame reading/writing.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reading or writing a frame failed.
    #[error("{0}")]
    Frame(#[from] FrameError),

    /// The relay has no open connection and cannot open one.
    #[error("relay {0} is not connected")]
    NotConnected(String),

    /// The relay's peer went away while a response was outstanding.
    #[error("relay {0} disconnected")]
    Disconnected(String),

    /// The connection string could not be understood.
    #[error("invalid connection string '{connection}': {reason}")]
    InvalidConnection { connection: String, reason: String },

    /// The relay has no endpoint a fresh handle could be opened to.
    #[error("relay {0} cannot be duplicated")]
    NotDuplicable(String),

    /// Pollable and non-pollable relays were passed to one readiness check.
    #[error("cannot multiplex relays of different kinds")]
    MixedRelayKinds,
}

impl TransportError {
    /// True when the failure means the byte stream is corrupt rather than
    /// the channel being broken.
    pub fn is_integrity(&self) -> bool {
        matches!(self, TransportError::Frame(err) if err.is_integrity())
    }

    pub(crate) fn invalid_connection(connection: &str, reason: impl Into<String>) -> Self {
        TransportError::InvalidConnection {
            connection: connection.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
