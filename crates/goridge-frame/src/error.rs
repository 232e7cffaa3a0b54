/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The two length fields of the prefix disagree.
    #[error("invalid frame prefix (length {length} does not match check {check})")]
    Prefix { length: u64, check: u64 },

    /// The option block is malformed or too large.
    #[error("invalid frame options: {0}")]
    InvalidOptions(String),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl FrameError {
    /// True when the error means the byte stream itself is corrupt, as
    /// opposed to the channel failing underneath it.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            FrameError::Prefix { .. }
                | FrameError::InvalidOptions(_)
                | FrameError::PayloadTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
