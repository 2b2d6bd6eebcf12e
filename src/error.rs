// MIT License - Copyright (c) 2026 Peter Wright
// Relay client errors

use std::time::Duration;

/// All errors that can occur in the relay client.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Socket-level failure: refused, reset, DNS resolution, broken pipe.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection timeout")]
    ConnectionTimeout,

    /// No length prefix arrived within the idle window.
    #[error("No data from relay for {}s", .0.as_secs())]
    IdleTimeout(Duration),

    /// A length prefix arrived but the body did not follow in time.
    #[error("Frame body not received within {}s", .0.as_secs())]
    ReadTimeout(Duration),

    #[error("Write not completed within {}s", .0.as_secs())]
    WriteTimeout(Duration),

    /// The stream ended part way through a frame.
    #[error("Connection closed by relay")]
    ConnectionClosed,

    /// The frame failed AES-GCM tag verification or was too short to hold
    /// a nonce and tag.
    #[error("Frame failed authentication (wrong secret or corrupted data)")]
    Authentication,

    #[error("Encryption failed")]
    Encryption,

    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Malformed message: {details}")]
    MalformedMessage { details: String },

    #[error("Key derivation failed: {reason}")]
    KeyDerivation { reason: String },

    #[error("Not connected to relay")]
    NotConnected,

    #[error("Cancelled")]
    Cancelled,
}

impl RelayError {
    /// Whether the supervisor should tear down and reconnect after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::Io(_)
                | RelayError::ConnectionTimeout
                | RelayError::IdleTimeout(_)
                | RelayError::ReadTimeout(_)
                | RelayError::WriteTimeout(_)
                | RelayError::ConnectionClosed
                | RelayError::Authentication
                | RelayError::FrameTooLarge { .. }
        )
    }

    /// Whether this error only affects a single message and must be dropped
    /// without touching the connection.
    pub fn is_message_level(&self) -> bool {
        matches!(self, RelayError::MalformedMessage { .. })
    }

    pub(crate) fn malformed(details: impl Into<String>) -> Self {
        RelayError::MalformedMessage {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
