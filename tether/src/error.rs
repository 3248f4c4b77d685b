//! Error types for tether.

use thiserror::Error;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Client-local request errors.
///
/// These never cross the transport boundary. They are delivered only through
/// the callback attached to the request that caused them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No live transport.
    #[error("Not connected to server")]
    NotConnected,

    /// Outbound payload could not be encoded.
    #[error("Payload serialization failed: {0}")]
    PayloadSerializationFailed(String),

    /// Inbound reply payload did not match the expected shape.
    #[error("Response deserialization failed: {0}")]
    ResponseDeserializationFailed(String),

    /// Send attempted on a channel that is not currently joined.
    #[error("Channel not joined")]
    ChannelNotJoined,

    /// The connection dropped while the request was still pending.
    #[error("Connection closed before a reply arrived")]
    Disconnected,
}

impl ClientError {
    pub fn serialization(reason: impl std::fmt::Display) -> Self {
        Self::PayloadSerializationFailed(reason.to_string())
    }

    pub fn deserialization(reason: impl std::fmt::Display) -> Self {
        Self::ResponseDeserializationFailed(reason.to_string())
    }
}

/// Errors reported by a transport.
///
/// Clonable so the same error can be stored in every channel status that a
/// disconnect touches.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection attempt failed.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// TLS setup failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Reading or writing the connection failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The peer closed the connection.
    #[error("Connection closed by peer (code {code}): {reason}")]
    Closed { code: u16, reason: String },

    /// Operation requires a live connection.
    #[error("Not connected")]
    NotConnected,
}

impl TransportError {
    pub fn connect(reason: impl std::fmt::Display) -> Self {
        Self::Connect(reason.to_string())
    }

    pub fn io(reason: impl std::fmt::Display) -> Self {
        Self::Io(reason.to_string())
    }

    pub fn closed(code: u16, reason: impl Into<String>) -> Self {
        Self::Closed {
            code,
            reason: reason.into(),
        }
    }
}

/// Envelope encoding and decoding errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The envelope could not be written as JSON.
    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// The text is not a well-formed envelope.
    #[error("Decode error: {0}")]
    Decode(#[source] serde_json::Error),
}

impl From<CodecError> for ClientError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Encode(e) => Self::serialization(e),
            CodecError::Decode(e) => Self::deserialization(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_maps_to_client_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ClientError = CodecError::Decode(json_err).into();
        assert!(matches!(err, ClientError::ResponseDeserializationFailed(_)));
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::closed(1000, "bye");
        assert_eq!(err.to_string(), "Connection closed by peer (code 1000): bye");
    }
}
