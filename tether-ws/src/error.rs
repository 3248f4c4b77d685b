//! Error types for tether-ws.

use tether::TransportError;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

pub type Result<T> = std::result::Result<T, WsError>;

#[derive(Error, Debug)]
pub enum WsError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("no tokio runtime to run the connection on")]
    NoRuntime,
}

impl From<WsError> for TransportError {
    fn from(err: WsError) -> Self {
        match err {
            WsError::WebSocket(tungstenite::Error::Io(e)) => TransportError::io(e),
            WsError::WebSocket(tungstenite::Error::Tls(e)) => TransportError::Tls(e.to_string()),
            WsError::WebSocket(
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
            ) => TransportError::NotConnected,
            WsError::WebSocket(e) => TransportError::connect(e),
            WsError::Tls(e) => TransportError::Tls(e.to_string()),
            WsError::NoRuntime => TransportError::connect("no tokio runtime"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err: TransportError = WsError::from(tungstenite::Error::Io(io_err)).into();
        assert!(matches!(err, TransportError::Io(reason) if reason.contains("refused")));
    }

    #[test]
    fn test_closed_maps_to_not_connected() {
        let err: TransportError = WsError::from(tungstenite::Error::AlreadyClosed).into();
        assert_eq!(err, TransportError::NotConnected);
    }
}
