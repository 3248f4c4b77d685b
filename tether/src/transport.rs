//! Transport contract.

use std::time::Duration;

use url::Url;

use crate::error::Result;

/// Something that happened on the transport.
///
/// Transports report these to their host, which hands them to
/// [`Session::handle_event`](crate::Session::handle_event) in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established.
    Open,
    /// The connection is gone. `None` for a clean close.
    Close(Option<crate::TransportError>),
    /// A text frame arrived.
    Text(String),
    /// A binary frame arrived.
    Binary(Vec<u8>),
}

/// Message transport owned by a session.
///
/// None of these calls may block. `open` starts a connection attempt and
/// reports the outcome later as [`TransportEvent::Open`] or
/// [`TransportEvent::Close`]. Calling `open` while an attempt is in flight
/// abandons that attempt, so the session does not reconnect while
/// [`is_connecting`](Transport::is_connecting) holds.
pub trait Transport {
    /// Start connecting to `url`.
    fn open(&mut self, url: &Url, allow_self_signed: bool) -> Result<()>;

    /// Close the connection, waiting at most `timeout` for the peer to
    /// acknowledge before dropping it.
    fn close(&mut self, timeout: Option<Duration>);

    /// Whether the connection is established and writable.
    fn is_connected(&self) -> bool;

    /// Whether an `open` is still in flight and has not reported its outcome.
    fn is_connecting(&self) -> bool {
        false
    }

    /// Queue a text frame.
    fn send_text(&mut self, text: String) -> Result<()>;
}
