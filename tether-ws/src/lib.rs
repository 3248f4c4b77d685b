//! WebSocket transport for tether sessions.
//!
//! [`WsTransport`] runs each connection in its own tokio task and reports to
//! the session through an unbounded channel of [`TransportEvent`]s.
//! [`spawn`] wires a transport, a session and its driver together.

mod error;
mod tls;
mod transport;

pub use error::{Result, WsError};
pub use transport::WsTransport;

use tether::{driver, Session, SessionConfig, SessionHandle, TransportEvent};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Start a driver for a WebSocket session. Nothing connects until
/// [`SessionHandle::connect`] is called.
pub fn spawn(config: SessionConfig) -> (SessionHandle, JoinHandle<()>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel::<TransportEvent>();
    let session = Session::new(config, WsTransport::new(events_tx));
    driver::spawn(session, events_rx)
}
