//! Tether: client sessions for Phoenix-style channel servers.
//!
//! A [`Session`] multiplexes any number of topic [`Channel`]s over one
//! message transport. It joins channels when the transport opens, routes
//! incoming pushes to channel handlers, correlates replies with requests,
//! keeps the connection alive with heartbeats, and retries the transport on
//! a fixed interval.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tether::{driver, Channel, Session, SessionConfig};
//! use tether_ws::WsTransport;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
//!     let config = SessionConfig::builder()
//!         .endpoint("wss://example.com/socket/websocket")
//!         .param("token", "secret")
//!         .build();
//!
//!     let session = Session::new(config, WsTransport::new(events_tx));
//!     let (handle, _task) = driver::spawn(session, events_rx);
//!
//!     let lobby = Channel::new("room:lobby");
//!     lobby.on_event(|envelope| println!("{} {}", envelope.event, envelope.payload));
//!
//!     handle.join(&lobby);
//!     handle.connect();
//!
//!     let reply = handle
//!         .request::<_, serde_json::Value>(&lobby, "new_msg", &serde_json::json!({"body": "hi"}))
//!         .await;
//!     println!("{reply:?}");
//! }
//! ```
//!
//! The session itself is runtime-agnostic. [`driver`] runs it on tokio; any
//! other host can feed [`Session::handle_event`] and call
//! [`Session::poll_timers`] at [`Session::next_deadline`].

pub mod channel;
pub mod config;
pub mod correlator;
pub mod driver;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod reply;
pub mod session;
#[cfg(feature = "telemetry")]
pub mod telemetry;
pub mod timer;
pub mod transport;

pub use channel::{Channel, ChannelStatus, EventHandler};
pub use config::{SessionConfig, SessionConfigBuilder};
pub use driver::SessionHandle;
pub use envelope::{event, Envelope, Vsn, HEARTBEAT_TOPIC};
pub use error::{ClientError, CodecError, Result, TransportError};
pub use reply::{Reply, ReplyStatus};
pub use session::{CloseHook, OpenHook, Session};
pub use timer::{Clock, RecurringTimer, SystemClock};
pub use transport::{Transport, TransportEvent};
