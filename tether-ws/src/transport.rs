//! WebSocket transport implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tether::{Transport, TransportError, TransportEvent};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

use crate::error::WsError;
use crate::tls;

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Outbound {
    Text(String),
    Close(Option<Duration>),
}

/// One connection attempt and, once it succeeds, the live connection.
struct Connection {
    connected: Arc<AtomicBool>,
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
    // A close frame is queued; the task ends on its own once it is written.
    closing: bool,
}

impl Connection {
    fn is_handshaking(&self) -> bool {
        !self.closing && !self.connected.load(Ordering::SeqCst) && !self.task.is_finished()
    }
}

/// WebSocket transport driven by a tokio task per connection.
///
/// Must be opened from within a tokio runtime. Events go to the sender given
/// to [`WsTransport::new`] in the order they happen on the wire.
pub struct WsTransport {
    events: mpsc::UnboundedSender<TransportEvent>,
    connection: Option<Connection>,
}

impl WsTransport {
    pub fn new(events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            events,
            connection: None,
        }
    }

    fn abandon(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.connected.store(false, Ordering::SeqCst);
            connection.task.abort();
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        match self.connection.take() {
            Some(connection) if !connection.closing => connection.task.abort(),
            // Detached; the task writes the queued close frame and exits.
            _ => {}
        }
    }
}

impl Transport for WsTransport {
    fn open(&mut self, url: &Url, allow_self_signed: bool) -> tether::Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| WsError::NoRuntime)?;
        let connector = tls::connector(allow_self_signed).map_err(WsError::from)?;

        self.abandon();

        let connected = Arc::new(AtomicBool::new(false));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = runtime.spawn(run_connection(
            url.clone(),
            connector,
            connected.clone(),
            self.events.clone(),
            outbound_rx,
        ));

        self.connection = Some(Connection {
            connected,
            outbound: outbound_tx,
            task,
            closing: false,
        });
        Ok(())
    }

    fn close(&mut self, timeout: Option<Duration>) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        if !connection.connected.swap(false, Ordering::SeqCst) {
            // Still handshaking; nothing to close gracefully.
            self.abandon();
            return;
        }

        if connection.outbound.send(Outbound::Close(timeout)).is_ok() {
            connection.closing = true;
        } else {
            self.abandon();
        }
    }

    fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|c| c.connected.load(Ordering::SeqCst))
    }

    fn is_connecting(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_handshaking)
    }

    fn send_text(&mut self, text: String) -> tether::Result<()> {
        let connection = self
            .connection
            .as_ref()
            .filter(|c| c.connected.load(Ordering::SeqCst))
            .ok_or(TransportError::NotConnected)?;

        connection
            .outbound
            .send(Outbound::Text(text))
            .map_err(|_| TransportError::NotConnected)
    }
}

// ============================================================================
// Connection task
// ============================================================================

async fn run_connection(
    url: Url,
    connector: Option<tokio_tungstenite::Connector>,
    connected: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let connect =
        tokio_tungstenite::connect_async_tls_with_config(url.as_str(), None, true, connector);
    let stream = match connect.await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            debug!(%url, %err, "connect failed");
            let _ = events.send(TransportEvent::Close(Some(TransportError::from(
                WsError::from(err),
            ))));
            return;
        }
    };

    connected.store(true, Ordering::SeqCst);
    if events.send(TransportEvent::Open).is_err() {
        return;
    }

    let (mut write, mut read) = stream.split();

    let error = loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Outbound::Text(text)) => {
                    if let Err(err) = write.send(Message::Text(text)).await {
                        break Some(TransportError::from(WsError::from(err)));
                    }
                }
                Some(Outbound::Close(timeout)) => {
                    close_gracefully(&mut write, &mut read, timeout).await;
                    break None;
                }
                None => break None,
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Text(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    let _ = events.send(TransportEvent::Binary(data));
                }
                Some(Ok(Message::Close(frame))) => break close_error(frame),
                Some(Ok(other)) => trace!(?other, "control frame"),
                Some(Err(err)) => break Some(TransportError::from(WsError::from(err))),
                None => break Some(TransportError::io("connection reset")),
            },
        }
    };

    connected.store(false, Ordering::SeqCst);
    let _ = events.send(TransportEvent::Close(error));
}

/// Send a close frame and wait up to `timeout` for the peer's.
async fn close_gracefully(
    write: &mut SplitSink<Stream, Message>,
    read: &mut SplitStream<Stream>,
    timeout: Option<Duration>,
) {
    if write.send(Message::Close(None)).await.is_err() {
        return;
    }
    let Some(timeout) = timeout else {
        return;
    };

    let acknowledged = async {
        while let Some(Ok(message)) = read.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    };
    if tokio::time::timeout(timeout, acknowledged).await.is_err() {
        debug!(?timeout, "peer did not acknowledge close");
    }
}

/// `None` for a normal closure.
fn close_error(frame: Option<CloseFrame<'static>>) -> Option<TransportError> {
    let frame = frame?;
    if frame.code == CloseCode::Normal {
        return None;
    }
    Some(TransportError::closed(
        u16::from(frame.code),
        frame.reason.into_owned(),
    ))
}
