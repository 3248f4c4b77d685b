//! Tokio task that owns a [`Session`].
//!
//! The session itself never blocks or sleeps. [`spawn`] moves it into a task
//! that feeds it transport events, fires its timers at
//! [`Session::next_deadline`], and applies commands sent through a
//! [`SessionHandle`]. All session state is touched from that one task.

use std::future::Future;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::error::ClientError;
use crate::reply::Reply;
use crate::session::{RequestCallback, Session};
use crate::timer::Clock;
use crate::transport::{Transport, TransportEvent};

enum Command {
    Connect {
        auto_reconnect: Option<bool>,
        reconnect_interval: Option<Duration>,
    },
    Disconnect(Option<Duration>),
    Join(Channel),
    Leave(Channel),
    Send {
        channel: Channel,
        event: String,
        payload: Result<Value, ClientError>,
        callback: RequestCallback,
    },
    Shutdown,
}

/// Cloneable handle to a session running in a driver task.
///
/// Every method returns immediately. Commands are applied in the order they
/// were issued, interleaved with transport events and timers.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

/// Move `session` into a new task fed by `events`.
///
/// `events` is the receiving end of whatever the session's transport reports
/// to. The task ends on [`SessionHandle::shutdown`] or once every handle is
/// dropped, closing the transport on the way out. The session's clock must
/// track real time.
pub fn spawn<T, C>(
    session: Session<T, C>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
) -> (SessionHandle, JoinHandle<()>)
where
    T: Transport + Send + 'static,
    C: Clock + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(session, rx, events));
    (SessionHandle { commands: tx }, task)
}

async fn run<T, C>(
    mut session: Session<T, C>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) where
    T: Transport,
    C: Clock,
{
    loop {
        let deadline = session.next_deadline();

        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => break,
                Some(command) => apply(&mut session, command),
            },
            Some(event) = events.recv() => session.handle_event(event),
            _ = sleep_until(deadline) => session.poll_timers(),
        }
    }

    debug!("session driver stopping");
    session.disconnect(None);
}

fn apply<T: Transport, C: Clock>(session: &mut Session<T, C>, command: Command) {
    match command {
        Command::Connect {
            auto_reconnect,
            reconnect_interval,
        } => {
            let auto_reconnect = auto_reconnect.unwrap_or(session.config().auto_reconnect);
            let interval = reconnect_interval.unwrap_or(session.config().reconnect_interval);
            if let Err(err) = session.connect_with(auto_reconnect, interval) {
                warn!(%err, "connect failed");
            }
        }
        Command::Disconnect(timeout) => session.disconnect(timeout),
        Command::Join(channel) => session.join(&channel),
        Command::Leave(channel) => session.leave(&channel),
        Command::Send {
            channel,
            event,
            payload,
            callback,
        } => session.send_raw(&channel, &event, payload, callback),
        Command::Shutdown => {}
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

impl SessionHandle {
    /// Connect using the configured reconnect policy.
    pub fn connect(&self) {
        self.command(Command::Connect {
            auto_reconnect: None,
            reconnect_interval: None,
        });
    }

    /// Connect with an explicit reconnect policy.
    pub fn connect_with(&self, auto_reconnect: bool, reconnect_interval: Duration) {
        self.command(Command::Connect {
            auto_reconnect: Some(auto_reconnect),
            reconnect_interval: Some(reconnect_interval),
        });
    }

    pub fn disconnect(&self, timeout: Option<Duration>) {
        self.command(Command::Disconnect(timeout));
    }

    pub fn join(&self, channel: &Channel) {
        self.command(Command::Join(channel.clone()));
    }

    pub fn leave(&self, channel: &Channel) {
        self.command(Command::Leave(channel.clone()));
    }

    /// Send a request; `callback` runs once on the driver task.
    ///
    /// If the driver is gone the callback runs right away with
    /// [`ClientError::NotConnected`].
    pub fn send<P, R, F>(&self, channel: &Channel, event: &str, payload: &P, callback: F)
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned + 'static,
        F: FnOnce(Result<Reply<R>, ClientError>) + Send + 'static,
    {
        let payload = serde_json::to_value(payload).map_err(ClientError::serialization);
        let callback: RequestCallback =
            Box::new(move |result| callback(result.and_then(Reply::from_payload)));

        let command = Command::Send {
            channel: channel.clone(),
            event: event.to_string(),
            payload,
            callback,
        };

        if let Err(mpsc::error::SendError(command)) = self.commands.send(command) {
            if let Command::Send { callback, .. } = command {
                callback(Err(ClientError::NotConnected));
            }
        }
    }

    /// Send a request and wait for its reply.
    ///
    /// There is no timeout of its own; the future resolves when the reply
    /// arrives or the connection drops. Wrap it in `tokio::time::timeout` to
    /// bound the wait.
    pub fn request<P, R>(
        &self,
        channel: &Channel,
        event: &str,
        payload: &P,
    ) -> impl Future<Output = Result<Reply<R>, ClientError>> + Send + 'static
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.send(channel, event, payload, move |result: Result<Reply<R>, _>| {
            let _ = tx.send(result);
        });
        async move { rx.await.unwrap_or(Err(ClientError::Disconnected)) }
    }

    /// Stop the driver task, closing the transport.
    pub fn shutdown(&self) {
        self.command(Command::Shutdown);
    }

    /// Whether the driver task is still accepting commands.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("session driver is gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::envelope::{event, Envelope, Vsn};
    use crate::error::TransportError;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use url::Url;

    /// Opens immediately and forwards every frame it is asked to send.
    struct Wire {
        connected: bool,
        events: mpsc::UnboundedSender<TransportEvent>,
        outbound: mpsc::UnboundedSender<String>,
    }

    impl Transport for Wire {
        fn open(&mut self, _url: &Url, _allow_self_signed: bool) -> crate::error::Result<()> {
            self.connected = true;
            let _ = self.events.send(TransportEvent::Open);
            Ok(())
        }

        fn close(&mut self, _timeout: Option<Duration>) {
            self.connected = false;
            let _ = self.events.send(TransportEvent::Close(None));
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn send_text(&mut self, text: String) -> crate::error::Result<()> {
            if !self.connected {
                return Err(TransportError::NotConnected);
            }
            let _ = self.outbound.send(text);
            Ok(())
        }
    }

    fn start() -> (
        SessionHandle,
        JoinHandle<()>,
        mpsc::UnboundedSender<TransportEvent>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let wire = Wire {
            connected: false,
            events: events_tx.clone(),
            outbound: out_tx,
        };
        let config = SessionConfig::builder().auto_reconnect(false).build();
        let (handle, task) = spawn(Session::new(config, wire), events_rx);
        (handle, task, events_tx, out_rx)
    }

    fn reply_to(request: &Envelope, payload: Value) -> TransportEvent {
        let envelope = Envelope::new(request.topic.clone(), event::REPLY)
            .with_payload(payload)
            .with_reference(request.reference.clone().unwrap());
        TransportEvent::Text(envelope.encode(Vsn::V1).unwrap())
    }

    async fn joined(channel: &Channel) {
        while !channel.is_joined() {
            tokio::task::yield_now().await;
        }
    }

    async fn next_frame(out: &mut mpsc::UnboundedReceiver<String>) -> Envelope {
        let text = out.recv().await.unwrap();
        Envelope::decode(&text, Vsn::V1).unwrap()
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let (handle, _task, events, mut out) = start();
        let room = Channel::new("room:1");

        handle.join(&room);
        handle.connect();

        let join = next_frame(&mut out).await;
        assert_eq!(join.event, event::JOIN);
        events
            .send(reply_to(&join, json!({"status": "ok", "response": {}})))
            .unwrap();
        joined(&room).await;

        let pending = handle.request::<_, Value>(&room, "ping", &json!({"n": 1}));
        let request = next_frame(&mut out).await;
        assert_eq!(request.event, "ping");
        events
            .send(reply_to(&request, json!({"status": "ok", "response": {"n": 2}})))
            .unwrap();

        let reply = pending.await.unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.response, json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_request_before_join_fails() {
        let (handle, _task, _events, _out) = start();
        let room = Channel::new("room:1");

        handle.connect();
        let result = handle
            .request::<_, Value>(&room, "ping", &json!({}))
            .await;
        assert_eq!(result.unwrap_err(), ClientError::ChannelNotJoined);
    }

    #[tokio::test]
    async fn test_close_fails_pending_request() {
        let (handle, _task, events, mut out) = start();
        let room = Channel::new("room:1");

        handle.join(&room);
        handle.connect();
        let join = next_frame(&mut out).await;
        events
            .send(reply_to(&join, json!({"status": "ok", "response": {}})))
            .unwrap();
        joined(&room).await;

        let pending = handle.request::<_, Value>(&room, "ping", &json!({}));
        let _ = next_frame(&mut out).await;
        events.send(TransportEvent::Close(None)).unwrap();

        assert_eq!(pending.await.unwrap_err(), ClientError::Disconnected);
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let (handle, task, _events, _out) = start();
        handle.shutdown();
        task.await.unwrap();
        assert!(!handle.is_running());

        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        handle.send(
            &Channel::new("room:1"),
            "ping",
            &json!({}),
            move |result: Result<Reply<Value>, _>| {
                *sink.lock().unwrap() = Some(result.unwrap_err());
            },
        );
        assert_eq!(*seen.lock().unwrap(), Some(ClientError::NotConnected));
    }
}
