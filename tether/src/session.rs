//! Session manager.
//!
//! A [`Session`] owns one transport and multiplexes any number of
//! [`Channel`]s over it. It is a plain state machine: transport activity comes
//! in through [`Session::handle_event`], time comes in through
//! [`Session::poll_timers`], and nothing inside blocks or spawns.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::channel::{Channel, ChannelStatus};
use crate::config::SessionConfig;
use crate::correlator::{
    heartbeat_reference, is_heartbeat_reference, next_reference, Correlator, Pending,
};
use crate::envelope::{event, Envelope, HEARTBEAT_TOPIC};
use crate::error::{ClientError, TransportError};
use crate::reply::Reply;
use crate::timer::{Clock, RecurringTimer, SystemClock};
use crate::transport::{Transport, TransportEvent};

/// Callback for an application request, receiving the raw reply payload.
pub(crate) type RequestCallback = Box<dyn FnOnce(Result<Value, ClientError>) + Send>;

/// Called when the transport opens.
pub type OpenHook = Box<dyn FnMut() + Send>;

/// Called when the transport closes, with the error if the close was not clean.
pub type CloseHook = Box<dyn FnMut(Option<&TransportError>) + Send>;

/// What a pending reference is waiting for.
enum PendingReply {
    Join(Channel),
    Leave(Channel),
    Request(RequestCallback),
}

impl Pending for PendingReply {
    fn fail(self, error: ClientError) {
        match self {
            PendingReply::Request(callback) => callback(Err(error)),
            // The disconnect transition has already moved the channel.
            PendingReply::Join(_) => {}
            // The server side of a channel we asked to leave is gone either way.
            PendingReply::Leave(channel) => {
                channel.mark_disconnected(None);
            }
        }
    }
}

/// Client session multiplexing channels over one transport.
///
/// # Example
///
/// ```rust,ignore
/// use tether::{Channel, Session, SessionConfig};
///
/// let mut session = Session::new(SessionConfig::new("wss://example.com/socket/websocket"), transport);
/// let room = Channel::new("room:lobby");
/// room.on_event(|envelope| println!("{}: {}", envelope.event, envelope.payload));
///
/// session.join(&room);
/// session.connect()?;
/// // feed transport events with session.handle_event(..)
/// // and call session.poll_timers() at session.next_deadline()
/// ```
pub struct Session<T, C = SystemClock> {
    config: SessionConfig,
    transport: T,
    clock: C,
    channels: BTreeMap<String, Channel>,
    joined: BTreeSet<String>,
    pending: Correlator<PendingReply>,
    // Set once `Open` has been handled for the current connection.
    opened: bool,
    reconnect_timer: Option<RecurringTimer>,
    heartbeat_timer: Option<RecurringTimer>,
    on_open: Option<OpenHook>,
    on_close: Option<CloseHook>,
}

impl<T: Transport> Session<T, SystemClock> {
    pub fn new(config: SessionConfig, transport: T) -> Self {
        Self::with_clock(config, transport, SystemClock)
    }
}

impl<T: Transport, C: Clock> Session<T, C> {
    /// Create a session reading time from `clock`.
    pub fn with_clock(config: SessionConfig, transport: T, clock: C) -> Self {
        Self {
            config,
            transport,
            clock,
            channels: BTreeMap::new(),
            joined: BTreeSet::new(),
            pending: Correlator::new(),
            opened: false,
            reconnect_timer: None,
            heartbeat_timer: None,
            on_open: None,
            on_close: None,
        }
    }

    // ========================================================================
    // Hooks
    // ========================================================================

    /// Set the hook run every time the transport opens.
    pub fn on_open<F>(&mut self, hook: F)
    where
        F: FnMut() + Send + 'static,
    {
        self.on_open = Some(Box::new(hook));
    }

    /// Set the hook run every time the transport closes.
    pub fn on_close<F>(&mut self, hook: F)
    where
        F: FnMut(Option<&TransportError>) + Send + 'static,
    {
        self.on_close = Some(Box::new(hook));
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// Connect using the configured reconnect policy.
    pub fn connect(&mut self) -> Result<(), TransportError> {
        self.connect_with(self.config.auto_reconnect, self.config.reconnect_interval)
    }

    /// Connect, optionally polling for reconnection every `reconnect_interval`.
    ///
    /// On a live connection with an armed heartbeat this only refreshes the
    /// timers and sends a heartbeat right away.
    pub fn connect_with(
        &mut self,
        auto_reconnect: bool,
        reconnect_interval: Duration,
    ) -> Result<(), TransportError> {
        let now = self.clock.now();

        if self.transport.is_connected() && self.heartbeat_timer.is_some() {
            if auto_reconnect {
                self.reconnect_timer = Some(RecurringTimer::start(now, reconnect_interval));
            }
            self.send_heartbeat();
            self.heartbeat_timer = Some(RecurringTimer::start(now, self.config.heartbeat_interval));
            return Ok(());
        }

        if auto_reconnect {
            self.reconnect_timer = Some(RecurringTimer::start(now, reconnect_interval));
        }
        self.open_transport()
    }

    /// Stop both timers and close the transport if it is connected.
    pub fn disconnect(&mut self, timeout: Option<Duration>) {
        self.reconnect_timer = None;
        self.heartbeat_timer = None;
        self.opened = false;

        if self.transport.is_connected() {
            debug!(?timeout, "closing transport");
            self.transport.close(timeout);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn open_transport(&mut self) -> Result<(), TransportError> {
        for channel in self.channels.values() {
            channel.set_status(ChannelStatus::Joining);
        }

        let url = self.config.resolved_url().map_err(TransportError::connect)?;
        debug!(%url, "opening transport");
        self.transport.open(&url, self.config.allow_self_signed)
    }

    // ========================================================================
    // Channels
    // ========================================================================

    /// Track `channel` and join it now if the transport is open, otherwise
    /// when it next opens.
    pub fn join(&mut self, channel: &Channel) {
        let topic = channel.topic().to_string();
        if let Some(previous) = self.channels.insert(topic.clone(), channel.clone()) {
            if !previous.same(channel) {
                self.joined.remove(&topic);
            }
        }

        if self.opened && self.transport.is_connected() {
            self.send_join(channel);
        }
    }

    /// Stop tracking the channel with `channel`'s topic and ask the server to
    /// leave it. Untracked channels are ignored.
    ///
    /// The channel is untracked before anything is sent, so it is never
    /// rejoined even if the leave request cannot go out.
    pub fn leave(&mut self, channel: &Channel) {
        let Some(tracked) = self.channels.remove(channel.topic()) else {
            return;
        };
        self.joined.remove(tracked.topic());

        if !self.transport.is_connected() {
            debug!(topic = tracked.topic(), "left channel while disconnected");
            return;
        }

        let reference = next_reference();
        let envelope = Envelope::new(tracked.topic(), event::LEAVE)
            .with_reference(reference.clone())
            .with_join_ref(tracked.join_ref());

        match self.write(&envelope) {
            Ok(()) => self.pending.register(reference, PendingReply::Leave(tracked)),
            Err(err) => warn!(topic = tracked.topic(), %err, "leave not sent"),
        }
    }

    /// Send `event` with `payload` on a joined channel.
    ///
    /// `callback` runs exactly once: with the decoded reply, with a client
    /// error right away if the request cannot be sent, or with
    /// [`ClientError::Disconnected`] if the connection drops first.
    pub fn send<P, R, F>(&mut self, channel: &Channel, event: &str, payload: &P, callback: F)
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned + 'static,
        F: FnOnce(Result<Reply<R>, ClientError>) + Send + 'static,
    {
        let payload = serde_json::to_value(payload).map_err(ClientError::serialization);
        self.send_raw(
            channel,
            event,
            payload,
            Box::new(move |result| callback(result.and_then(Reply::from_payload))),
        );
    }

    /// [`send`](Self::send) with the payload already converted and the reply
    /// left undecoded.
    pub(crate) fn send_raw(
        &mut self,
        channel: &Channel,
        event: &str,
        payload: Result<Value, ClientError>,
        callback: RequestCallback,
    ) {
        if !self.transport.is_connected() {
            return callback(Err(ClientError::NotConnected));
        }

        let join_ref = match self.channels.get(channel.topic()) {
            Some(tracked) if tracked.is_joined() => tracked.join_ref(),
            _ => return callback(Err(ClientError::ChannelNotJoined)),
        };

        let payload = match payload {
            Ok(payload) => payload,
            Err(err) => return callback(Err(err)),
        };

        let reference = next_reference();
        let envelope = Envelope::new(channel.topic(), event)
            .with_payload(payload)
            .with_reference(reference.clone())
            .with_join_ref(join_ref);

        if let Err(err) = self.write(&envelope) {
            return callback(Err(err));
        }
        self.pending.register(reference, PendingReply::Request(callback));
    }

    fn send_join(&mut self, channel: &Channel) {
        channel.set_status(ChannelStatus::Joining);

        let reference = next_reference();
        channel.set_join_ref(Some(reference.clone()));

        let envelope = Envelope::new(channel.topic(), event::JOIN)
            .with_payload(channel.join_payload().clone())
            .with_reference(reference.clone())
            .with_join_ref(Some(reference.clone()));

        match self.write(&envelope) {
            Ok(()) => self
                .pending
                .register(reference, PendingReply::Join(channel.clone())),
            Err(err) => {
                warn!(topic = channel.topic(), %err, "join not sent");
                channel.set_status(ChannelStatus::JoinFailed(err));
            }
        }
    }

    // ========================================================================
    // Transport events
    // ========================================================================

    /// Process one transport event.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.handle_open(),
            TransportEvent::Close(error) => self.handle_close(error),
            TransportEvent::Text(text) => self.handle_text(&text),
            TransportEvent::Binary(data) => {
                debug!(len = data.len(), "ignoring binary frame");
            }
        }
    }

    fn handle_open(&mut self) {
        debug!("transport open");
        if let Some(hook) = self.on_open.as_mut() {
            hook();
        }

        let now = self.clock.now();
        self.heartbeat_timer = Some(RecurringTimer::start(now, self.config.heartbeat_interval));
        self.opened = true;

        let channels: Vec<Channel> = self.channels.values().cloned().collect();
        for channel in &channels {
            self.send_join(channel);
        }
    }

    fn handle_close(&mut self, error: Option<TransportError>) {
        debug!(error = ?error, "transport closed");
        if let Some(hook) = self.on_close.as_mut() {
            hook(error.as_ref());
        }

        self.heartbeat_timer = None;
        self.opened = false;

        for channel in self.channels.values() {
            channel.mark_disconnected(error.clone());
        }
        self.joined.clear();

        let failed = self.pending.clear_all(&ClientError::Disconnected);
        if failed > 0 {
            debug!(failed, "cleared pending requests");
        }
    }

    fn handle_text(&mut self, text: &str) {
        let envelope = match Envelope::decode(text, self.config.vsn) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%err, "dropping malformed frame");
                return;
            }
        };

        if self.config.log_traffic && !is_heartbeat(&envelope) {
            trace!(direction = "in", frame = text);
        }

        let entry = envelope
            .reference
            .as_deref()
            .and_then(|reference| self.pending.resolve(reference));

        match entry {
            Some(PendingReply::Join(channel)) => {
                return self.handle_join_reply(&channel, envelope.payload);
            }
            Some(PendingReply::Leave(channel)) => return self.handle_leave_reply(&channel),
            Some(PendingReply::Request(callback)) => callback(Ok(envelope.payload.clone())),
            None => {}
        }

        if let Some(channel) = self.channels.get(&envelope.topic) {
            channel.dispatch(&envelope);
        }
    }

    fn handle_join_reply(&mut self, channel: &Channel, payload: Value) {
        if !self.is_tracked(channel) {
            debug!(topic = channel.topic(), "ignoring join reply for untracked channel");
            return;
        }

        match Reply::<Value>::from_payload(payload) {
            Ok(reply) if reply.is_ok() => {
                debug!(topic = channel.topic(), "joined");
                channel.set_status(ChannelStatus::Joined(reply.response));
                self.joined.insert(channel.topic().to_string());
            }
            Ok(reply) => {
                let reason = reply.reason();
                debug!(topic = channel.topic(), %reason, "join rejected");
                channel.set_status(ChannelStatus::Rejected {
                    reason,
                    response: reply.response,
                });
            }
            Err(err) => {
                warn!(topic = channel.topic(), %err, "unreadable join reply");
                channel.set_status(ChannelStatus::JoinFailed(err));
            }
        }
    }

    fn handle_leave_reply(&mut self, channel: &Channel) {
        debug!(topic = channel.topic(), "left");
        channel.set_status(ChannelStatus::Disconnected(None));
    }

    fn is_tracked(&self, channel: &Channel) -> bool {
        self.channels
            .get(channel.topic())
            .is_some_and(|tracked| tracked.same(channel))
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Earliest pending timer deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.reconnect_timer, self.heartbeat_timer]
            .iter()
            .flatten()
            .map(RecurringTimer::deadline)
            .min()
    }

    /// Run whichever timers are due.
    pub fn poll_timers(&mut self) {
        let now = self.clock.now();

        let reconnect_due = self.reconnect_timer.as_mut().is_some_and(|t| t.fire(now));
        if reconnect_due && !self.transport.is_connected() {
            if self.transport.is_connecting() {
                trace!("connection attempt still in flight");
            } else {
                debug!("reconnect attempt");
                if let Err(err) = self.open_transport() {
                    debug!(%err, "reconnect attempt failed");
                }
            }
        }

        let heartbeat_due = self.heartbeat_timer.as_mut().is_some_and(|t| t.fire(now));
        if heartbeat_due {
            self.send_heartbeat();
        }
    }

    pub fn is_reconnect_armed(&self) -> bool {
        self.reconnect_timer.is_some()
    }

    pub fn is_heartbeat_armed(&self) -> bool {
        self.heartbeat_timer.is_some()
    }

    fn send_heartbeat(&mut self) {
        if !self.transport.is_connected() {
            return;
        }
        let envelope =
            Envelope::new(HEARTBEAT_TOPIC, event::HEARTBEAT).with_reference(heartbeat_reference());
        if let Err(err) = self.write(&envelope) {
            debug!(%err, "heartbeat not sent");
        }
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn write(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        let text = envelope.encode(self.config.vsn)?;
        if self.config.log_traffic && !is_heartbeat(envelope) {
            trace!(direction = "out", frame = %text);
        }
        self.transport.send_text(text).map_err(|err| {
            debug!(%err, "transport rejected frame");
            ClientError::NotConnected
        })
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Status of the tracked channel for `topic`.
    pub fn status(&self, topic: &str) -> Option<ChannelStatus> {
        self.channels.get(topic).map(Channel::status)
    }

    pub fn tracked_channels(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }

    /// Topics believed joined. Emptied on every disconnect.
    pub fn connected_channels(&self) -> impl Iterator<Item = &str> {
        self.joined.iter().map(String::as_str)
    }

    /// Number of references waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }
}

fn is_heartbeat(envelope: &Envelope) -> bool {
    envelope
        .reference
        .as_deref()
        .is_some_and(is_heartbeat_reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use url::Url;

    /// Connects synchronously and records what was sent.
    #[derive(Default)]
    struct Loopback {
        connected: bool,
        opened: Vec<Url>,
        sent: Vec<String>,
    }

    impl Transport for Loopback {
        fn open(&mut self, url: &Url, _allow_self_signed: bool) -> crate::error::Result<()> {
            self.opened.push(url.clone());
            Ok(())
        }

        fn close(&mut self, _timeout: Option<Duration>) {
            self.connected = false;
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        fn send_text(&mut self, text: String) -> crate::error::Result<()> {
            if !self.connected {
                return Err(TransportError::NotConnected);
            }
            self.sent.push(text);
            Ok(())
        }
    }

    fn session() -> Session<Loopback> {
        Session::new(
            SessionConfig::new("ws://localhost:4000/socket/websocket"),
            Loopback::default(),
        )
    }

    fn open(session: &mut Session<Loopback>) {
        session.transport_mut().connected = true;
        session.handle_event(TransportEvent::Open);
    }

    fn last_sent(session: &Session<Loopback>) -> Envelope {
        let text = session.transport().sent.last().unwrap();
        Envelope::decode(text, session.config().vsn).unwrap()
    }

    fn reply(to: &Envelope, payload: Value) -> TransportEvent {
        let envelope = Envelope::new(to.topic.clone(), event::REPLY)
            .with_payload(payload)
            .with_reference(to.reference.clone().unwrap());
        TransportEvent::Text(envelope.encode(crate::Vsn::V1).unwrap())
    }

    #[test]
    fn test_join_then_reply() {
        let mut session = session();
        let channel = Channel::new("room:1");
        session.join(&channel);
        session.connect().unwrap();
        assert_eq!(channel.status(), ChannelStatus::Joining);

        open(&mut session);
        let join = last_sent(&session);
        assert_eq!(join.event, event::JOIN);
        assert_eq!(join.join_ref, join.reference);
        assert_eq!(channel.status(), ChannelStatus::Joining);

        session.handle_event(reply(&join, json!({"status": "ok", "response": {"n": 1}})));
        assert_eq!(channel.status(), ChannelStatus::Joined(json!({"n": 1})));
        assert_eq!(session.connected_channels().collect::<Vec<_>>(), vec!["room:1"]);
    }

    #[test]
    fn test_join_reply_is_not_routed() {
        let mut session = session();
        let channel = Channel::new("room:1");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        channel.on_event(move |envelope| sink.lock().unwrap().push(envelope.event.clone()));

        session.join(&channel);
        open(&mut session);
        let join = last_sent(&session);
        session.handle_event(reply(&join, json!({"status": "ok", "response": {}})));

        let push = Envelope::new("room:1", "new_msg").encode(crate::Vsn::V1).unwrap();
        session.handle_event(TransportEvent::Text(push));

        assert_eq!(*seen.lock().unwrap(), vec!["new_msg".to_string()]);
    }

    #[test]
    fn test_malformed_frame_is_dropped() {
        let mut session = session();
        open(&mut session);
        session.handle_event(TransportEvent::Text("{\"topic\":".into()));
        session.handle_event(TransportEvent::Binary(vec![1, 2, 3]));
        assert_eq!(session.pending_requests(), 0);
    }

    #[test]
    fn test_resolved_url_carries_vsn() {
        let mut session = session();
        session.connect().unwrap();
        assert_eq!(
            session.transport().opened[0].as_str(),
            "ws://localhost:4000/socket/websocket?vsn=1.0.0"
        );
    }
}
