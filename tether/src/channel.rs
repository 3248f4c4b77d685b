//! Channels and their join state.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::envelope::Envelope;
use crate::error::{ClientError, TransportError};

/// Handler for events routed to a channel.
pub type EventHandler = Box<dyn FnMut(&Envelope) + Send>;

/// Join state of a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelStatus {
    /// Not joined. Carries the transport error that caused it, if any.
    Disconnected(Option<TransportError>),
    /// Join request sent, no reply yet.
    Joining,
    /// Joined; carries the server's join response.
    Joined(Value),
    /// The join never reached a server decision.
    JoinFailed(ClientError),
    /// The server refused the join.
    Rejected { reason: String, response: Value },
}

impl ChannelStatus {
    pub fn is_joined(&self) -> bool {
        matches!(self, ChannelStatus::Joined(_))
    }

    pub fn is_joining(&self) -> bool {
        matches!(self, ChannelStatus::Joining)
    }
}

impl Default for ChannelStatus {
    fn default() -> Self {
        ChannelStatus::Disconnected(None)
    }
}

struct ChannelInner {
    topic: String,
    join_payload: Value,
    status: Mutex<ChannelStatus>,
    join_ref: Mutex<Option<String>>,
    handler: Mutex<Option<EventHandler>>,
}

/// Application handle to a topic subscription.
///
/// Cloning is cheap and every clone refers to the same channel. Equality and
/// hashing go by topic, so two handles for the same topic occupy one slot in
/// a session's tracked set.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Create a channel with an empty join payload.
    pub fn new(topic: impl Into<String>) -> Self {
        Self::with_join_payload(topic, Value::Object(Map::new()))
    }

    /// Create a channel with a payload sent on every join.
    pub fn with_join_payload(topic: impl Into<String>, join_payload: Value) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                topic: topic.into(),
                join_payload,
                status: Mutex::new(ChannelStatus::default()),
                join_ref: Mutex::new(None),
                handler: Mutex::new(None),
            }),
        }
    }

    /// Create a channel whose join payload is serialized from `params`.
    pub fn with_params<P: Serialize>(
        topic: impl Into<String>,
        params: &P,
    ) -> Result<Self, ClientError> {
        let payload = serde_json::to_value(params).map_err(ClientError::serialization)?;
        Ok(Self::with_join_payload(topic, payload))
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    pub fn join_payload(&self) -> &Value {
        &self.inner.join_payload
    }

    /// Current status snapshot.
    pub fn status(&self) -> ChannelStatus {
        self.inner.status.lock().clone()
    }

    pub fn is_joined(&self) -> bool {
        self.inner.status.lock().is_joined()
    }

    /// Reference of the most recent join request.
    pub fn join_ref(&self) -> Option<String> {
        self.inner.join_ref.lock().clone()
    }

    /// Set the handler for events routed to this channel.
    pub fn on_event<F>(&self, handler: F)
    where
        F: FnMut(&Envelope) + Send + 'static,
    {
        *self.inner.handler.lock() = Some(Box::new(handler));
    }

    /// Whether both handles refer to the same channel object.
    pub fn same(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn set_status(&self, status: ChannelStatus) {
        *self.inner.status.lock() = status;
    }

    pub(crate) fn set_join_ref(&self, join_ref: Option<String>) {
        *self.inner.join_ref.lock() = join_ref;
    }

    /// Disconnect transition: only `Joined` and `Joining` are affected.
    pub(crate) fn mark_disconnected(&self, error: Option<TransportError>) -> bool {
        let mut status = self.inner.status.lock();
        if status.is_joined() || status.is_joining() {
            *status = ChannelStatus::Disconnected(error);
            true
        } else {
            false
        }
    }

    pub(crate) fn dispatch(&self, envelope: &Envelope) {
        if let Some(handler) = self.inner.handler.lock().as_mut() {
            handler(envelope);
        }
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.inner.topic == other.inner.topic
    }
}

impl Eq for Channel {}

impl Hash for Channel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.topic.hash(state);
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("topic", &self.inner.topic)
            .field("status", &*self.inner.status.lock())
            .finish()
    }
}
