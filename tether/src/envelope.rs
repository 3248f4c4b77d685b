//! Wire envelope and codec.
//!
//! Every message exchanged over the transport is one [`Envelope`]. Two
//! serializer versions are supported:
//!
//! - [`Vsn::V1`]: `{"topic": .., "event": .., "payload": .., "ref": .., "join_ref": ..}`
//! - [`Vsn::V2`]: `[join_ref, ref, topic, event, payload]`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CodecError;

/// Reserved event names.
pub mod event {
    pub const JOIN: &str = "phx_join";
    pub const LEAVE: &str = "phx_leave";
    pub const REPLY: &str = "phx_reply";
    pub const ERROR: &str = "phx_error";
    pub const CLOSE: &str = "phx_close";
    pub const HEARTBEAT: &str = "heartbeat";
}

/// Control topic used for heartbeats.
pub const HEARTBEAT_TOPIC: &str = "phoenix";

/// Serializer version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vsn {
    /// JSON object per message.
    #[default]
    V1,
    /// JSON array per message.
    V2,
}

impl Vsn {
    /// Value of the `vsn` query parameter announced to the server.
    pub fn as_param(&self) -> &'static str {
        match self {
            Vsn::V1 => "1.0.0",
            Vsn::V2 => "2.0.0",
        }
    }
}

/// A transport-level message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    pub event: String,
    #[serde(default = "empty_payload")]
    pub payload: Value,
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

/// Array layout used by [`Vsn::V2`].
type ArrayEnvelope = (Option<String>, Option<String>, String, String, Value);

fn empty_payload() -> Value {
    Value::Object(Map::new())
}

impl Envelope {
    /// Fire-and-forget envelope with an empty payload and no reference.
    pub fn new(topic: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload: empty_payload(),
            reference: None,
            join_ref: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_join_ref(mut self, join_ref: Option<String>) -> Self {
        self.join_ref = join_ref;
        self
    }

    /// Whether this envelope is a reply to an earlier request.
    pub fn is_reply(&self) -> bool {
        self.event == event::REPLY
    }

    /// Encode to wire text.
    pub fn encode(&self, vsn: Vsn) -> Result<String, CodecError> {
        match vsn {
            Vsn::V1 => serde_json::to_string(self),
            Vsn::V2 => serde_json::to_string(&(
                &self.join_ref,
                &self.reference,
                &self.topic,
                &self.event,
                &self.payload,
            )),
        }
        .map_err(CodecError::Encode)
    }

    /// Decode from wire text.
    pub fn decode(text: &str, vsn: Vsn) -> Result<Self, CodecError> {
        match vsn {
            Vsn::V1 => serde_json::from_str(text).map_err(CodecError::Decode),
            Vsn::V2 => {
                let (join_ref, reference, topic, event, payload): ArrayEnvelope =
                    serde_json::from_str(text).map_err(CodecError::Decode)?;
                Ok(Self {
                    topic,
                    event,
                    payload,
                    reference,
                    join_ref,
                })
            }
        }
    }
}
