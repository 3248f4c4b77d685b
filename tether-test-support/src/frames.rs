//! Server frames for feeding a session.

use serde_json::{json, Value};
use tether::{event, Envelope, TransportEvent, Vsn};

/// `phx_reply` to `request` with the given status and response.
pub fn reply(request: &Envelope, status: &str, response: Value, vsn: Vsn) -> TransportEvent {
    let mut envelope = Envelope::new(request.topic.clone(), event::REPLY)
        .with_payload(json!({"status": status, "response": response}))
        .with_join_ref(request.join_ref.clone());
    envelope.reference = request.reference.clone();
    text(&envelope, vsn)
}

/// `{"status": "ok"}` reply to `request`.
pub fn ok(request: &Envelope, response: Value, vsn: Vsn) -> TransportEvent {
    reply(request, "ok", response, vsn)
}

/// Reply carrying an arbitrary reference.
pub fn reply_to_reference(topic: &str, reference: &str, payload: Value, vsn: Vsn) -> TransportEvent {
    let envelope = Envelope::new(topic, event::REPLY)
        .with_payload(payload)
        .with_reference(reference);
    text(&envelope, vsn)
}

/// Unsolicited server push.
pub fn push(topic: &str, event: &str, payload: Value, vsn: Vsn) -> TransportEvent {
    text(&Envelope::new(topic, event).with_payload(payload), vsn)
}

pub fn text(envelope: &Envelope, vsn: Vsn) -> TransportEvent {
    TransportEvent::Text(envelope.encode(vsn).expect("envelope encodes"))
}
