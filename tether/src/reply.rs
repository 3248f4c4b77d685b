//! Reply payloads.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ClientError;

/// Server-side outcome carried in a reply payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Error,
}

impl ReplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyStatus::Ok => "ok",
            ReplyStatus::Error => "error",
        }
    }
}

/// Reply to a request: `{"status": "ok" | "error", "response": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply<R = Value> {
    pub status: ReplyStatus,
    pub response: R,
}

impl<R> Reply<R> {
    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }
}

impl<R: DeserializeOwned> Reply<R> {
    /// Decode a reply payload.
    ///
    /// Any payload that is not of the reply shape, or whose `response` does
    /// not fit `R`, is a [`ClientError::ResponseDeserializationFailed`].
    pub fn from_payload(payload: Value) -> Result<Self, ClientError> {
        serde_json::from_value(payload).map_err(ClientError::deserialization)
    }
}

impl Reply<Value> {
    /// Rejection reason: `response.reason` when it is a string, otherwise the
    /// status text.
    pub fn reason(&self) -> String {
        self.response
            .get("reason")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| self.status.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Ack {
        id: u64,
    }

    #[test]
    fn test_typed_reply() {
        let reply: Reply<Ack> =
            Reply::from_payload(json!({"status": "ok", "response": {"id": 9}})).unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.response, Ack { id: 9 });
    }

    #[test]
    fn test_wrong_shape_is_deserialization_error() {
        let err = Reply::<Value>::from_payload(json!({"ok": true})).unwrap_err();
        assert!(matches!(err, ClientError::ResponseDeserializationFailed(_)));

        let err = Reply::<Value>::from_payload(json!({"status": "maybe", "response": {}}))
            .unwrap_err();
        assert!(matches!(err, ClientError::ResponseDeserializationFailed(_)));

        let err = Reply::<Ack>::from_payload(json!({"status": "ok", "response": {"id": "x"}}))
            .unwrap_err();
        assert!(matches!(err, ClientError::ResponseDeserializationFailed(_)));
    }

    #[test]
    fn test_reason() {
        let reply = Reply::<Value>::from_payload(
            json!({"status": "error", "response": {"reason": "unauthorized"}}),
        )
        .unwrap();
        assert_eq!(reply.reason(), "unauthorized");

        let reply =
            Reply::<Value>::from_payload(json!({"status": "error", "response": {}})).unwrap();
        assert_eq!(reply.reason(), "error");
    }
}
