//! Session configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::endpoint;
use crate::envelope::Vsn;

/// Default interval between reconnect attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Default interval between heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Connection settings for a [`Session`](crate::Session).
///
/// Durations are given in seconds when loaded through serde:
///
/// ```
/// let config: tether::SessionConfig = serde_json::from_str(
///     r#"{"endpoint": "wss://example.com/socket/websocket", "reconnect_interval": 2.5}"#,
/// ).unwrap();
/// assert_eq!(config.reconnect_interval.as_millis(), 2500);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Socket endpoint, e.g. `wss://example.com/socket/websocket`.
    pub endpoint: String,
    /// Query parameters appended to the endpoint.
    pub params: BTreeMap<String, String>,
    /// Passed through to the transport.
    pub allow_self_signed: bool,
    /// Reconnect automatically when `connect` is called without arguments.
    pub auto_reconnect: bool,
    #[serde(with = "secs")]
    pub reconnect_interval: Duration,
    #[serde(with = "secs")]
    pub heartbeat_interval: Duration,
    /// Wire serializer.
    pub vsn: Vsn,
    /// Trace every non-heartbeat frame in and out.
    pub log_traffic: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:4000/socket/websocket".to_string(),
            params: BTreeMap::new(),
            allow_self_signed: false,
            auto_reconnect: true,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            vsn: Vsn::default(),
            log_traffic: false,
        }
    }
}

impl SessionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Endpoint with the query parameters and the serializer version applied.
    pub fn resolved_url(&self) -> Result<Url, url::ParseError> {
        let mut params = self.params.clone();
        params.insert("vsn".to_string(), self.vsn.as_param().to_string());
        endpoint::resolve(&self.endpoint, &params)
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set the socket endpoint.
    pub fn endpoint(mut self, endpoint: &str) -> Self {
        self.config.endpoint = endpoint.to_string();
        self
    }

    /// Add a query parameter.
    pub fn param(mut self, key: &str, value: &str) -> Self {
        self.config.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Accept self-signed server certificates.
    pub fn allow_self_signed(mut self, allow: bool) -> Self {
        self.config.allow_self_signed = allow;
        self
    }

    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.reconnect_interval = interval;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Select the wire serializer.
    pub fn vsn(mut self, vsn: Vsn) -> Self {
        self.config.vsn = vsn;
        self
    }

    /// Trace frames in and out.
    pub fn log_traffic(mut self, enabled: bool) -> Self {
        self.config.log_traffic = enabled;
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
