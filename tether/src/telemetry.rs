//! Log output for applications embedding a session.
//!
//! The library only emits `tracing` events. This module installs a subscriber
//! for binaries and tests that have none of their own.
//!
//! # Example
//!
//! ```rust,ignore
//! use tether::telemetry::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::default().with_level("tether=trace"))?;
//! ```

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Subscriber settings.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Filter directives used when `RUST_LOG` is unset, e.g. `"tether=debug"`.
    pub log_level: String,
    /// Emit one JSON object per event.
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            json_output: false,
        }
    }
}

impl TracingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_json(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Install the global subscriber. Fails if one is already set.
pub fn init_tracing(config: TracingConfig) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    if config.json_output {
        let fmt_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        registry.with(fmt_layer).try_init()
    } else {
        let fmt_layer = fmt::layer().with_target(true).compact();
        registry.with(fmt_layer).try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders() {
        let config = TracingConfig::default().with_level("tether=trace").with_json();
        assert_eq!(config.log_level, "tether=trace");
        assert!(config.json_output);
    }
}
