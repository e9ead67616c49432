//! Dispatch configuration
//!
//! Timeouts are stored as milliseconds so the config reads naturally from
//! TOML. Defaults mirror the deployed validator: inference calls get 5 s to
//! connect and 10 s per read, availability probes 5 s for each.

use crate::error::{DispatchError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

/// Connect and per-read limits for one call type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to establish the TCP connection
    pub connect_ms: u64,
    /// Time allowed between successive reads
    pub read_ms: u64,
}

impl TimeoutConfig {
    /// Inference defaults: 5 s to connect, 10 s per read
    pub const INFERENCE: Self = Self {
        connect_ms: 5_000,
        read_ms: 10_000,
    };

    /// Availability defaults: 5 s each
    pub const AVAILABILITY: Self = Self {
        connect_ms: 5_000,
        read_ms: 5_000,
    };

    /// Connect timeout
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    /// Read timeout
    pub fn read(&self) -> Duration {
        Duration::from_millis(self.read_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::INFERENCE
    }
}

/// A timeout table where either limit may be left out.
#[derive(Deserialize)]
struct TimeoutOverrides {
    connect_ms: Option<u64>,
    read_ms: Option<u64>,
}

impl TimeoutOverrides {
    fn over(self, defaults: TimeoutConfig) -> TimeoutConfig {
        TimeoutConfig {
            connect_ms: self.connect_ms.unwrap_or(defaults.connect_ms),
            read_ms: self.read_ms.unwrap_or(defaults.read_ms),
        }
    }
}

fn inference_timeouts<'de, D>(de: D) -> std::result::Result<TimeoutConfig, D::Error>
where
    D: Deserializer<'de>,
{
    TimeoutOverrides::deserialize(de).map(|o| o.over(TimeoutConfig::INFERENCE))
}

fn availability_timeouts<'de, D>(de: D) -> std::result::Result<TimeoutConfig, D::Error>
where
    D: Deserializer<'de>,
{
    TimeoutOverrides::deserialize(de).map(|o| o.over(TimeoutConfig::AVAILABILITY))
}

/// Settings shared by every dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Overall budget for a single call, connect through last byte
    pub neuron_timeout_ms: u64,

    /// Streaming inference limits
    #[serde(deserialize_with = "inference_timeouts")]
    pub inference: TimeoutConfig,

    /// Availability probe limits
    #[serde(deserialize_with = "availability_timeouts")]
    pub availability: TimeoutConfig,

    /// URL scheme used to reach miners
    pub scheme: String,

    /// Chat-completion endpoint path
    pub inference_path: String,

    /// Availability endpoint path
    pub availability_path: String,

    /// Optional bearer token sent with inference calls
    pub bearer_token: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            neuron_timeout_ms: 20_000,
            inference: TimeoutConfig::INFERENCE,
            availability: TimeoutConfig::AVAILABILITY,
            scheme: "http".to_string(),
            inference_path: "/v1/chat/completions".to_string(),
            availability_path: "/availability".to_string(),
            bearer_token: None,
        }
    }
}

impl DispatchConfig {
    /// Short timeouts for local tests
    pub fn testing() -> Self {
        Self {
            neuron_timeout_ms: 3_000,
            inference: TimeoutConfig {
                connect_ms: 1_000,
                read_ms: 500,
            },
            availability: TimeoutConfig {
                connect_ms: 1_000,
                read_ms: 500,
            },
            ..Default::default()
        }
    }

    /// Overall per-call budget
    pub fn neuron_timeout(&self) -> Duration {
        Duration::from_millis(self.neuron_timeout_ms)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<()> {
        if self.neuron_timeout_ms == 0 {
            return Err(DispatchError::config(
                "neuron_timeout_ms must be greater than 0",
            ));
        }

        for (name, limits) in [
            ("inference", &self.inference),
            ("availability", &self.availability),
        ] {
            if limits.connect_ms == 0 || limits.read_ms == 0 {
                return Err(DispatchError::config(format!(
                    "{name} timeouts must be greater than 0"
                )));
            }
        }

        if !matches!(self.scheme.as_str(), "http" | "https") {
            return Err(DispatchError::config(format!(
                "unsupported scheme: {}",
                self.scheme
            )));
        }

        for (name, path) in [
            ("inference_path", &self.inference_path),
            ("availability_path", &self.availability_path),
        ] {
            if !path.starts_with('/') {
                return Err(DispatchError::config(format!(
                    "{name} must start with '/'"
                )));
            }
        }

        Ok(())
    }
}
