//! Generation and playback settings
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;

const DEFAULT_WORKER_THREADS: usize = 3;
const DEFAULT_EXTENSION: &str = "ptsim";
const DEFAULT_EXPRESSIONS_EXTENSION: &str = "ptexp";

const DEFAULT_READ_TIMEOUT_MS: u64 = 100;
const DEFAULT_READ_COUNT: usize = 10;
const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 500;
const DEFAULT_RESPONSE_ATTEMPTS: usize = 3;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 2000;
const DEFAULT_RECONNECT_ATTEMPTS: usize = 3;
const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 250;

/// Configuration for building a simulation from a log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Invert filter polarity so the simulation answers as the vehicle side
    pub invert_filters: bool,
    /// Threads used for parsing, grouping and assembly
    pub worker_threads: usize,
    /// File extension of saved simulations
    pub extension: String,
    /// File extension of saved expression sets
    pub expressions_extension: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            invert_filters: true,
            worker_threads: DEFAULT_WORKER_THREADS,
            extension: DEFAULT_EXTENSION.to_string(),
            expressions_extension: DEFAULT_EXPRESSIONS_EXTENSION.to_string(),
        }
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Configuration for replaying a simulation against a transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Max time a single read waits for traffic
    #[serde(with = "millis")]
    pub read_timeout: Duration,
    /// Max messages taken per read
    pub read_count: usize,
    /// Max time a single response write may take
    #[serde(with = "millis")]
    pub response_timeout: Duration,
    /// Write attempts per response batch
    pub response_attempts: usize,
    /// Max time opening the device may take
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    /// Reconnect cycles after a disconnect before giving up
    pub reconnect_attempts: usize,
    /// Wait between reconnect cycles
    #[serde(with = "millis")]
    pub reconnect_backoff: Duration,
    pub responses_enabled: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            read_count: DEFAULT_READ_COUNT,
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            response_attempts: DEFAULT_RESPONSE_ATTEMPTS,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_backoff: Duration::from_millis(DEFAULT_RECONNECT_BACKOFF_MS),
            responses_enabled: true,
        }
    }
}

impl PlayerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Durations as whole milliseconds
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_defaults() {
        let config = GeneratorConfig::default();
        assert!(config.invert_filters);
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.extension, "ptsim");
        assert_eq!(config.expressions_extension, "ptexp");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = PlayerConfig::from_json(r#"{ "read_timeout": 20, "responses_enabled": false }"#).unwrap();
        assert_eq!(config.read_timeout, Duration::from_millis(20));
        assert!(!config.responses_enabled);
        assert_eq!(config.read_count, 10);
        assert_eq!(config.connect_timeout, Duration::from_millis(2000));
    }

    #[test]
    fn durations_written_as_millis() {
        let json = serde_json::to_value(PlayerConfig::default()).unwrap();
        assert_eq!(json["reconnect_backoff"], 250);
        assert_eq!(json["response_timeout"], 500);
    }

    #[test]
    fn invalid_json() {
        assert!(matches!(
            GeneratorConfig::from_json("{ \"worker_threads\": -1 }"),
            Err(crate::Error::Persistence(_))
        ));
    }
}
