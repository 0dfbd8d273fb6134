//! Connection configuration.
//!
//! All knobs have defaults matching the accessory's behavior; a config can
//! also be loaded from JSON:
//!
//! ```
//! use bmap_client::ConnectionConfig;
//!
//! let config = ConnectionConfig::from_json(r#"{ "max_attempts": 5, "attempt_timeout_ms": 250 }"#).unwrap();
//! assert_eq!(config.max_attempts, 5);
//! assert_eq!(config.attempt_timeout.as_millis(), 250);
//! assert_eq!(config.error_backoff.as_millis(), 100);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BmapError, Result};
use crate::protocol::{DEFAULT_BUFFER_CAPACITY, MAX_PACKET_SIZE};

/// Default number of write attempts per request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default wait for a response per attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default pause of the read loop after a protocol fault.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Default number of trees buffered per subscriber.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// Default writer queue depth.
pub const DEFAULT_WRITE_QUEUE: usize = 16;

/// Configuration for a [`Connection`](crate::Connection).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Write attempts per request before giving up.
    pub max_attempts: u32,
    /// How long each attempt waits for the matching response.
    #[serde(rename = "attempt_timeout_ms", with = "duration_ms")]
    pub attempt_timeout: Duration,
    /// Read loop pause after a malformed response or device error.
    #[serde(rename = "error_backoff_ms", with = "duration_ms")]
    pub error_backoff: Duration,
    /// Trees buffered per subscriber before the oldest are dropped.
    pub subscriber_capacity: usize,
    /// Packets queued for the writer task.
    pub write_queue: usize,
    /// Stream buffer ceiling in bytes.
    pub buffer_capacity: usize,
    /// Fail the pending request as soon as the device reports an `ERROR`
    /// for its command, instead of waiting for the timeout.
    pub propagate_device_errors: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            write_queue: DEFAULT_WRITE_QUEUE,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            propagate_device_errors: false,
        }
    }
}

impl ConnectionConfig {
    /// Parse a JSON config document. Missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that all values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(BmapError::Config("max_attempts must be at least 1".into()));
        }
        if self.attempt_timeout.is_zero() {
            return Err(BmapError::Config("attempt_timeout must be non-zero".into()));
        }
        if self.subscriber_capacity == 0 || self.write_queue == 0 {
            return Err(BmapError::Config(
                "channel capacities must be non-zero".into(),
            ));
        }
        if self.buffer_capacity < MAX_PACKET_SIZE {
            return Err(BmapError::Config(format!(
                "buffer_capacity must hold one packet ({} bytes)",
                MAX_PACKET_SIZE
            )));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
