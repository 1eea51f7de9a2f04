//! Session configuration.
//!
//! The serial port used for instrument comms is always configured like so:
//! * Baud rate: 57600
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None

use core::time::Duration;

use serde::Deserialize;

pub const BAUD_RATE: u32 = 57600;

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// The two command set variants observed in the field.
///
/// They differ in the arbitrary waveform code range and in whether the
/// measurement timer can be stopped. They have not been verified to be
/// interchangeable, so pick the one matching the hardware.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolRevision {
    /// Arbitrary waveforms are `100 + slot`, measurement stop is `:s6b0`.
    #[default]
    Mhs5200A,
    /// Arbitrary waveforms are `10 + slot`, no measurement stop register.
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    pub revision: ProtocolRevision,
    /// How long to wait for a newline terminated response.
    #[serde(with = "humantime_serde")]
    pub response_timeout: Duration,
    /// Timeout of a single low level read on the serial port.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Interval between measurement polls.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Pause after selecting an arbitrary waveform while the instrument loads it.
    #[serde(with = "humantime_serde")]
    pub arbitrary_settle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            revision: ProtocolRevision::default(),
            response_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_millis(5),
            poll_interval: Duration::from_secs(1),
            arbitrary_settle: Duration::from_secs(2),
        }
    }
}

impl Config {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }

    pub fn with_revision(mut self, revision: ProtocolRevision) -> Self {
        self.revision = revision;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_arbitrary_settle(mut self, settle: Duration) -> Self {
        self.arbitrary_settle = settle;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.port, "/dev/ttyUSB0");
        assert_eq!(config.response_timeout, Duration::from_millis(500));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.revision, ProtocolRevision::Mhs5200A);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: Config =
            serde_json::from_str(r#"{"port": "COM3", "revision": "legacy", "poll_interval": "250ms"}"#)
                .unwrap();
        assert_eq!(config.port, "COM3");
        assert_eq!(config.revision, ProtocolRevision::Legacy);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.arbitrary_settle, Duration::from_secs(2));
    }
}
