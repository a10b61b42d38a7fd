//! Session timing and retry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default push interval.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(15);
/// Default delay between connection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Default time allowed for the handshake reply.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Intervals at or below this risk the peer's limit of 5 updates per 20 seconds.
pub const RATE_LIMIT_ADVISORY: Duration = Duration::from_millis(4000);

/// How a session paces updates and recovers from connection failures.
///
/// Deserializes from millisecond fields, each optional:
/// ```json
/// { "updateIntervalMs": 15000, "retry": true, "retryDelayMs": 5000, "handshakeTimeoutMs": 10000 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
	#[serde(rename = "updateIntervalMs", with = "millis")]
	pub update_interval: Duration,
	pub retry: bool,
	#[serde(rename = "retryDelayMs", with = "millis")]
	pub retry_delay: Duration,
	#[serde(rename = "handshakeTimeoutMs", with = "millis")]
	pub handshake_timeout: Duration,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			update_interval: DEFAULT_UPDATE_INTERVAL,
			retry: true,
			retry_delay: DEFAULT_RETRY_DELAY,
			handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
		}
	}
}

impl SessionConfig {
	/// Config from the three classic knobs, other fields at their defaults.
	pub fn new(update_interval: Duration, retry: bool, retry_delay: Duration) -> Self {
		Self {
			update_interval,
			retry,
			retry_delay,
			..Self::default()
		}
	}

	pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
		self.handshake_timeout = timeout;
		self
	}

	/// True when the update interval is low enough to hit the peer's rate limit.
	pub fn interval_risks_rate_limit(&self) -> bool {
		self.update_interval <= RATE_LIMIT_ADVISORY
	}

	/// Logs the rate-limit advisory if it applies.
	pub(crate) fn warn_if_aggressive(&self) {
		if self.interval_risks_rate_limit() {
			warn!(
				target = "presence.session",
				interval_ms = whole_millis(self.update_interval),
				"update interval <= 4s may trigger a rate limit (Discord allows 5 updates per 20s)"
			);
		}
	}
}

/// Milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn whole_millis(duration: Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

mod millis {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(super::whole_millis(*value))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn defaults_match_classic_client() {
		let config = SessionConfig::default();
		assert_eq!(config.update_interval, Duration::from_millis(15_000));
		assert!(config.retry);
		assert_eq!(config.retry_delay, Duration::from_millis(5_000));
		assert!(!config.interval_risks_rate_limit());
	}

	#[test]
	fn partial_json_fills_defaults() {
		let config: SessionConfig = serde_json::from_value(json!({"updateIntervalMs": 20000, "retry": false})).unwrap();
		assert_eq!(config.update_interval, Duration::from_secs(20));
		assert!(!config.retry);
		assert_eq!(config.retry_delay, DEFAULT_RETRY_DELAY);
		assert_eq!(config.handshake_timeout, DEFAULT_HANDSHAKE_TIMEOUT);
	}

	#[test]
	fn serializes_as_millis() {
		let value = serde_json::to_value(SessionConfig::new(Duration::from_secs(30), true, Duration::from_secs(2))).unwrap();
		assert_eq!(value["updateIntervalMs"], 30_000);
		assert_eq!(value["retryDelayMs"], 2_000);
		assert_eq!(value["retry"], true);
	}

	#[test]
	fn huge_durations_saturate() {
		assert_eq!(whole_millis(Duration::from_millis(1500)), 1500);
		assert_eq!(whole_millis(Duration::MAX), u64::MAX);
		let value = serde_json::to_value(SessionConfig::new(Duration::MAX, true, DEFAULT_RETRY_DELAY)).unwrap();
		assert_eq!(value["updateIntervalMs"], u64::MAX);
	}

	#[test]
	fn low_interval_is_flagged() {
		let config = SessionConfig::new(Duration::from_millis(4000), true, DEFAULT_RETRY_DELAY);
		assert!(config.interval_risks_rate_limit());
		let config = SessionConfig::new(Duration::from_millis(4001), true, DEFAULT_RETRY_DELAY);
		assert!(!config.interval_risks_rate_limit());
	}
}
