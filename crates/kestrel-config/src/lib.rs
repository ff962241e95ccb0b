//! Typed runtime configuration for the kestrel workspace, per spec.md §6.
//!
//! This crate owns the shape of [`KestrelConfig`] only. It never reads a
//! file or parses a format: loading `KestrelConfig` from disk is bootstrap
//! glue outside the hard core, left to whatever binary embeds this crate.

mod error;

pub use error::ConfigError;

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Runtime configuration for a kestrel process: how long an outstanding
/// [`kestrel_rpc`]-style invocation waits before timing out, where a
/// distributed bridge listens, and which encoding new documents default to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KestrelConfig {
	/// Matches spec.md §6's `ResponseTimeout ≈ 15s`.
	#[serde(with = "duration_secs")]
	pub response_timeout: Duration,

	/// Name of the [`kestrel_text::Encoding`] new documents use absent an
	/// explicit upstream encoding. Only `"utf-8"` has a registered
	/// implementation today; anything else is a valid config value that
	/// fails at the point something tries to look it up.
	pub default_encoding: String,

	/// Address a [`kestrel_bridge`]-style server listens on. `None` means
	/// the process only serves local pipes, no distributed transport.
	pub bind: Option<SocketAddr>,
}

impl Default for KestrelConfig {
	fn default() -> Self {
		KestrelConfig {
			response_timeout: Duration::from_secs(15),
			default_encoding: "utf-8".to_string(),
			bind: None,
		}
	}
}

impl KestrelConfig {
	/// Parses a config from its JSON wire form. Not file I/O: the caller
	/// already has the bytes, from a file, an environment variable, or a
	/// test fixture.
	pub fn from_json(input: &str) -> Result<Self, ConfigError> {
		serde_json::from_str(input).map_err(ConfigError::Parse)
	}
}

mod duration_secs {
	use serde::{Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(duration.as_secs())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		let secs = u64::deserialize(deserializer)?;
		Ok(Duration::from_secs(secs))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_matches_the_documented_response_timeout() {
		let config = KestrelConfig::default();
		assert_eq!(config.response_timeout, Duration::from_secs(15));
		assert_eq!(config.default_encoding, "utf-8");
		assert_eq!(config.bind, None);
	}

	#[test]
	fn round_trips_through_json() {
		let config = KestrelConfig { bind: Some("127.0.0.1:7667".parse().unwrap()), ..KestrelConfig::default() };
		let encoded = serde_json::to_string(&config).unwrap();
		let decoded = KestrelConfig::from_json(&encoded).unwrap();
		assert_eq!(decoded, config);
	}

	#[test]
	fn response_timeout_is_read_as_plain_seconds() {
		let config = KestrelConfig::from_json(r#"{"response_timeout": 30, "default_encoding": "utf-8", "bind": null}"#).unwrap();
		assert_eq!(config.response_timeout, Duration::from_secs(30));
	}

	#[test]
	fn rejects_malformed_input() {
		assert!(KestrelConfig::from_json("{not json}").is_err());
	}
}
