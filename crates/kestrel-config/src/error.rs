use thiserror::Error;

/// Errors parsing a [`crate::KestrelConfig`] from its wire form.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid config: {0}")]
	Parse(#[from] serde_json::Error),
}
