#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
	#[error("no service registered at {0}")]
	PathNotFound(String),
	#[error("a service is already registered at {0}")]
	AlreadyRegistered(String),
	#[error("value did not match the expected shape")]
	TypeMismatch,
	#[error("frame exceeds the maximum message size")]
	MessageTooLarge,
	#[error("frame could not be decoded")]
	MalformedMessage,
	#[error("no response within the configured timeout")]
	Timeout,
	#[error("the interface closed before a response arrived")]
	Cancelled,
}
