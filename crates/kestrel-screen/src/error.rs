#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScreenError {
	#[error("no component at {0}")]
	PathNotFound(String),
	#[error("component at the given path is not the expected variant")]
	TypeMismatch,
	#[error("would deadlock: this thread already holds the screen monitor")]
	DeadlockPrevented,
	#[error("the backing pipe closed before a reply arrived")]
	PipeClosed,
}
