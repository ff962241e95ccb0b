/// Errors surfaced by a service method handler, always rendered down to
/// the `{error: String}` reply shape [`crate::dispatch::DispatchService`]
/// writes back onto the pipe.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error("no document is bound on this connection")]
	NoDocumentBound,
	#[error(transparent)]
	Document(#[from] kestrel_doc::DocumentError),
	#[error(transparent)]
	Transaction(#[from] kestrel_doc::TransactionError),
	#[error(transparent)]
	Render(#[from] kestrel_render::RenderError),
	#[error("unsupported encoding {0:?}")]
	UnsupportedEncoding(String),
	#[error("upstream i/o failed: {0}")]
	Upstream(String),
	#[error("invalid parameters: {0}")]
	BadParams(String),
	#[error("unknown cursor id {0}")]
	UnknownCursor(u64),
	#[error("unknown screen id {0}")]
	UnknownScreen(u64),
	#[error(transparent)]
	Screen(#[from] kestrel_screen::ScreenError),
	#[error("unknown search matcher kind {0:?}")]
	UnknownMatcher(String),
	#[error("invalid regular expression: {0}")]
	Regex(#[from] regex::Error),
}

impl From<ServiceError> for kestrel_rpc::MethodOutcome {
	fn from(err: ServiceError) -> Self {
		kestrel_rpc::MethodOutcome::Error(err.to_string())
	}
}
