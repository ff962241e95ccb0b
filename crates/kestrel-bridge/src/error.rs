#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
	#[error(transparent)]
	Rpc(#[from] kestrel_rpc::RpcError),
	#[error("authentication failed")]
	AuthDenied,
	#[error("access denied for {0}")]
	AclDenied(String),
	#[error("peer returned an unexpected reply")]
	MalformedReply,
}
