use crate::RpcError;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use kestrel_value::{Value, binary_decode, binary_encode, kgr_object};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// How an outstanding [`NetInterface::invoke`] call resolves, per spec.md
/// §5's cancellation/timeout rules.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
	Result(Value),
	Error(String),
	Timeout,
	Cancelled,
}

/// What a registered method handler decided to answer with.
pub enum MethodOutcome {
	Result(Value),
	Error(String),
}

pub type MethodHandler = Box<dyn Fn(&str, Value) -> MethodOutcome>;

struct Broker {
	next_id: i64,
	channels: HashMap<i64, oneshot::Sender<ResponseOutcome>>,
}

impl Broker {
	fn new() -> Self {
		Broker { next_id: 1, channels: HashMap::new() }
	}

	fn open_channel(&mut self) -> (i64, oneshot::Receiver<ResponseOutcome>) {
		let id = self.next_id;
		self.next_id += 1;
		let (tx, rx) = oneshot::channel();
		self.channels.insert(id, tx);
		(id, rx)
	}

	fn feed(&mut self, id: i64, outcome: ResponseOutcome) {
		if let Some(tx) = self.channels.remove(&id) {
			let _ = tx.send(outcome);
		}
	}

	fn drop_channel(&mut self, id: i64) {
		self.channels.remove(&id);
	}

	fn cancel_all(&mut self) {
		for (_, tx) in self.channels.drain() {
			let _ = tx.send(ResponseOutcome::Cancelled);
		}
	}
}

fn unknown_method(method: &str, _params: Value) -> MethodOutcome {
	MethodOutcome::Error(format!("Unknown method: {method}"))
}

/// One end of a length-prefixed RPC socket, per spec.md §4.10.
///
/// Frames are a `u32`-little-endian length prefix followed by a
/// binary-codec-encoded [`Value`] whose top-level object carries
/// `action ∈ {"invoke", "response", "close"}`. Write access is naturally
/// serialized by `RefCell` rather than a mutex, since a `NetInterface`
/// lives entirely on one context manager's cooperative single thread
/// (spec.md §5's "write access is serialized by a single mutex" becomes
/// this crate's equivalent of that guarantee without real contention).
pub struct NetInterface<T> {
	framed: RefCell<Framed<T, LengthDelimitedCodec>>,
	methods: RefCell<HashMap<String, MethodHandler>>,
	fallback: RefCell<MethodHandler>,
	broker: RefCell<Broker>,
	incoming: RefCell<VecDeque<Value>>,
	response_timeout: Duration,
	closed: Cell<bool>,
}

impl<T: AsyncRead + AsyncWrite + Unpin> NetInterface<T> {
	pub fn new(io: T, response_timeout: Duration) -> Self {
		let codec = LengthDelimitedCodec::builder().little_endian().length_field_length(4).new_codec();
		NetInterface {
			framed: RefCell::new(Framed::new(io, codec)),
			methods: RefCell::new(HashMap::new()),
			fallback: RefCell::new(Box::new(unknown_method)),
			broker: RefCell::new(Broker::new()),
			incoming: RefCell::new(VecDeque::new()),
			response_timeout,
			closed: Cell::new(false),
		}
	}

	pub fn register_method(&self, name: impl Into<String>, handler: MethodHandler) {
		self.methods.borrow_mut().insert(name.into(), handler);
	}

	/// Overrides the protected hook invoked for unregistered methods;
	/// defaults to replying with `Error("Unknown method")`.
	pub fn set_fallback(&self, handler: MethodHandler) {
		*self.fallback.borrow_mut() = handler;
	}

	pub fn is_closed(&self) -> bool {
		self.closed.get()
	}

	async fn write_value(&self, value: &Value) -> Result<(), RpcError> {
		let bytes = binary_encode(value).map_err(|_| RpcError::MalformedMessage)?;
		if bytes.len() > u32::MAX as usize {
			return Err(RpcError::MessageTooLarge);
		}
		self.framed.borrow_mut().send(Bytes::from(bytes)).await.map_err(|_| RpcError::MalformedMessage)
	}

	/// Pulls the next frame off the socket into the incoming queue, or
	/// marks the interface closed once the peer hangs up.
	pub async fn recv(&self) -> Result<(), RpcError> {
		let next = self.framed.borrow_mut().next().await;
		match next {
			Some(Ok(bytes)) => {
				let value = binary_decode(&bytes).map_err(|_| RpcError::MalformedMessage)?;
				self.incoming.borrow_mut().push_back(value);
				Ok(())
			}
			Some(Err(_)) => Err(RpcError::MalformedMessage),
			None => {
				self.closed.set(true);
				Ok(())
			}
		}
	}

	/// Drains and dispatches up to `count` messages, reading more frames
	/// as needed. Returns the number actually processed.
	pub async fn process(&self, count: usize) -> Result<usize, RpcError> {
		let mut processed = 0;
		for _ in 0..count {
			if self.incoming.borrow().is_empty() {
				if self.closed.get() {
					break;
				}
				self.recv().await?;
				if self.incoming.borrow().is_empty() {
					break;
				}
			}
			let message = self.incoming.borrow_mut().pop_front().expect("checked non-empty above");
			self.dispatch(message).await?;
			processed += 1;
		}
		Ok(processed)
	}

	async fn dispatch(&self, message: Value) -> Result<(), RpcError> {
		let action = message.field("action").and_then(Value::as_str).ok_or(RpcError::MalformedMessage)?;
		match action {
			"invoke" => {
				let id = message.field("id").and_then(Value::as_int).ok_or(RpcError::MalformedMessage)?;
				let method = message.field("method").and_then(Value::as_str).ok_or(RpcError::MalformedMessage)?.to_string();
				let params = message.field("params").cloned().unwrap_or(Value::Null);
				let outcome = match self.methods.borrow().get(&method) {
					Some(handler) => handler(&method, params),
					None => (self.fallback.borrow())(&method, params),
				};
				let response = match outcome {
					MethodOutcome::Result(v) => kgr_object!("action" => "response", "id" => id, "result" => v),
					MethodOutcome::Error(msg) => kgr_object!("action" => "response", "id" => id, "error" => msg),
				};
				self.write_value(&response).await
			}
			"response" => {
				let id = message.field("id").and_then(Value::as_int).ok_or(RpcError::MalformedMessage)?;
				let outcome = match message.field("error").and_then(Value::as_str) {
					Some(err) => ResponseOutcome::Error(err.to_string()),
					None => ResponseOutcome::Result(message.field("result").cloned().unwrap_or(Value::Null)),
				};
				self.broker.borrow_mut().feed(id, outcome);
				Ok(())
			}
			"close" => {
				self.closed.set(true);
				self.broker.borrow_mut().cancel_all();
				Ok(())
			}
			_ => Err(RpcError::MalformedMessage),
		}
	}

	/// Allocates a response channel, writes the `invoke` frame, and awaits
	/// the peer's reply (or the configured `ResponseTimeout`).
	pub async fn invoke(&self, method: impl Into<String>, params: Value) -> ResponseOutcome {
		let (id, rx) = self.broker.borrow_mut().open_channel();
		let message = kgr_object!("action" => "invoke", "id" => id, "method" => method.into(), "params" => params);
		if self.write_value(&message).await.is_err() {
			self.broker.borrow_mut().drop_channel(id);
			return ResponseOutcome::Cancelled;
		}
		match tokio::time::timeout(self.response_timeout, rx).await {
			Ok(Ok(outcome)) => outcome,
			Ok(Err(_)) => ResponseOutcome::Cancelled,
			Err(_) => {
				self.broker.borrow_mut().drop_channel(id);
				ResponseOutcome::Timeout
			}
		}
	}

	/// Sends a `close` action, then closes locally: clears buffers and
	/// resolves every outstanding invoke as `Cancelled`.
	pub async fn close(&self) {
		let _ = self.write_value(&kgr_object!("action" => "close")).await;
		self.closed.set(true);
		self.incoming.borrow_mut().clear();
		self.broker.borrow_mut().cancel_all();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use kestrel_value::Value;

	fn timeout() -> Duration {
		Duration::from_secs(15)
	}

	#[tokio::test]
	async fn invoke_receives_the_peer_response() {
		let (client_io, server_io) = tokio::io::duplex(4096);
		let client = NetInterface::new(client_io, timeout());
		let server = NetInterface::new(server_io, timeout());
		server.register_method("echo", Box::new(|_method, params| MethodOutcome::Result(params)));

		let (outcome, processed) = tokio::join!(client.invoke("echo", kgr_object!("x" => 1i64)), server.process(1));
		assert_eq!(outcome, ResponseOutcome::Result(kgr_object!("x" => 1i64)));
		assert_eq!(processed.unwrap(), 1);
	}

	#[tokio::test]
	async fn unregistered_method_replies_with_an_error() {
		let (client_io, server_io) = tokio::io::duplex(4096);
		let client = NetInterface::new(client_io, timeout());
		let server = NetInterface::new(server_io, timeout());

		let (outcome, processed) = tokio::join!(client.invoke("missing", Value::Null), server.process(1));
		assert!(matches!(outcome, ResponseOutcome::Error(_)));
		assert_eq!(processed.unwrap(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn invoke_times_out_without_a_response() {
		let (client_io, _server_io) = tokio::io::duplex(4096);
		let client = NetInterface::new(client_io, Duration::from_millis(50));
		let outcome = client.invoke("never-answered", Value::Null).await;
		assert_eq!(outcome, ResponseOutcome::Timeout);
	}

	#[tokio::test]
	async fn close_cancels_outstanding_invokes() {
		let (client_io, _server_io) = tokio::io::duplex(4096);
		let client = NetInterface::new(client_io, timeout());
		let (outcome, _) = tokio::join!(client.invoke("stuck", Value::Null), async {
			tokio::task::yield_now().await;
			client.close().await;
		});
		assert_eq!(outcome, ResponseOutcome::Cancelled);
	}
}
