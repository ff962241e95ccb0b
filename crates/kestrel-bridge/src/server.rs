use crate::acl::Principal;
use crate::auth::Authenticator;
use crate::error::BridgeError;
use kestrel_pipe::{ContextManager, Pipe};
use kestrel_rpc::{MethodOutcome, NamedServer, NetInterface, ResponseOutcome, Service};
use kestrel_value::{Value, kgr_object};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use tokio::io::{AsyncRead, AsyncWrite};

struct PipeEntry {
	pipe: Pipe,
	frozen: Cell<bool>,
	queue: RefCell<VecDeque<Value>>,
	/// The local service path this pipe bridges to, when this side is the
	/// one that resolved `connect` against its own `NamedServer`. `None`
	/// for entries created by [`ProxyService`], which represent a pipe
	/// this side opened on its own initiative and so needs no modify-ACL
	/// check on inbound `send`.
	service_path: Option<String>,
}

/// A service that forwards `attach` to a remote peer's named service
/// (spec.md §4.11's `bind`): the peer announced it owns `service_name`, so
/// a local `connect` to that path should tunnel over the wire instead of
/// resolving to anything local.
struct ProxyService<T> {
	service_name: String,
	net: Rc<NetInterface<T>>,
	manager: Rc<ContextManager>,
	pipes: Rc<RefCell<HashMap<i64, Rc<PipeEntry>>>>,
}

impl<T: AsyncRead + AsyncWrite + Unpin + 'static> Service for ProxyService<T> {
	fn attach(&self, pipe: Pipe, manager: &ContextManager) {
		let net = Rc::clone(&self.net);
		let manager_for_forward = Rc::clone(&self.manager);
		let pipes = Rc::clone(&self.pipes);
		let service_name = self.service_name.clone();
		manager.spawn(async move {
			let outcome = net.invoke("connect", kgr_object!("service_name" => service_name)).await;
			let remote_id = match outcome {
				ResponseOutcome::Result(v) => v.as_int(),
				_ => None,
			};
			let Some(remote_id) = remote_id else {
				pipe.close();
				return;
			};
			let entry = Rc::new(PipeEntry { pipe, frozen: Cell::new(false), queue: RefCell::new(VecDeque::new()), service_path: None });
			pipes.borrow_mut().insert(remote_id, Rc::clone(&entry));
			spawn_forwarder(&manager_for_forward, &net, &pipes, remote_id, entry);
			let _ = net.invoke("activate", kgr_object!("pipe_id" => remote_id)).await;
		});
	}
}

/// Drains `entry.pipe`'s read queue, forwarding each value as a wire
/// `send(pipe_id, data)` while thawed, or buffering it while frozen; on
/// local close, tells the peer and forgets the entry. Grounded in
/// spec.md §9's "per-pipe message listener must itself drain the queue"
/// note — this is that listener, expressed as a read loop instead of an
/// `on_message` callback since forwarding needs to `await` the wire write.
fn spawn_forwarder<T: AsyncRead + AsyncWrite + Unpin + 'static>(manager: &Rc<ContextManager>, net: &Rc<NetInterface<T>>, pipes: &Rc<RefCell<HashMap<i64, Rc<PipeEntry>>>>, id: i64, entry: Rc<PipeEntry>) {
	let net = Rc::clone(net);
	let pipes = Rc::clone(pipes);
	manager.spawn(async move {
		loop {
			match entry.pipe.read_wait().await {
				Some(value) if entry.frozen.get() => entry.queue.borrow_mut().push_back(value),
				Some(value) => {
					let _ = net.invoke("send", kgr_object!("pipe_id" => id, "data" => value)).await;
				}
				None => {
					let _ = net.invoke("close", kgr_object!("pipe_id" => id)).await;
					pipes.borrow_mut().remove(&id);
					break;
				}
			}
		}
	});
}

fn acl_denied(path: &str) -> MethodOutcome {
	MethodOutcome::Error(BridgeError::AclDenied(path.to_string()).to_string())
}

/// Extends a [`NetInterface`] with service-transport semantics, bridging
/// a local [`NamedServer`] to a peer, per spec.md §4.11.
pub struct BridgeServer<T> {
	net: Rc<NetInterface<T>>,
	local: Rc<NamedServer>,
	manager: Rc<ContextManager>,
	pipes: Rc<RefCell<HashMap<i64, Rc<PipeEntry>>>>,
	next_pipe_id: Rc<Cell<i64>>,
	principal: Rc<RefCell<Option<Principal>>>,
}

impl<T: AsyncRead + AsyncWrite + Unpin + 'static> BridgeServer<T> {
	pub fn new(net: Rc<NetInterface<T>>, local: Rc<NamedServer>, manager: Rc<ContextManager>, authenticator: Option<Rc<dyn Authenticator>>) -> Self {
		let pipes: Rc<RefCell<HashMap<i64, Rc<PipeEntry>>>> = Rc::new(RefCell::new(HashMap::new()));
		let next_pipe_id = Rc::new(Cell::new(1));
		let principal: Rc<RefCell<Option<Principal>>> = Rc::new(RefCell::new(None));
		let pending_login: Rc<RefCell<Option<(String, String, String)>>> = Rc::new(RefCell::new(None));

		{
			let local = Rc::clone(&local);
			let manager_h = Rc::clone(&manager);
			let pipes_h = Rc::clone(&pipes);
			let next_id = Rc::clone(&next_pipe_id);
			let net_h = Rc::clone(&net);
			let principal_h = Rc::clone(&principal);
			net.register_method(
				"connect",
				Box::new(move |_m, params| {
					let Some(service_name) = params.field("service_name").and_then(Value::as_str).map(str::to_string) else {
						return MethodOutcome::Error("missing service_name".to_string());
					};
					if let Some(principal) = principal_h.borrow().as_ref() {
						if !principal.access.allows(&service_name) {
							return acl_denied(&service_name);
						}
					}
					match local.connect(&service_name, &manager_h) {
						Ok(pipe) => {
							let id = next_id.get();
							next_id.set(id + 1);
							let entry = Rc::new(PipeEntry { pipe, frozen: Cell::new(true), queue: RefCell::new(VecDeque::new()), service_path: Some(service_name) });
							pipes_h.borrow_mut().insert(id, Rc::clone(&entry));
							spawn_forwarder(&manager_h, &net_h, &pipes_h, id, entry);
							MethodOutcome::Result(Value::Int(id))
						}
						Err(err) => MethodOutcome::Error(err.to_string()),
					}
				}),
			);
		}

		{
			let pipes_h = Rc::clone(&pipes);
			let manager_h = Rc::clone(&manager);
			let net_h = Rc::clone(&net);
			net.register_method(
				"activate",
				Box::new(move |_m, params| {
					let Some(id) = params.field("pipe_id").and_then(Value::as_int) else {
						return MethodOutcome::Error("missing pipe_id".to_string());
					};
					let entry = pipes_h.borrow().get(&id).cloned();
					let Some(entry) = entry else {
						return MethodOutcome::Error("unknown pipe".to_string());
					};
					entry.frozen.set(false);
					let drained: Vec<Value> = entry.queue.borrow_mut().drain(..).collect();
					if !drained.is_empty() {
						let net_for_drain = Rc::clone(&net_h);
						manager_h.spawn(async move {
							for value in drained {
								let _ = net_for_drain.invoke("send", kgr_object!("pipe_id" => id, "data" => value)).await;
							}
						});
					}
					MethodOutcome::Result(Value::Null)
				}),
			);
		}

		{
			let pipes_h = Rc::clone(&pipes);
			let principal_h = Rc::clone(&principal);
			net.register_method(
				"send",
				Box::new(move |_m, params| {
					let Some(id) = params.field("pipe_id").and_then(Value::as_int) else {
						return MethodOutcome::Error("missing pipe_id".to_string());
					};
					let data = params.field("data").cloned().unwrap_or(Value::Null);
					match pipes_h.borrow().get(&id) {
						Some(entry) => {
							if let Some(path) = entry.service_path.as_deref() {
								if let Some(principal) = principal_h.borrow().as_ref() {
									if !principal.modify.allows(path) {
										return acl_denied(path);
									}
								}
							}
							match entry.pipe.write(data) {
								Ok(()) => MethodOutcome::Result(Value::Null),
								Err(_) => MethodOutcome::Error("pipe closed".to_string()),
							}
						}
						None => MethodOutcome::Error("unknown pipe".to_string()),
					}
				}),
			);
		}

		{
			let pipes_h = Rc::clone(&pipes);
			net.register_method(
				"close",
				Box::new(move |_m, params| {
					if let Some(id) = params.field("pipe_id").and_then(Value::as_int) {
						if let Some(entry) = pipes_h.borrow_mut().remove(&id) {
							entry.pipe.close();
						}
					}
					MethodOutcome::Result(Value::Null)
				}),
			);
		}

		{
			let local_h = Rc::clone(&local);
			let net_h = Rc::clone(&net);
			let manager_h = Rc::clone(&manager);
			let pipes_h = Rc::clone(&pipes);
			net.register_method(
				"bind",
				Box::new(move |_m, params| {
					let Some(name) = params.field("service_name").and_then(Value::as_str).map(str::to_string) else {
						return MethodOutcome::Error("missing service_name".to_string());
					};
					let proxy = Rc::new(ProxyService { service_name: name.clone(), net: Rc::clone(&net_h), manager: Rc::clone(&manager_h), pipes: Rc::clone(&pipes_h) });
					match local_h.register(&name, proxy) {
						Ok(()) => MethodOutcome::Result(Value::Null),
						Err(err) => MethodOutcome::Error(err.to_string()),
					}
				}),
			);
		}

		{
			let local_h = Rc::clone(&local);
			net.register_method(
				"unbind",
				Box::new(move |_m, params| {
					if let Some(name) = params.field("service_name").and_then(Value::as_str) {
						local_h.deregister(name);
					}
					MethodOutcome::Result(Value::Null)
				}),
			);
		}

		if let Some(authenticator) = authenticator {
			let authenticator_login = Rc::clone(&authenticator);
			let pending = Rc::clone(&pending_login);
			net.register_method(
				"auth/login",
				Box::new(move |_m, params| {
					let Some(user) = params.field("user").and_then(Value::as_str).map(str::to_string) else {
						return MethodOutcome::Error("missing user".to_string());
					};
					let (nonce, key_id) = authenticator_login.login(&user);
					*pending.borrow_mut() = Some((user, nonce.clone(), key_id.clone()));
					MethodOutcome::Result(kgr_object!("nonce" => nonce, "key_id" => key_id))
				}),
			);

			let pending = Rc::clone(&pending_login);
			let principal_h = Rc::clone(&principal);
			net.register_method(
				"auth/respond",
				Box::new(move |_m, params| {
					let Some(response) = params.field("response").and_then(Value::as_str).map(str::to_string) else {
						return MethodOutcome::Error("missing response".to_string());
					};
					let Some((user, nonce, key_id)) = pending.borrow_mut().take() else {
						return MethodOutcome::Error("no login in progress".to_string());
					};
					match authenticator.respond(&user, &nonce, &key_id, &response) {
						Some(principal) => {
							*principal_h.borrow_mut() = Some(principal);
							MethodOutcome::Result(Value::Bool(true))
						}
						None => MethodOutcome::Error(BridgeError::AuthDenied.to_string()),
					}
				}),
			);
		}

		BridgeServer { net, local, manager, pipes, next_pipe_id, principal }
	}

	/// Announces that this side owns `service_name`, asking the peer to
	/// register a proxy pointing back here.
	pub async fn announce(&self, service_name: impl Into<String>) -> Result<(), BridgeError> {
		match self.net.invoke("bind", kgr_object!("service_name" => service_name.into())).await {
			ResponseOutcome::Result(_) => Ok(()),
			ResponseOutcome::Error(msg) => Err(BridgeError::Rpc(kestrel_rpc::RpcError::PathNotFound(msg))),
			ResponseOutcome::Timeout => Err(BridgeError::Rpc(kestrel_rpc::RpcError::Timeout)),
			ResponseOutcome::Cancelled => Err(BridgeError::Rpc(kestrel_rpc::RpcError::Cancelled)),
		}
	}

	/// Authenticates this side to the peer, per spec.md §6's handshake.
	pub async fn login(&self, user: impl Into<String>, compute_response: impl FnOnce(&str, &str) -> String) -> Result<(), BridgeError> {
		let user = user.into();
		let login = self.net.invoke("auth/login", kgr_object!("user" => user.clone())).await;
		let (nonce, key_id) = match login {
			ResponseOutcome::Result(v) => {
				let nonce = v.field("nonce").and_then(Value::as_str).ok_or(BridgeError::MalformedReply)?.to_string();
				let key_id = v.field("key_id").and_then(Value::as_str).ok_or(BridgeError::MalformedReply)?.to_string();
				(nonce, key_id)
			}
			_ => return Err(BridgeError::AuthDenied),
		};
		let response = compute_response(&nonce, &key_id);
		match self.net.invoke("auth/respond", kgr_object!("response" => response)).await {
			ResponseOutcome::Result(Value::Bool(true)) => Ok(()),
			_ => Err(BridgeError::AuthDenied),
		}
	}

	pub fn local_server(&self) -> &Rc<NamedServer> {
		&self.local
	}

	pub fn net(&self) -> &Rc<NetInterface<T>> {
		&self.net
	}

	pub fn context_manager(&self) -> &Rc<ContextManager> {
		&self.manager
	}

	pub fn principal(&self) -> Option<Principal> {
		self.principal.borrow().clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;
	use tokio::task::LocalSet;

	struct Echo;
	impl Service for Echo {
		fn attach(&self, pipe: Pipe, manager: &ContextManager) {
			manager.spawn(async move {
				while let Some(value) = pipe.read_wait().await {
					let _ = pipe.write(value);
				}
			});
		}
	}

	/// Runs both sides' background forwarding/echo contexts concurrently
	/// with the test body's own direct `invoke`/`process` driving, by
	/// spawning a pump context that calls `process` in a tight loop
	/// alongside whatever the test awaits directly.
	fn spawn_pump<T: AsyncRead + AsyncWrite + Unpin + 'static>(manager: &ContextManager, net: Rc<NetInterface<T>>) {
		manager.spawn(async move {
			loop {
				if net.process(1).await.is_err() || net.is_closed() {
					break;
				}
			}
		});
	}

	#[tokio::test]
	async fn echo_round_trip_over_the_bridge() {
		LocalSet::new()
			.run_until(async {
				let manager = Rc::new(ContextManager::new());
				let (master_io, slave_io) = tokio::io::duplex(4096);
				let timeout = Duration::from_secs(5);

				let master_net = Rc::new(NetInterface::new(master_io, timeout));
				let master_local = NamedServer::new();
				master_local.register("/echo", Rc::new(Echo)).unwrap();
				let master = BridgeServer::new(Rc::clone(&master_net), master_local, Rc::clone(&manager), None);
				spawn_pump(&manager, Rc::clone(&master_net));

				let slave_net = Rc::new(NetInterface::new(slave_io, timeout));
				let slave_local = NamedServer::new();
				let slave = BridgeServer::new(Rc::clone(&slave_net), slave_local, Rc::clone(&manager), None);
				spawn_pump(&manager, Rc::clone(&slave_net));

				master.announce("/echo").await.unwrap();
				tokio::task::yield_now().await;

				let pipe = slave.local_server().connect("/echo", &manager).unwrap();
				pipe.write(kestrel_value::Value::Int(7)).unwrap();
				let echoed = pipe.read_wait().await;
				assert_eq!(echoed, Some(kestrel_value::Value::Int(7)));
			})
			.await;
	}

	#[tokio::test]
	async fn connect_is_denied_outside_the_access_whitelist() {
		LocalSet::new()
			.run_until(async {
				let manager = Rc::new(ContextManager::new());
				let (master_io, slave_io) = tokio::io::duplex(4096);
				let timeout = Duration::from_secs(5);

				let master_net = Rc::new(NetInterface::new(master_io, timeout));
				let master_local = NamedServer::new();
				master_local.register("/echo", Rc::new(Echo)).unwrap();
				let master = BridgeServer::new(Rc::clone(&master_net), master_local, Rc::clone(&manager), None);
				*master.principal.borrow_mut() = Some(Principal { name: "u".to_string(), access: crate::acl::Acl::whitelist(["/document"]), modify: crate::acl::Acl::whitelist(["/document"]) });
				spawn_pump(&manager, Rc::clone(&master_net));

				let slave_net = Rc::new(NetInterface::new(slave_io, timeout));
				let slave_local = NamedServer::new();
				let slave = BridgeServer::new(Rc::clone(&slave_net), slave_local, Rc::clone(&manager), None);
				spawn_pump(&manager, Rc::clone(&slave_net));

				master.announce("/echo").await.unwrap();
				tokio::task::yield_now().await;

				let pipe = slave.local_server().connect("/echo", &manager).unwrap();
				for _ in 0..50 {
					if pipe.is_closed() {
						break;
					}
					tokio::task::yield_now().await;
				}
				assert!(pipe.is_closed(), "connect should have been denied and the pipe closed");
				assert!(!master_net.is_closed(), "denial must not tear down the session itself");
			})
			.await;
	}
}
