use crate::dispatch::{DispatchService, MethodTableBuilder};
use crate::error::ServiceError;
use kestrel_bridge::{Acl, Authenticator, Principal};
use kestrel_pipe::{ContextManager, Pipe};
use kestrel_rpc::{MethodOutcome, Service};
use kestrel_value::{Value, kgr_object};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

struct UserEntry {
	secret: String,
	principal: Principal,
}

/// The registry `/editor/authorization` edits and [`DirectoryAuthenticator`]
/// consults, per spec.md §4.11/§6: a name maps to a shared secret plus the
/// [`Principal`] (access/modify [`Acl`]s) a successful login grants.
#[derive(Default)]
pub struct UserDirectory {
	users: RefCell<HashMap<String, UserEntry>>,
}

impl UserDirectory {
	pub fn new() -> Rc<Self> {
		Rc::new(UserDirectory::default())
	}

	fn add(&self, name: String, secret: String, access: Acl, modify: Acl) {
		let principal = Principal { name: name.clone(), access, modify };
		self.users.borrow_mut().insert(name, UserEntry { secret, principal });
	}

	fn remove(&self, name: &str) -> bool {
		self.users.borrow_mut().remove(name).is_some()
	}

	fn names(&self) -> Vec<String> {
		self.users.borrow().keys().cloned().collect()
	}

	fn check(&self, name: &str, response: &str) -> Option<Principal> {
		let users = self.users.borrow();
		let entry = users.get(name)?;
		if entry.secret == response { Some(entry.principal.clone()) } else { None }
	}
}

/// An [`Authenticator`] backed by a [`UserDirectory`] instead of one fixed
/// shared secret, so `/editor/authorization` can add and remove principals
/// at runtime. The nonce/key id shape mirrors
/// [`kestrel_bridge::SharedSecretAuthenticator`] — neither is a real
/// challenge protocol, both stand in for spec.md §6's raw handshake bytes.
pub struct DirectoryAuthenticator {
	directory: Rc<UserDirectory>,
}

impl DirectoryAuthenticator {
	pub fn new(directory: Rc<UserDirectory>) -> Self {
		DirectoryAuthenticator { directory }
	}
}

impl Authenticator for DirectoryAuthenticator {
	fn login(&self, user: &str) -> (String, String) {
		(format!("nonce-for-{user}"), "directory".to_string())
	}

	fn respond(&self, user: &str, _nonce: &str, _key_id: &str, response: &str) -> Option<Principal> {
		self.directory.check(user, response)
	}
}

fn acl_param(params: &Value, key: &str) -> Acl {
	match params.field(key).and_then(Value::as_array) {
		Some(prefixes) => Acl::whitelist(prefixes.iter().filter_map(Value::as_str).map(str::to_string)),
		None => Acl::allow_all(),
	}
}

/// `/editor/authorization`, per spec.md §6: administers the
/// [`UserDirectory`] a [`DirectoryAuthenticator`] checks logins against —
/// `addUser`, `removeUser`, `listUsers`.
pub struct AuthorizationService {
	directory: Rc<UserDirectory>,
}

impl AuthorizationService {
	pub fn new(directory: Rc<UserDirectory>) -> Self {
		AuthorizationService { directory }
	}
}

impl Service for AuthorizationService {
	fn attach(&self, pipe: Pipe, manager: &ContextManager) {
		let directory = Rc::clone(&self.directory);
		let inner = DispatchService::new(move || {
			let directory_add = Rc::clone(&directory);
			let directory_remove = Rc::clone(&directory);
			let directory_list = Rc::clone(&directory);

			MethodTableBuilder::new()
				.method("addUser", move |params| {
					let Some(name) = params.field("name").and_then(Value::as_str).map(str::to_string) else {
						return ServiceError::BadParams("missing name".to_string()).into();
					};
					let Some(secret) = params.field("secret").and_then(Value::as_str).map(str::to_string) else {
						return ServiceError::BadParams("missing secret".to_string()).into();
					};
					let access = acl_param(&params, "access");
					let modify = acl_param(&params, "modify");
					directory_add.add(name, secret, access, modify);
					MethodOutcome::Result(Value::Null)
				})
				.method("removeUser", move |params| {
					let Some(name) = params.as_str() else {
						return ServiceError::BadParams("missing name".to_string()).into();
					};
					MethodOutcome::Result(Value::Bool(directory_remove.remove(name)))
				})
				.method("listUsers", move |_params| MethodOutcome::Result(Value::Array(directory_list.names().into_iter().map(Value::String).collect())))
				.build()
		});
		inner.attach(pipe, manager);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::task::LocalSet;

	#[tokio::test]
	async fn added_user_is_listed_and_authenticates_with_their_secret() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let directory = UserDirectory::new();
				let service = AuthorizationService::new(Rc::clone(&directory));
				let (client, server) = Pipe::pair();
				service.attach(server, &manager);

				client
					.write(kgr_object!("method" => "addUser", "params" => kgr_object!("name" => "alice", "secret" => "swordfish", "access" => vec![Value::String("/document".to_string())])))
					.unwrap();
				client.read_wait().await.unwrap();

				client.write(kgr_object!("method" => "listUsers", "params" => Value::Null)).unwrap();
				let reply = client.read_wait().await.unwrap();
				assert_eq!(reply.as_array().unwrap(), &[Value::String("alice".to_string())]);

				let auth = DirectoryAuthenticator::new(Rc::clone(&directory));
				let principal = auth.respond("alice", "nonce", "key", "swordfish").unwrap();
				assert!(principal.access.allows("/document/cursor"));
				assert!(!principal.access.allows("/screen/manager"));
				assert!(auth.respond("alice", "nonce", "key", "wrong").is_none());
			})
			.await;
	}

	#[tokio::test]
	async fn removed_user_can_no_longer_authenticate() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let directory = UserDirectory::new();
				let service = AuthorizationService::new(Rc::clone(&directory));
				let (client, server) = Pipe::pair();
				service.attach(server, &manager);

				client.write(kgr_object!("method" => "addUser", "params" => kgr_object!("name" => "bob", "secret" => "hunter2"))).unwrap();
				client.read_wait().await.unwrap();

				client.write(kgr_object!("method" => "removeUser", "params" => Value::String("bob".to_string()))).unwrap();
				let reply = client.read_wait().await.unwrap();
				assert_eq!(reply, Value::Bool(true));

				let auth = DirectoryAuthenticator::new(directory);
				assert!(auth.respond("bob", "nonce", "key", "hunter2").is_none());
			})
			.await;
	}
}
