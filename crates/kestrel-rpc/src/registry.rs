use crate::RpcError;
use kestrel_pipe::{ContextManager, Pipe};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// A service bound into a [`NamedServer`]. `attach` is called once per
/// `connect`: it receives one end of a fresh pipe pair and is responsible
/// for binding a context to it on the given manager (spec.md §4.9).
pub trait Service {
	fn attach(&self, pipe: Pipe, manager: &ContextManager);
}

fn normalize(path: &str) -> String {
	let trimmed = path.trim_end_matches('/');
	if trimmed.is_empty() { "/".to_string() } else if trimmed.starts_with('/') { trimmed.to_string() } else { format!("/{trimmed}") }
}

/// A mapping from absolute service path to a [`Service`], with path
/// aliasing, per spec.md §4.9.
///
/// Open question (spec.md §9): the source leaves behavior unspecified when
/// a registration's path prefixes an already-registered service's path
/// (e.g. registering `/document` while `/document/cursor` is live). This
/// implementation rejects neither direction implicitly — paths are keyed
/// exactly, so `/document` and `/document/cursor` are independent
/// registrations and a `connect("/document")` with no exact-match service
/// simply fails `PathNotFound`, same as any other unregistered path.
pub struct NamedServer {
	services: RefCell<HashMap<String, Rc<dyn Service>>>,
	aliases: RefCell<HashMap<String, String>>,
}

impl NamedServer {
	pub fn new() -> Rc<Self> {
		Rc::new(NamedServer { services: RefCell::new(HashMap::new()), aliases: RefCell::new(HashMap::new()) })
	}

	pub fn register(&self, path: impl AsRef<str>, service: Rc<dyn Service>) -> Result<(), RpcError> {
		let path = normalize(path.as_ref());
		let mut services = self.services.borrow_mut();
		if services.contains_key(&path) {
			return Err(RpcError::AlreadyRegistered(path));
		}
		services.insert(path, service);
		Ok(())
	}

	pub fn deregister(&self, path: impl AsRef<str>) {
		self.services.borrow_mut().remove(&normalize(path.as_ref()));
	}

	/// Registers `from` as an alias resolving to `to` (e.g.
	/// `"/screen/manager"` resolving to an internal screen-service path).
	pub fn alias(&self, from: impl AsRef<str>, to: impl AsRef<str>) {
		self.aliases.borrow_mut().insert(normalize(from.as_ref()), normalize(to.as_ref()));
	}

	fn resolve(&self, path: &str) -> String {
		let normalized = normalize(path);
		self.aliases.borrow().get(&normalized).cloned().unwrap_or(normalized)
	}

	pub fn registered(&self, path: impl AsRef<str>) -> bool {
		self.services.borrow().contains_key(&self.resolve(path.as_ref()))
	}

	/// Allocates a fresh pipe pair, hands one end to the service's
	/// `attach`, and returns the other end to the caller.
	pub fn connect(&self, path: impl AsRef<str>, manager: &ContextManager) -> Result<Pipe, RpcError> {
		let resolved = self.resolve(path.as_ref());
		let service = self.services.borrow().get(&resolved).cloned().ok_or_else(|| RpcError::PathNotFound(resolved.clone()))?;
		let (ours, theirs) = Pipe::pair();
		service.attach(ours, manager);
		Ok(theirs)
	}

	/// A reusable factory closure equivalent to `|| connect(path)`.
	pub fn connector(self: &Rc<Self>, path: impl AsRef<str>) -> impl Fn(&ContextManager) -> Result<Pipe, RpcError> {
		let server = Rc::clone(self);
		let path = normalize(path.as_ref());
		move |manager: &ContextManager| server.connect(&path, manager)
	}
}
