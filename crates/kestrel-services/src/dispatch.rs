use kestrel_pipe::{ContextManager, Pipe};
use kestrel_rpc::{MethodOutcome, Service};
use kestrel_value::{Value, kgr_object};
use std::collections::HashMap;

/// A single method on a [`MethodTable`]: takes the request's `params` and
/// answers with a result or an error message.
pub type MethodHandler = Box<dyn Fn(Value) -> MethodOutcome>;

/// The set of methods one connection to a service answers, built fresh
/// per connection so each table's closures can close over their own
/// connection-local state (a bound document, a cursor position, ...).
pub type MethodTable = HashMap<String, MethodHandler>;

#[derive(Default)]
pub struct MethodTableBuilder {
	methods: MethodTable,
}

impl MethodTableBuilder {
	pub fn new() -> Self {
		MethodTableBuilder::default()
	}

	pub fn method(mut self, name: &str, handler: impl Fn(Value) -> MethodOutcome + 'static) -> Self {
		self.methods.insert(name.to_string(), Box::new(handler));
		self
	}

	pub fn build(self) -> MethodTable {
		self.methods
	}
}

/// A [`Service`] that speaks the `{method, params}` request /
/// bare-value-or-`{error}` reply convention shared by every endpoint in
/// spec.md §6: each connection gets its own [`MethodTable`] from `build`,
/// and every request read off the pipe is dispatched against it until the
/// pipe closes.
pub struct DispatchService<F> {
	build: F,
}

impl<F> DispatchService<F>
where
	F: Fn() -> MethodTable + 'static,
{
	pub fn new(build: F) -> Self {
		DispatchService { build }
	}
}

impl<F> Service for DispatchService<F>
where
	F: Fn() -> MethodTable + 'static,
{
	fn attach(&self, pipe: Pipe, manager: &ContextManager) {
		let methods = (self.build)();
		manager.spawn(async move {
			while let Some(request) = pipe.read_wait().await {
				let method = request.field("method").and_then(Value::as_str).unwrap_or_default().to_string();
				let params = request.field("params").cloned().unwrap_or(Value::Null);
				let outcome = match methods.get(method.as_str()) {
					Some(handler) => handler(params),
					None => MethodOutcome::Error(format!("Unknown method: {method}")),
				};
				let reply = match outcome {
					MethodOutcome::Result(value) => value,
					MethodOutcome::Error(message) => kgr_object!("error" => message),
				};
				if pipe.write(reply).is_err() {
					break;
				}
			}
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use kestrel_pipe::ContextManager;
	use tokio::task::LocalSet;

	#[tokio::test]
	async fn dispatches_registered_methods_by_name() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let service = DispatchService::new(|| MethodTableBuilder::new().method("double", |params| MethodOutcome::Result(Value::Int(params.as_int().unwrap_or(0) * 2))).build());
				let (ours, theirs) = Pipe::pair();
				service.attach(theirs, &manager);
				ours.write(kgr_object!("method" => "double", "params" => 21_i64)).unwrap();
				assert_eq!(ours.read_wait().await, Some(Value::Int(42)));
			})
			.await;
	}

	#[tokio::test]
	async fn unknown_method_replies_with_an_error_object() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let service = DispatchService::new(|| MethodTableBuilder::new().build());
				let (ours, theirs) = Pipe::pair();
				service.attach(theirs, &manager);
				ours.write(kgr_object!("method" => "missing", "params" => Value::Null)).unwrap();
				let reply = ours.read_wait().await.unwrap();
				assert!(reply.field("error").is_some());
			})
			.await;
	}
}
