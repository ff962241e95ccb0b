use crate::dispatch::{DispatchService, MethodTableBuilder};
use kestrel_pipe::{ContextManager, Pipe, StandardLifetime};
use kestrel_rpc::{MethodOutcome, Service};
use kestrel_value::Value;

/// `/editor/shutdown`, per spec.md §6: a single `shutdown` call that
/// cancels the editor's root [`StandardLifetime`], tearing down every
/// pending task and connection scoped under it. No literal method name
/// survives in spec.md's own text beyond the endpoint path, so this keeps
/// to the one operation the endpoint needs.
pub struct ShutdownService {
	lifetime: StandardLifetime,
}

impl ShutdownService {
	pub fn new(lifetime: StandardLifetime) -> Self {
		ShutdownService { lifetime }
	}
}

impl Service for ShutdownService {
	fn attach(&self, pipe: Pipe, manager: &ContextManager) {
		let lifetime = self.lifetime.clone();
		let inner = DispatchService::new(move || {
			let lifetime = lifetime.clone();
			MethodTableBuilder::new()
				.method("shutdown", move |_params| {
					lifetime.cancel();
					MethodOutcome::Result(Value::Null)
				})
				.build()
		});
		inner.attach(pipe, manager);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use kestrel_value::kgr_object;
	use tokio::task::LocalSet;

	#[tokio::test]
	async fn shutdown_call_cancels_the_lifetime() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let lifetime = StandardLifetime::new();
				let service = ShutdownService::new(lifetime.clone());
				let (client, server) = Pipe::pair();
				service.attach(server, &manager);

				assert!(!lifetime.is_cancelled());
				client.write(kgr_object!("method" => "shutdown", "params" => Value::Null)).unwrap();
				client.read_wait().await.unwrap();
				assert!(lifetime.is_cancelled());
			})
			.await;
	}
}
