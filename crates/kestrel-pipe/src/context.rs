use std::future::Future;

/// A unit of work retried until it reports completion, per spec.md §9:
/// "a closure that returns `bool` ('retry me'); the scheduler re-queues it
/// until it returns `false`." `true` means not done yet, `false` means
/// done — this polarity is load-bearing, not a convention to flip.
pub type DeferredTask = Box<dyn FnMut() -> bool>;

/// A handle for binding contexts (service-side handlers bound to one
/// endpoint [`crate::Pipe`]) and deferred tasks onto the cooperative
/// single-thread runtime, per spec.md §4.8.
///
/// This type carries no state of its own. The runtime it schedules onto
/// is a `tokio::task::LocalSet` driven by a current-thread
/// [`tokio::runtime::Runtime`], set up once at the process entry point (or,
/// in tests, around the test body) — not owned here, since contexts are
/// `!Send` (most close over `Rc`-based document/registry state) and so
/// must all live on the one thread that owns that `LocalSet`.
/// `ContextManager::spawn`/`defer` must therefore be called from within an
/// active `LocalSet` (established via `LocalSet::run_until` or
/// `LocalSet::enter`); outside one, `tokio::task::spawn_local` panics, and
/// so does this.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextManager;

impl ContextManager {
	pub fn new() -> Self {
		ContextManager
	}

	/// Binds a context onto the runtime. The future runs cooperatively
	/// alongside every other registered context and must never block the
	/// thread — it should only ever await a [`crate::Pipe::read_wait`] or
	/// `tokio::task::yield_now`.
	pub fn spawn(&self, context: impl Future<Output = ()> + 'static) {
		tokio::task::spawn_local(context);
	}

	/// Schedules a deferred task: a closure retried, with cooperative
	/// yields between attempts, until it reports `false`.
	pub fn defer(&self, mut task: DeferredTask) {
		self.spawn(async move {
			while task() {
				tokio::task::yield_now().await;
			}
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::RefCell;
	use std::rc::Rc;
	use tokio::task::LocalSet;

	#[tokio::test]
	async fn deferred_task_is_retried_until_it_reports_done() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let attempts = Rc::new(RefCell::new(0));
				let attempts_inner = Rc::clone(&attempts);
				manager.defer(Box::new(move || {
					*attempts_inner.borrow_mut() += 1;
					*attempts_inner.borrow() < 3
				}));
				while *attempts.borrow() < 3 {
					tokio::task::yield_now().await;
				}
				assert_eq!(*attempts.borrow(), 3);
			})
			.await;
	}

	#[tokio::test]
	async fn task_reporting_done_immediately_runs_once() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let attempts = Rc::new(RefCell::new(0));
				let attempts_inner = Rc::clone(&attempts);
				manager.defer(Box::new(move || {
					*attempts_inner.borrow_mut() += 1;
					false
				}));
				tokio::task::yield_now().await;
				assert_eq!(*attempts.borrow(), 1);
			})
			.await;
	}

	#[tokio::test]
	async fn multiple_contexts_make_independent_progress() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let (pipe_a, pipe_b) = crate::Pipe::pair();
				let received = Rc::new(RefCell::new(Vec::new()));
				let received_inner = Rc::clone(&received);
				pipe_b.write(kestrel_value::Value::Int(42)).unwrap();
				pipe_b.close();
				manager.spawn(async move {
					while let Some(value) = pipe_a.read_wait().await {
						received_inner.borrow_mut().push(value);
					}
				});
				while received.borrow().is_empty() {
					tokio::task::yield_now().await;
				}
				assert_eq!(*received.borrow(), vec![kestrel_value::Value::Int(42)]);
			})
			.await;
	}
}
