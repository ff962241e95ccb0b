use crate::error::ScreenError;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, ThreadId};

/// Global serialization for the screen component tree, per spec.md §4.12/§5:
/// a mutex plus a record of which thread currently holds it. `lock()`
/// refuses instead of blocking when the calling thread already holds it —
/// a plain `Mutex` would simply hang, since it isn't reentrant — so a
/// client forwarding a call from inside a handler it already holds the
/// monitor for gets `DeadlockPrevented` instead of a frozen process.
pub struct Monitor<T> {
	inner: Mutex<T>,
	holder: Mutex<Option<ThreadId>>,
}

impl<T> Monitor<T> {
	pub fn new(value: T) -> Self {
		Monitor { inner: Mutex::new(value), holder: Mutex::new(None) }
	}

	/// Whether the calling thread is the one currently holding the lock.
	/// Clients check this before making a synchronous call that would
	/// re-enter the monitor, per spec.md §5's deadlock-prevention note.
	pub fn is_holder(&self) -> bool {
		*self.holder.lock().expect("monitor holder mutex poisoned") == Some(thread::current().id())
	}

	pub fn lock(&self) -> Result<MonitorGuard<'_, T>, ScreenError> {
		if self.is_holder() {
			tracing::warn!(thread = ?thread::current().id(), "refusing reentrant screen monitor lock");
			return Err(ScreenError::DeadlockPrevented);
		}
		let guard = self.inner.lock().expect("monitor mutex poisoned");
		*self.holder.lock().expect("monitor holder mutex poisoned") = Some(thread::current().id());
		Ok(MonitorGuard { guard, holder: &self.holder })
	}
}

pub struct MonitorGuard<'a, T> {
	guard: MutexGuard<'a, T>,
	holder: &'a Mutex<Option<ThreadId>>,
}

impl<'a, T> Deref for MonitorGuard<'a, T> {
	type Target = T;
	fn deref(&self) -> &T {
		&self.guard
	}
}

impl<'a, T> DerefMut for MonitorGuard<'a, T> {
	fn deref_mut(&mut self) -> &mut T {
		&mut self.guard
	}
}

impl<'a, T> Drop for MonitorGuard<'a, T> {
	fn drop(&mut self) {
		*self.holder.lock().expect("monitor holder mutex poisoned") = None;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lock_grants_exclusive_access() {
		let monitor = Monitor::new(0);
		{
			let mut guard = monitor.lock().unwrap();
			*guard += 1;
		}
		assert_eq!(*monitor.lock().unwrap(), 1);
	}

	#[test]
	fn is_holder_is_true_only_while_locked_on_this_thread() {
		let monitor = Monitor::new(());
		assert!(!monitor.is_holder());
		let guard = monitor.lock().unwrap();
		assert!(monitor.is_holder());
		drop(guard);
		assert!(!monitor.is_holder());
	}

	#[test]
	fn relocking_from_the_holding_thread_is_refused_not_blocked() {
		let monitor = Monitor::new(());
		let _guard = monitor.lock().unwrap();
		let err = monitor.lock().unwrap_err();
		assert_eq!(err, ScreenError::DeadlockPrevented);
	}

	#[test]
	fn another_thread_can_lock_once_the_holder_releases() {
		use std::sync::Arc;
		let monitor = Arc::new(Monitor::new(0));
		{
			let mut guard = monitor.lock().unwrap();
			*guard = 7;
		}
		let other = Arc::clone(&monitor);
		let handle = thread::spawn(move || *other.lock().unwrap());
		assert_eq!(handle.join().unwrap(), 7);
	}
}
