use tokio_util::sync::{CancellationToken, DropGuard};

/// A cancellation scope grouping futures and deferred tasks so they can be
/// dropped together, per spec.md §4.8/§9 ("Lifetime objects (`StandardLifetime`)
/// scope a group of pending tasks and cancel them collectively on drop").
///
/// Used to tear down every outstanding response handle and deferred task
/// belonging to one connection or one call when that owner goes away,
/// without each of them needing a back-reference to the owner.
pub struct StandardLifetime {
	token: CancellationToken,
}

impl StandardLifetime {
	pub fn new() -> Self {
		StandardLifetime { token: CancellationToken::new() }
	}

	/// A child scope: cancelling the parent cancels every child, but
	/// cancelling a child leaves siblings and the parent untouched.
	pub fn child(&self) -> Self {
		StandardLifetime { token: self.token.child_token() }
	}

	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}

	/// Resolves once this scope is cancelled, directly or via a parent.
	pub async fn cancelled(&self) {
		self.token.cancelled().await;
	}

	pub fn cancel(&self) {
		self.token.cancel();
	}

	/// An RAII guard that cancels this scope when dropped, for tying the
	/// lifetime to the owner's stack frame or struct field instead of
	/// calling `cancel` explicitly.
	pub fn drop_guard(self) -> DropGuard {
		self.token.drop_guard()
	}
}

impl Default for StandardLifetime {
	fn default() -> Self {
		Self::new()
	}
}

impl Clone for StandardLifetime {
	fn clone(&self) -> Self {
		StandardLifetime { token: self.token.clone() }
	}
}
