/// RAII handle for a registered change listener, shared by
/// [`crate::TransactionStream`] and the [`crate::Tagger`] family.
///
/// Holds a type-erased removal closure rather than a back-reference to the
/// registry it came from, so listener and publisher never form a cycle
/// (spec.md §9's note on avoiding tagger/updater back-references). Dropping
/// it — or calling [`Unsubscribe::cancel`] explicitly — removes the
/// listener; both do the same thing, `cancel` just makes the removal
/// visible at the call site.
pub struct Unsubscribe(Option<Box<dyn FnOnce()>>);

impl Unsubscribe {
	pub(crate) fn new(remove: impl FnOnce() + 'static) -> Self {
		Unsubscribe(Some(Box::new(remove)))
	}

	/// A token for a listener registration that never needs removing, e.g.
	/// one that was never actually stored (see [`crate::NullTagger`]).
	pub fn noop() -> Self {
		Unsubscribe(None)
	}

	pub fn cancel(mut self) {
		if let Some(remove) = self.0.take() {
			remove()
		}
	}
}

impl Drop for Unsubscribe {
	fn drop(&mut self) {
		if let Some(remove) = self.0.take() {
			remove()
		}
	}
}
