use crate::Unsubscribe;
use kestrel_text::TextPosition;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::rc::Rc;

/// A contiguous run of text sharing one tag value, per spec.md §3.
///
/// `start < end` always holds; construct through [`TagFragment::new`] rather
/// than the struct literal to keep that invariant in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFragment<T> {
	pub start: TextPosition,
	pub end: TextPosition,
	pub tag: T,
}

impl<T> TagFragment<T> {
	pub fn new(start: TextPosition, end: TextPosition, tag: T) -> Self {
		debug_assert!(start < end, "tag fragment must cover a non-empty range");
		TagFragment { start, end, tag }
	}
}

/// A range of positions whose tags may have changed — emitted upward by
/// every layer of the tagger stack so the render cache knows what to drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextPositionRange {
	pub start: TextPosition,
	pub end: TextPosition,
}

type ChangeListener = Box<dyn FnMut(TextPositionRange)>;

struct ChangeHub {
	next_id: u64,
	listeners: Vec<(u64, ChangeListener)>,
}

impl ChangeHub {
	fn new() -> Rc<RefCell<Self>> {
		Rc::new(RefCell::new(ChangeHub { next_id: 0, listeners: Vec::new() }))
	}
}

fn subscribe(hub: &Rc<RefCell<ChangeHub>>, f: ChangeListener) -> Unsubscribe {
	let mut inner = hub.borrow_mut();
	let id = inner.next_id;
	inner.next_id += 1;
	inner.listeners.push((id, f));
	let weak = Rc::downgrade(hub);
	Unsubscribe::new(move || {
		if let Some(hub) = weak.upgrade() {
			hub.borrow_mut().listeners.retain(|(entry_id, _)| *entry_id != id);
		}
	})
}

fn publish(hub: &Rc<RefCell<ChangeHub>>, range: TextPositionRange) {
	for (_, listener) in hub.borrow_mut().listeners.iter_mut() {
		listener(range);
	}
}

/// A forward producer of tag fragments in position order, driven by a
/// [`LazyTagger`]. `rewind` discards cached work at or past a position
/// (used when upstream text changes); `on_change` lets the iterator itself
/// report ranges whose tags it knows changed (e.g. because it watches a
/// [`crate::TransactionStream`]).
pub trait TagIterator<T> {
	fn next(&mut self) -> Option<TagFragment<T>>;
	fn rewind(&mut self, pos: TextPosition);
	fn on_change(&mut self, f: Box<dyn FnMut(TextPositionRange)>) -> Unsubscribe;
}

/// The outward interface shared by every tagger layer.
pub trait Tagger<T> {
	/// The fragment enclosing `pos`, if any.
	fn get(&mut self, pos: TextPosition) -> Option<TagFragment<T>>;
	/// All fragments overlapping `line`, ordered by start and pairwise
	/// disjoint.
	fn get_line(&mut self, line: u64) -> Vec<TagFragment<T>>;
	fn on_change(&mut self, f: Box<dyn FnMut(TextPositionRange)>) -> Unsubscribe;
}

/// A [`TagIterator`] that never yields a fragment and never changes.
/// Grounded in spec.md §8 scenario 1, where an untagged document still
/// needs a tagger to satisfy the render pipeline's interface.
pub struct NullTagger<T>(PhantomData<T>);

impl<T> NullTagger<T> {
	pub fn new() -> Self {
		NullTagger(PhantomData)
	}
}

impl<T> Default for NullTagger<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T> TagIterator<T> for NullTagger<T> {
	fn next(&mut self) -> Option<TagFragment<T>> {
		None
	}

	fn rewind(&mut self, _pos: TextPosition) {}

	fn on_change(&mut self, _f: Box<dyn FnMut(TextPositionRange)>) -> Unsubscribe {
		Unsubscribe::noop()
	}
}

/// A [`TagIterator`] that tags every run of consecutive tab characters on
/// every line, reading line contents lazily through a supplied accessor.
/// Used by the render pipeline's tab-expansion scenario (spec.md §8).
pub struct TabTagger<F> {
	line_text: F,
	last_line: u64,
	line: u64,
	pending: std::vec::IntoIter<TagFragment<bool>>,
}

impl<F: FnMut(u64) -> Option<String>> TabTagger<F> {
	pub fn new(last_line: u64, line_text: F) -> Self {
		TabTagger { line_text, last_line, line: 0, pending: Vec::new().into_iter() }
	}

	fn fill_line(&mut self, line: u64) {
		let fragments = match (self.line_text)(line) {
			Some(text) => tab_runs(line, &text),
			None => Vec::new(),
		};
		self.pending = fragments.into_iter();
	}
}

fn tab_runs(line: u64, text: &str) -> Vec<TagFragment<bool>> {
	let mut fragments = Vec::new();
	let mut run_start: Option<u64> = None;
	for (col, ch) in text.chars().enumerate() {
		let col = col as u64;
		if ch == '\t' {
			run_start.get_or_insert(col);
		} else if let Some(start) = run_start.take() {
			fragments.push(TagFragment::new(TextPosition::new(line, start), TextPosition::new(line, col), true));
		}
	}
	if let Some(start) = run_start {
		let end = text.chars().count() as u64;
		fragments.push(TagFragment::new(TextPosition::new(line, start), TextPosition::new(line, end), true));
	}
	fragments
}

impl<F: FnMut(u64) -> Option<String>> TagIterator<bool> for TabTagger<F> {
	fn next(&mut self) -> Option<TagFragment<bool>> {
		loop {
			if let Some(fragment) = self.pending.next() {
				return Some(fragment);
			}
			if self.line > self.last_line {
				return None;
			}
			self.fill_line(self.line);
			self.line += 1;
		}
	}

	fn rewind(&mut self, pos: TextPosition) {
		self.line = pos.line;
		self.pending = Vec::new().into_iter();
	}

	fn on_change(&mut self, _f: Box<dyn FnMut(TextPositionRange)>) -> Unsubscribe {
		// A tab tagger only reacts to text edits, which the lazy layer above
		// already turns into a rewind; it never originates changes itself.
		Unsubscribe::noop()
	}
}

/// Wraps a [`TagIterator`], answering point/line queries by driving the
/// iterator forward and remembering what it has already produced.
///
/// On an upstream change at range `R` it drops every cached fragment
/// intersecting `R`, rewinds the iterator to `R.start`, and re-emits the
/// change to its own listeners, exactly per spec.md §4.5 layer 2.
pub struct LazyTagger<T> {
	iter: Box<dyn TagIterator<T>>,
	produced: BTreeMap<TextPosition, TagFragment<T>>,
	exhausted: bool,
	pending_rewind: Rc<RefCell<Option<TextPosition>>>,
	hub: Rc<RefCell<ChangeHub>>,
	_upstream_sub: Unsubscribe,
}

impl<T: Clone + 'static> LazyTagger<T> {
	pub fn new(mut iter: Box<dyn TagIterator<T>>) -> Self {
		let hub = ChangeHub::new();
		let pending_rewind = Rc::new(RefCell::new(None::<TextPosition>));
		let hub_for_upstream = Rc::clone(&hub);
		let pending_for_upstream = Rc::clone(&pending_rewind);
		let upstream_sub = iter.on_change(Box::new(move |range: TextPositionRange| {
			let mut pending = pending_for_upstream.borrow_mut();
			*pending = Some(match *pending {
				Some(existing) => existing.min(range.start),
				None => range.start,
			});
			publish(&hub_for_upstream, range);
		}));
		LazyTagger { iter, produced: BTreeMap::new(), exhausted: false, pending_rewind, hub, _upstream_sub: upstream_sub }
	}

	fn apply_pending_rewind(&mut self) {
		if let Some(pos) = self.pending_rewind.borrow_mut().take() {
			self.produced.retain(|start, _| *start < pos);
			self.iter.rewind(pos);
			self.exhausted = false;
		}
	}

	fn advance_until(&mut self, pos: TextPosition) {
		self.apply_pending_rewind();
		while !self.exhausted {
			if let Some(last) = self.produced.values().next_back() {
				if last.end > pos {
					break;
				}
			}
			match self.iter.next() {
				Some(fragment) => {
					self.produced.insert(fragment.start, fragment);
				}
				None => self.exhausted = true,
			}
		}
	}
}

impl<T: Clone + 'static> Tagger<T> for LazyTagger<T> {
	fn get(&mut self, pos: TextPosition) -> Option<TagFragment<T>> {
		self.advance_until(pos);
		self.produced.range(..=pos).next_back().map(|(_, f)| f.clone()).filter(|f| f.start <= pos && pos < f.end)
	}

	fn get_line(&mut self, line: u64) -> Vec<TagFragment<T>> {
		let line_end = TextPosition::new(line + 1, 0);
		self.advance_until(line_end);
		self.produced.values().filter(|f| f.start.line <= line && f.end.line >= line).cloned().collect()
	}

	fn on_change(&mut self, f: Box<dyn FnMut(TextPositionRange)>) -> Unsubscribe {
		subscribe(&self.hub, f)
	}
}

/// Materializes per-line fragment lists for fast repeated reads, per
/// spec.md §4.5 layer 3. Invalidates whole lines overlapping each change
/// range rather than individual fragments.
pub struct CacheTagger<T> {
	inner: LazyTagger<T>,
	lines: Rc<RefCell<BTreeMap<u64, Vec<TagFragment<T>>>>>,
	hub: Rc<RefCell<ChangeHub>>,
	_inner_sub: Unsubscribe,
}

impl<T: Clone + 'static> CacheTagger<T> {
	pub fn new(mut inner: LazyTagger<T>) -> Self {
		let hub = ChangeHub::new();
		let lines = Rc::new(RefCell::new(BTreeMap::new()));
		let lines_for_upstream = Rc::clone(&lines);
		let hub_for_upstream = Rc::clone(&hub);
		let inner_sub = inner.on_change(Box::new(move |range: TextPositionRange| {
			lines_for_upstream.borrow_mut().retain(|line, _| *line < range.start.line || *line > range.end.line);
			publish(&hub_for_upstream, range);
		}));
		CacheTagger { inner, lines, hub, _inner_sub: inner_sub }
	}
}

impl<T: Clone + 'static> Tagger<T> for CacheTagger<T> {
	fn get(&mut self, pos: TextPosition) -> Option<TagFragment<T>> {
		self.get_line(pos.line).into_iter().find(|f| f.start <= pos && pos < f.end)
	}

	fn get_line(&mut self, line: u64) -> Vec<TagFragment<T>> {
		if let Some(cached) = self.lines.borrow().get(&line) {
			return cached.clone();
		}
		let fragments = self.inner.get_line(line);
		self.lines.borrow_mut().insert(line, fragments.clone());
		fragments
	}

	fn on_change(&mut self, f: Box<dyn FnMut(TextPositionRange)>) -> Unsubscribe {
		let sub = subscribe(&self.hub, f);
		sub
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn lines() -> Vec<&'static str> {
		vec!["a\tb", "\tc\td", "no tabs"]
	}

	fn tab_iter() -> TabTagger<impl FnMut(u64) -> Option<String>> {
		let text = lines();
		TabTagger::new((text.len() - 1) as u64, move |line| text.get(line as usize).map(|s| s.to_string()))
	}

	#[test]
	fn tab_tagger_finds_every_run() {
		let mut iter = tab_iter();
		let mut fragments = Vec::new();
		while let Some(f) = iter.next() {
			fragments.push((f.start, f.end));
		}
		assert_eq!(
			fragments,
			vec![
				(TextPosition::new(0, 1), TextPosition::new(0, 2)),
				(TextPosition::new(1, 0), TextPosition::new(1, 1)),
				(TextPosition::new(1, 2), TextPosition::new(1, 3)),
			]
		);
	}

	#[test]
	fn lazy_tagger_get_line_returns_disjoint_fragments_in_order() {
		let iter = tab_iter();
		let mut lazy = LazyTagger::new(Box::new(iter));
		let fragments = lazy.get_line(1);
		assert_eq!(fragments.len(), 2);
		assert!(fragments[0].start < fragments[1].start);
	}

	#[test]
	fn lazy_tagger_get_returns_none_outside_any_fragment() {
		let iter = tab_iter();
		let mut lazy = LazyTagger::new(Box::new(iter));
		assert!(lazy.get(TextPosition::new(2, 0)).is_none());
		assert!(lazy.get(TextPosition::new(0, 1)).is_some());
	}

	#[test]
	fn cache_tagger_serves_repeated_reads_without_redriving_inner() {
		let iter = tab_iter();
		let lazy = LazyTagger::new(Box::new(iter));
		let mut cache = CacheTagger::new(lazy);
		let first = cache.get_line(1);
		let second = cache.get_line(1);
		assert_eq!(first, second);
	}

	#[test]
	fn null_tagger_never_yields() {
		let mut n: NullTagger<()> = NullTagger::new();
		assert!(n.next().is_none());
	}
}
