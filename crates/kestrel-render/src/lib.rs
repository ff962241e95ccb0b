//! Per-document render engine, per spec.md §4.7: an ordered cache keyed by
//! line index, driven by a tagger and a queue of invalidated ranges
//! accumulated from transaction and tag-change listeners.

use kestrel_cache::OrderedCache;
use kestrel_doc::{TagFragment, Tagger, TextPositionRange};
use kestrel_text::{Encoding, TextBlock, TextPosition};
use kestrel_value::{kgr_object, Value};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
	#[error(transparent)]
	Cache(#[from] kestrel_cache::CacheError),
}

/// Whether a `render` call should return every line in range (`Full`) or
/// only the lines the cache didn't already hold (`Partial`), per spec.md
/// §4.7 step 3/4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
	Full,
	Partial,
}

/// Maintains one document's rendered-line cache.
///
/// Callers are responsible for wiring `invalidate` to the document's
/// `TransactionStream::on_change` and `Tagger::on_change` — this type owns
/// only the cache and the invalidation queue, not the listener
/// registrations, so it stays usable from services that don't want a
/// render engine bound to a specific document's lifetime.
pub struct RenderEngine {
	text: Rc<RefCell<TextBlock>>,
	encoding: Box<dyn Encoding>,
	tagger: Option<Rc<RefCell<dyn Tagger<bool>>>>,
	cache: OrderedCache<u64, Value>,
	invalidated: VecDeque<(u64, u64)>,
}

impl RenderEngine {
	pub fn new(text: Rc<RefCell<TextBlock>>, encoding: Box<dyn Encoding>, tagger: Option<Rc<RefCell<dyn Tagger<bool>>>>) -> Self {
		RenderEngine { text, encoding, tagger, cache: OrderedCache::new(), invalidated: VecDeque::new() }
	}

	/// Enqueues a range whose rendered content may have changed. Safe to
	/// call from a `TransactionStream` or `Tagger` change listener.
	pub fn invalidate(&mut self, range: TextPositionRange) {
		self.invalidated.push_back((range.start.line, range.end.line));
	}

	fn drain_invalidated(&mut self) {
		while let Some((from, to)) = self.invalidated.pop_front() {
			self.cache.drop_range(&from, &to);
		}
	}

	/// Renders `height` lines starting at `line`. In [`RenderMode::Full`]
	/// every line in range is returned; in [`RenderMode::Partial`] only
	/// lines the cache didn't already hold are returned.
	pub fn render(&mut self, line: u64, height: u64, mode: RenderMode) -> Result<Vec<(u64, Value)>, RenderError> {
		self.drain_invalidated();
		let last = self.text.borrow().last_line();
		if height == 0 || line > last {
			return Ok(Vec::new());
		}
		let end_line = line.saturating_add(height - 1).min(last);

		let text = Rc::clone(&self.text);
		let tagger = self.tagger.clone();
		let encoding: &dyn Encoding = self.encoding.as_ref();
		let mut supplier = move |from: &u64, to: &u64| -> Vec<Value> { (*from..=*to).map(|l| render_line(&text, tagger.as_ref(), encoding, l)).collect() };

		let rows = match mode {
			RenderMode::Full => self.cache.fetch(&line, &end_line, &mut supplier)?,
			RenderMode::Partial => self.cache.fetch_updated(&line, &end_line, &mut supplier)?,
		};
		Ok(rows)
	}
}

/// Walks one line codepoint by codepoint, switching output fragments on
/// tag-fragment boundaries, and emits `{ tag: bool, content: String }`
/// objects — the cache entry shape the wire protocol sends for one line.
fn render_line(text: &Rc<RefCell<TextBlock>>, tagger: Option<&Rc<RefCell<dyn Tagger<bool>>>>, encoding: &dyn Encoding, line: u64) -> Value {
	let content = text.borrow().get_line(line).map(str::to_string).unwrap_or_default();
	let fragments: Vec<TagFragment<bool>> = tagger.map(|t| t.borrow_mut().get_line(line)).unwrap_or_default();

	let mut idx = 0usize;
	let mut segments: Vec<(bool, String)> = Vec::new();
	let mut col = 0u64;
	encoding.iterate_codepoints(content.as_bytes(), &mut |_start, _len, ch| {
		let pos = TextPosition::new(line, col);
		while idx < fragments.len() && fragments[idx].end <= pos {
			idx += 1;
		}
		let tagged = idx < fragments.len() && fragments[idx].start <= pos && pos < fragments[idx].end;
		match segments.last_mut() {
			Some((current, text)) if *current == tagged => text.push(ch),
			_ => segments.push((tagged, ch.to_string())),
		}
		col += 1;
		true
	});
	if segments.is_empty() {
		segments.push((false, String::new()));
	}

	Value::Array(segments.into_iter().map(|(tag, content)| kgr_object!("tag" => tag, "content" => content)).collect())
}
