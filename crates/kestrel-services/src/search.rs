use crate::dispatch::{DispatchService, MethodTableBuilder};
use crate::error::ServiceError;
use kestrel_doc::{Document, DocumentSet, Transaction, TransactionStream};
use kestrel_pipe::{ContextManager, Pipe};
use kestrel_rpc::{MethodOutcome, Service};
use kestrel_text::{Encoding, TextPosition};
use kestrel_value::{Value, kgr_object};
use regex::{Regex, RegexBuilder};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone)]
struct SearchMatch {
	start: TextPosition,
	length: u64,
	content: String,
}

fn match_value(m: &SearchMatch) -> Value {
	kgr_object!(
		"start" => kgr_object!("line" => m.start.line as i64, "column" => m.start.column as i64),
		"length" => m.length as i64,
		"content" => m.content.clone(),
	)
}

#[derive(Clone, Copy)]
enum MatcherKind {
	Plain,
	Regex,
}

enum ActiveMatcher {
	Plain(String),
	Regex(Regex),
}

fn byte_offset(encoding: &dyn Encoding, line: &str, column: u64) -> usize {
	encoding.get_codepoint(line.as_bytes(), column).map(|(start, _)| start).unwrap_or(line.len())
}

/// Byte-offset ranges of every occurrence of `needle` in `haystack`, ASCII
/// case-insensitively when asked — ASCII-only so offsets stay valid without
/// re-measuring non-ASCII codepoints.
fn plain_matches(haystack: &str, needle: &str, case_insensitive: bool) -> Vec<(usize, usize)> {
	if needle.is_empty() {
		return Vec::new();
	}
	let hay = if case_insensitive { haystack.to_ascii_lowercase() } else { haystack.to_string() };
	let pat = if case_insensitive { needle.to_ascii_lowercase() } else { needle.to_string() };
	let mut out = Vec::new();
	let mut start = 0usize;
	while start <= hay.len() {
		match hay[start..].find(&pat) {
			Some(idx) => {
				let at = start + idx;
				out.push((at, pat.len()));
				start = at + pat.len().max(1);
			}
			None => break,
		}
	}
	out
}

fn regex_matches(haystack: &str, re: &Regex) -> Vec<(usize, usize)> {
	re.find_iter(haystack).map(|m| (m.start(), m.len())).collect()
}

/// One connection's search/replace session over a [`Document`], per
/// spec.md §6's `/document/search`, grounded in `original_source/
/// components/framework/src/services/Search.cpp`'s `SlokedSearchContext`.
///
/// Matches never cross a line boundary — the original's `Replace` builds
/// the cleared region as `{start.line, start.column + length}`, which only
/// makes sense for a same-line match, so this carries that restriction
/// forward rather than inventing multi-line match semantics.
struct SearchSession {
	document: Rc<Document>,
	stream: TransactionStream,
	kind: Option<MatcherKind>,
	active: Option<ActiveMatcher>,
	flags: i64,
	rewind: TextPosition,
	results: Vec<SearchMatch>,
}

impl SearchSession {
	fn search(&mut self) {
		let Some(active) = self.active.as_ref() else {
			self.results.clear();
			return;
		};
		let text = self.document.text().borrow();
		let encoding = self.document.encoding();
		let last = text.last_line();
		let mut results = Vec::new();
		if self.rewind.line <= last {
			for line_no in self.rewind.line..=last {
				let line = text.get_line(line_no).unwrap_or("");
				let start_col = if line_no == self.rewind.line { self.rewind.column } else { 0 };
				let start_byte = byte_offset(encoding, line, start_col);
				let haystack = &line[start_byte..];
				let raw = match active {
					ActiveMatcher::Plain(needle) => plain_matches(haystack, needle, self.flags & 1 != 0),
					ActiveMatcher::Regex(re) => regex_matches(haystack, re),
				};
				for (rel_start, len) in raw {
					let byte_start = start_byte + rel_start;
					let column = encoding.codepoint_count(line[..byte_start].as_bytes());
					let content = line[byte_start..byte_start + len].to_string();
					let length = encoding.codepoint_count(content.as_bytes());
					results.push(SearchMatch { start: TextPosition::new(line_no, column), length, content });
				}
			}
		}
		self.results = results;
	}
}

/// `/document/search`, per spec.md §6.
pub struct SearchService {
	documents: Rc<DocumentSet>,
}

impl SearchService {
	pub fn new(documents: Rc<DocumentSet>) -> Self {
		SearchService { documents }
	}
}

impl Service for SearchService {
	fn attach(&self, pipe: Pipe, manager: &ContextManager) {
		let documents = Rc::clone(&self.documents);
		let inner = DispatchService::new(move || {
			let session: Rc<RefCell<Option<SearchSession>>> = Rc::new(RefCell::new(None));
			let documents = Rc::clone(&documents);

			let session_connect = Rc::clone(&session);
			let session_matcher = Rc::clone(&session);
			let session_match = Rc::clone(&session);
			let session_rewind = Rc::clone(&session);
			let session_get = Rc::clone(&session);
			let session_replace = Rc::clone(&session);
			let session_replace_all = Rc::clone(&session);

			MethodTableBuilder::new()
				.method("connect", move |params| {
					let Some(id) = params.as_int() else {
						return MethodOutcome::Result(Value::Bool(false));
					};
					match documents.by_id(id as u64) {
						Ok(doc) => {
							let stream = doc.open_stream();
							*session_connect.borrow_mut() = Some(SearchSession {
								document: doc,
								stream,
								kind: None,
								active: None,
								flags: 0,
								rewind: TextPosition::new(0, 0),
								results: Vec::new(),
							});
							MethodOutcome::Result(Value::Bool(true))
						}
						Err(_) => MethodOutcome::Result(Value::Bool(false)),
					}
				})
				.method("matcher", move |params| {
					let mut guard = session_matcher.borrow_mut();
					let Some(session) = guard.as_mut() else {
						return MethodOutcome::Result(Value::Bool(false));
					};
					match params.as_str() {
						Some("plain") => {
							session.kind = Some(MatcherKind::Plain);
							MethodOutcome::Result(Value::Bool(true))
						}
						Some("regex") => {
							session.kind = Some(MatcherKind::Regex);
							MethodOutcome::Result(Value::Bool(true))
						}
						_ => MethodOutcome::Result(Value::Bool(false)),
					}
				})
				.method("match", move |params| {
					let mut guard = session_match.borrow_mut();
					let Some(session) = guard.as_mut() else {
						return MethodOutcome::Result(Value::Bool(false));
					};
					let Some(kind) = session.kind else {
						return MethodOutcome::Result(Value::Bool(false));
					};
					let Some(query) = params.field("query").and_then(Value::as_str) else {
						return ServiceError::BadParams("missing query".to_string()).into();
					};
					let flags = params.field("flags").and_then(Value::as_int).unwrap_or(0);
					session.flags = flags;
					session.active = Some(match kind {
						MatcherKind::Plain => ActiveMatcher::Plain(query.to_string()),
						MatcherKind::Regex => {
							let mut builder = RegexBuilder::new(query);
							builder.case_insensitive(flags & 1 != 0);
							match builder.build() {
								Ok(re) => ActiveMatcher::Regex(re),
								Err(err) => return ServiceError::from(err).into(),
							}
						}
					});
					session.search();
					MethodOutcome::Result(Value::Bool(true))
				})
				.method("rewind", move |params| {
					let (Some(line), Some(column)) = (params.field("line").and_then(Value::as_int), params.field("column").and_then(Value::as_int)) else {
						return ServiceError::BadParams("missing line/column".to_string()).into();
					};
					let mut guard = session_rewind.borrow_mut();
					let Some(session) = guard.as_mut() else {
						return MethodOutcome::Result(Value::Bool(false));
					};
					session.rewind = TextPosition::new(line as u64, column as u64);
					session.search();
					MethodOutcome::Result(Value::Bool(true))
				})
				.method("get", move |_params| match session_get.borrow().as_ref() {
					Some(session) => MethodOutcome::Result(Value::Array(session.results.iter().map(match_value).collect())),
					None => MethodOutcome::Result(Value::Array(Vec::new())),
				})
				.method("replace", move |params| {
					let Some(idx) = params.field("occurence").and_then(Value::as_int) else {
						return ServiceError::BadParams("missing occurence".to_string()).into();
					};
					let Some(by) = params.field("by").and_then(Value::as_str).map(str::to_string) else {
						return ServiceError::BadParams("missing by".to_string()).into();
					};
					let mut guard = session_replace.borrow_mut();
					let Some(session) = guard.as_mut() else {
						return MethodOutcome::Result(Value::Bool(false));
					};
					let Some(entry) = session.results.get(idx as usize).cloned() else {
						return MethodOutcome::Result(Value::Bool(false));
					};
					let to = TextPosition::new(entry.start.line, entry.start.column + entry.length);
					let result = session
						.stream
						.commit(Transaction::ClearRegion { from: entry.start, to }, session.document.encoding())
						.and_then(|_| session.stream.commit(Transaction::Insert { pos: entry.start, text: by }, session.document.encoding()));
					match result {
						Ok(_) => {
							session.rewind = entry.start;
							session.search();
							MethodOutcome::Result(Value::Bool(true))
						}
						Err(err) => ServiceError::from(err).into(),
					}
				})
				.method("replaceAll", move |params| {
					let Some(by) = params.as_str().map(str::to_string) else {
						return ServiceError::BadParams("missing replacement".to_string()).into();
					};
					let mut guard = session_replace_all.borrow_mut();
					let Some(session) = guard.as_mut() else {
						return MethodOutcome::Result(Value::Bool(false));
					};
					let mut entries = session.results.clone();
					entries.sort_by(|a, b| b.start.cmp(&a.start));
					for entry in entries {
						let to = TextPosition::new(entry.start.line, entry.start.column + entry.length);
						if let Err(err) = session.stream.commit(Transaction::ClearRegion { from: entry.start, to }, session.document.encoding()) {
							return ServiceError::from(err).into();
						}
						if let Err(err) = session.stream.commit(Transaction::Insert { pos: entry.start, text: by.clone() }, session.document.encoding()) {
							return ServiceError::from(err).into();
						}
					}
					session.active = None;
					session.results.clear();
					MethodOutcome::Result(Value::Bool(true))
				})
				.build()
		});
		inner.attach(pipe, manager);
	}
}
