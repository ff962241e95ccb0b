use crate::Unsubscribe;
use kestrel_text::{Encoding, TextBlock, TextBlockError, TextPosition};
use std::cell::RefCell;
use std::rc::Rc;

/// One edit operation plus its already-computed inverse, per spec.md §3.
///
/// `Insert`/`NewLine`/`DeleteBackward`/`DeleteForward`/`ClearRegion` are the
/// five forward shapes a caller constructs; `apply` always returns the
/// concrete inverse alongside the post-edit cursor, so [`TransactionStream`]
/// never has to special-case "what undoes this".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
	Insert { pos: TextPosition, text: String },
	NewLine { pos: TextPosition, prefix: String },
	DeleteBackward { pos: TextPosition },
	DeleteForward { pos: TextPosition },
	ClearRegion { from: TextPosition, to: TextPosition },
}

#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
	#[error(transparent)]
	Text(#[from] TextBlockError),
}

impl Transaction {
	/// The position this transaction anchors on — used to report which
	/// region of the document a commit/rollback/revert touched.
	pub fn position(&self) -> TextPosition {
		match self {
			Transaction::Insert { pos, .. } => *pos,
			Transaction::NewLine { pos, .. } => *pos,
			Transaction::DeleteBackward { pos } => *pos,
			Transaction::DeleteForward { pos } => *pos,
			Transaction::ClearRegion { from, .. } => *from,
		}
	}

	/// Applies this transaction to `text`, returning the new cursor position
	/// and the inverse transaction that undoes it.
	pub(crate) fn apply(&self, text: &mut TextBlock, encoding: &dyn Encoding) -> Result<(TextPosition, Transaction), TransactionError> {
		match self {
			Transaction::Insert { pos, text: s } => Ok(insert_text(text, encoding, *pos, s)?),
			Transaction::NewLine { pos, prefix } => Ok(split_line(text, encoding, *pos, prefix)?),
			Transaction::DeleteBackward { pos } => {
				let range = backward_range(text, encoding, *pos)?;
				clear_region(text, encoding, range.0, range.1)
			}
			Transaction::DeleteForward { pos } => {
				let range = forward_range(text, encoding, *pos)?;
				clear_region(text, encoding, range.0, range.1)
			}
			Transaction::ClearRegion { from, to } => clear_region(text, encoding, *from, *to),
		}
	}

	/// Maps a position recorded before this transaction committed to where
	/// the same logical spot lives afterward — used to keep other views'
	/// cursors coherent across a sibling stream's edit.
	pub fn commit_patch(&self, encoding: &dyn Encoding, pos: TextPosition) -> TextPosition {
		match self {
			Transaction::Insert { pos: at, text: s } => shift_after_insert(encoding, *at, s, pos),
			Transaction::NewLine { pos: at, prefix } => shift_after_newline(encoding, *at, prefix, pos),
			Transaction::DeleteBackward { .. } | Transaction::DeleteForward { .. } => pos,
			Transaction::ClearRegion { from, to } => shift_after_clear(*from, *to, pos),
		}
	}
}

fn byte_offset(encoding: &dyn Encoding, line: &str, column: u64) -> usize {
	match encoding.get_codepoint(line.as_bytes(), column) {
		Some((start, _)) => start,
		None => line.len(),
	}
}

fn codepoint_len(encoding: &dyn Encoding, s: &str) -> u64 {
	encoding.codepoint_count(s.as_bytes())
}

fn insert_text(text: &mut TextBlock, encoding: &dyn Encoding, pos: TextPosition, s: &str) -> Result<(TextPosition, Transaction), TransactionError> {
	let line = text.get_line(pos.line)?.to_string();
	let col = byte_offset(encoding, &line, pos.column);
	if !s.contains('\n') {
		let mut new_line = String::with_capacity(line.len() + s.len());
		new_line.push_str(&line[..col]);
		new_line.push_str(s);
		new_line.push_str(&line[col..]);
		text.set_line(pos.line, new_line)?;
		let end = TextPosition::new(pos.line, pos.column + codepoint_len(encoding, s));
		return Ok((end, Transaction::ClearRegion { from: pos, to: end }));
	}
	let parts: Vec<&str> = s.split('\n').collect();
	let before = line[..col].to_string();
	let after = line[col..].to_string();
	let mut first = before;
	first.push_str(parts[0]);
	text.set_line(pos.line, first)?;
	let mut at = pos.line + 1;
	for part in &parts[1..parts.len() - 1] {
		text.insert_line(at, (*part).to_string())?;
		at += 1;
	}
	let mut last = parts[parts.len() - 1].to_string();
	last.push_str(&after);
	text.insert_line(at, last)?;
	let end = TextPosition::new(at, codepoint_len(encoding, parts[parts.len() - 1]));
	Ok((end, Transaction::ClearRegion { from: pos, to: end }))
}

fn split_line(text: &mut TextBlock, encoding: &dyn Encoding, pos: TextPosition, prefix: &str) -> Result<(TextPosition, Transaction), TransactionError> {
	let line = text.get_line(pos.line)?.to_string();
	let col = byte_offset(encoding, &line, pos.column);
	let before = line[..col].to_string();
	let after = line[col..].to_string();
	let mut next = prefix.to_string();
	next.push_str(&after);
	text.set_line(pos.line, before)?;
	text.insert_line(pos.line + 1, next)?;
	let end = TextPosition::new(pos.line + 1, codepoint_len(encoding, prefix));
	// Undoing a NewLine is deleting forward across the boundary it created,
	// which re-merges the two lines.
	Ok((end, Transaction::DeleteForward { pos: TextPosition::new(pos.line, pos.column) }))
}

fn backward_range(text: &TextBlock, encoding: &dyn Encoding, pos: TextPosition) -> Result<(TextPosition, TextPosition), TransactionError> {
	if pos.column > 0 {
		return Ok((TextPosition::new(pos.line, pos.column - 1), pos));
	}
	if pos.line > 0 {
		let prev_len = codepoint_len(encoding, text.get_line(pos.line - 1)?);
		return Ok((TextPosition::new(pos.line - 1, prev_len), pos));
	}
	Ok((pos, pos))
}

fn forward_range(text: &TextBlock, encoding: &dyn Encoding, pos: TextPosition) -> Result<(TextPosition, TextPosition), TransactionError> {
	let line_len = codepoint_len(encoding, text.get_line(pos.line)?);
	if pos.column < line_len {
		return Ok((pos, TextPosition::new(pos.line, pos.column + 1)));
	}
	if pos.line < text.last_line() {
		return Ok((pos, TextPosition::new(pos.line + 1, 0)));
	}
	Ok((pos, pos))
}

fn clear_region(text: &mut TextBlock, encoding: &dyn Encoding, from: TextPosition, to: TextPosition) -> Result<(TextPosition, Transaction), TransactionError> {
	if from == to {
		return Ok((from, Transaction::Insert { pos: from, text: String::new() }));
	}
	if from.line == to.line {
		let line = text.get_line(from.line)?.to_string();
		let from_b = byte_offset(encoding, &line, from.column);
		let to_b = byte_offset(encoding, &line, to.column);
		let removed = line[from_b..to_b].to_string();
		let mut merged = line[..from_b].to_string();
		merged.push_str(&line[to_b..]);
		text.set_line(from.line, merged)?;
		return Ok((from, Transaction::Insert { pos: from, text: removed }));
	}
	let first_line = text.get_line(from.line)?.to_string();
	let last_line = text.get_line(to.line)?.to_string();
	let from_b = byte_offset(encoding, &first_line, from.column);
	let to_b = byte_offset(encoding, &last_line, to.column);
	let mut removed = first_line[from_b..].to_string();
	removed.push('\n');
	for l in (from.line + 1)..to.line {
		removed.push_str(text.get_line(l)?);
		removed.push('\n');
	}
	removed.push_str(&last_line[..to_b]);
	for _ in 0..(to.line - from.line) {
		text.erase_line(from.line + 1)?;
	}
	let mut merged = first_line[..from_b].to_string();
	merged.push_str(&last_line[to_b..]);
	text.set_line(from.line, merged)?;
	Ok((from, Transaction::Insert { pos: from, text: removed }))
}

fn shift_after_insert(encoding: &dyn Encoding, at: TextPosition, inserted: &str, pos: TextPosition) -> TextPosition {
	if pos < at {
		return pos;
	}
	let lines_added = inserted.matches('\n').count() as u64;
	if lines_added == 0 {
		if pos.line == at.line {
			return TextPosition::new(pos.line, pos.column + codepoint_len(encoding, inserted));
		}
		return pos;
	}
	if pos.line == at.line {
		let last_part = inserted.rsplit('\n').next().unwrap_or("");
		return TextPosition::new(pos.line + lines_added, pos.column - at.column + codepoint_len(encoding, last_part));
	}
	TextPosition::new(pos.line + lines_added, pos.column)
}

fn shift_after_newline(encoding: &dyn Encoding, at: TextPosition, prefix: &str, pos: TextPosition) -> TextPosition {
	if pos < at {
		return pos;
	}
	if pos.line == at.line {
		return TextPosition::new(at.line + 1, pos.column - at.column + codepoint_len(encoding, prefix));
	}
	TextPosition::new(pos.line + 1, pos.column)
}

fn shift_after_clear(from: TextPosition, to: TextPosition, pos: TextPosition) -> TextPosition {
	if pos <= from {
		return pos;
	}
	if pos >= to {
		if to.line == from.line {
			if pos.line == to.line {
				return TextPosition::new(from.line, from.column + (pos.column - to.column));
			}
			return TextPosition::new(from.line + (pos.line - to.line), pos.column);
		}
		if pos.line == to.line {
			return TextPosition::new(from.line, from.column + (pos.column - to.column));
		}
		return TextPosition::new(from.line - (to.line - from.line) + (pos.line - to.line), pos.column);
	}
	from
}

/// Identifies one [`TransactionStream`] among the several that may share a
/// document's underlying text.
pub type TransactionStreamId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
	Commit,
	Rollback,
	Revert,
}

type Listener = Box<dyn FnMut(TransactionStreamId, StreamEvent, &Transaction)>;

pub(crate) struct Hub {
	next_id: u64,
	listeners: Vec<(u64, Listener)>,
}

/// An undoable journal of edits over a shared [`TextBlock`].
///
/// Multiple streams may be created over one document (see
/// [`crate::Document::open_stream`]); each keeps an independent undo/redo
/// cursor, but all streams created from the same document share one
/// listener hub, so every stream observes every commit — including ones
/// made through a sibling stream — exactly as spec.md §4.4 requires.
pub struct TransactionStream {
	id: TransactionStreamId,
	text: Rc<RefCell<TextBlock>>,
	hub: Rc<RefCell<Hub>>,
	journal: Vec<(Transaction, Transaction)>,
	cursor: usize,
}

impl TransactionStream {
	pub(crate) fn new(id: TransactionStreamId, text: Rc<RefCell<TextBlock>>, hub: Rc<RefCell<Hub>>) -> Self {
		TransactionStream { id, text, hub, journal: Vec::new(), cursor: 0 }
	}

	pub fn id(&self) -> TransactionStreamId {
		self.id
	}

	/// Registers a listener that fires on every commit/rollback/revert made
	/// by any stream sharing this document, in registration order. Returns
	/// an [`Unsubscribe`] token; dropping it removes the listener.
	pub fn on_change(&self, mut f: impl FnMut(TransactionStreamId, StreamEvent, &Transaction) + 'static) -> Unsubscribe {
		let mut hub = self.hub.borrow_mut();
		let id = hub.next_id;
		hub.next_id += 1;
		hub.listeners.push((id, Box::new(move |origin, ev, tx| f(origin, ev, tx))));
		let weak = Rc::downgrade(&self.hub);
		Unsubscribe::new(move || {
			if let Some(hub) = weak.upgrade() {
				hub.borrow_mut().listeners.retain(|(entry_id, _)| *entry_id != id);
			}
		})
	}

	fn notify(&self, event: StreamEvent, tx: &Transaction) {
		// Listeners must be non-blocking and must not mutate the stream
		// reentrantly (spec.md §4.4); we don't defend against that here.
		for (_, listener) in self.hub.borrow_mut().listeners.iter_mut() {
			listener(self.id, event, tx);
		}
	}

	pub fn commit(&mut self, tx: Transaction, encoding: &dyn kestrel_text::Encoding) -> Result<TextPosition, TransactionError> {
		let (new_pos, inverse) = {
			let mut text = self.text.borrow_mut();
			tx.apply(&mut text, encoding)?
		};
		self.journal.truncate(self.cursor);
		self.journal.push((tx.clone(), inverse));
		self.cursor += 1;
		self.notify(StreamEvent::Commit, &tx);
		Ok(new_pos)
	}

	pub fn has_undoable(&self) -> bool {
		self.cursor > 0
	}

	pub fn has_redoable(&self) -> bool {
		self.cursor < self.journal.len()
	}

	pub fn undo(&mut self, encoding: &dyn kestrel_text::Encoding) -> Result<Option<TextPosition>, TransactionError> {
		if self.cursor == 0 {
			return Ok(None);
		}
		self.cursor -= 1;
		let (forward, inverse) = self.journal[self.cursor].clone();
		let new_pos = {
			let mut text = self.text.borrow_mut();
			let (pos, _recomputed_inverse) = inverse.apply(&mut text, encoding)?;
			pos
		};
		self.notify(StreamEvent::Rollback, &forward);
		Ok(Some(new_pos))
	}

	pub fn redo(&mut self, encoding: &dyn kestrel_text::Encoding) -> Result<Option<TextPosition>, TransactionError> {
		if self.cursor >= self.journal.len() {
			return Ok(None);
		}
		let (forward, _inverse) = self.journal[self.cursor].clone();
		let new_pos = {
			let mut text = self.text.borrow_mut();
			let (pos, _recomputed_inverse) = forward.apply(&mut text, encoding)?;
			pos
		};
		self.cursor += 1;
		self.notify(StreamEvent::Revert, &forward);
		Ok(Some(new_pos))
	}
}

pub(crate) fn new_hub() -> Rc<RefCell<Hub>> {
	Rc::new(RefCell::new(Hub { next_id: 0, listeners: Vec::new() }))
}

#[cfg(test)]
mod tests {
	use super::*;
	use kestrel_text::Utf8Encoding;

	fn stream() -> (Rc<RefCell<TextBlock>>, TransactionStream) {
		let text = Rc::new(RefCell::new(TextBlock::new()));
		let hub = new_hub();
		let stream = TransactionStream::new(0, Rc::clone(&text), hub);
		(text, stream)
	}

	#[test]
	fn undo_redo_roundtrip() {
		let (text, mut s) = stream();
		let enc = Utf8Encoding;
		s.commit(Transaction::Insert { pos: TextPosition::new(0, 0), text: "Hello\tWorld".into() }, &enc).unwrap();
		assert_eq!(text.borrow().get_line(0).unwrap(), "Hello\tWorld");

		s.undo(&enc).unwrap();
		assert_eq!(text.borrow().last_line(), 0);
		assert_eq!(text.borrow().get_line(0).unwrap(), "");
		assert!(s.has_redoable());

		s.redo(&enc).unwrap();
		assert_eq!(text.borrow().get_line(0).unwrap(), "Hello\tWorld");
	}

	#[test]
	fn commit_truncates_redo_suffix() {
		let (_, mut s) = stream();
		let enc = Utf8Encoding;
		s.commit(Transaction::Insert { pos: TextPosition::new(0, 0), text: "a".into() }, &enc).unwrap();
		s.undo(&enc).unwrap();
		assert!(s.has_redoable());
		s.commit(Transaction::Insert { pos: TextPosition::new(0, 0), text: "b".into() }, &enc).unwrap();
		assert!(!s.has_redoable());
	}

	#[test]
	fn sibling_stream_observes_external_commit() {
		let text = Rc::new(RefCell::new(TextBlock::new()));
		let hub = new_hub();
		let mut a = TransactionStream::new(0, Rc::clone(&text), Rc::clone(&hub));
		let b = TransactionStream::new(1, Rc::clone(&text), hub);
		let seen = Rc::new(RefCell::new(Vec::new()));
		let seen2 = Rc::clone(&seen);
		let _unsub = b.on_change(move |origin, event, _tx| seen2.borrow_mut().push((origin, event)));

		let enc = Utf8Encoding;
		a.commit(Transaction::Insert { pos: TextPosition::new(0, 0), text: "x".into() }, &enc).unwrap();
		assert_eq!(*seen.borrow(), vec![(0, StreamEvent::Commit)]);
	}

	#[test]
	fn unsubscribe_stops_notifications() {
		let (_, s) = stream();
		let seen = Rc::new(RefCell::new(0));
		let seen2 = Rc::clone(&seen);
		let unsub = s.on_change(move |_, _, _| *seen2.borrow_mut() += 1);
		unsub.cancel();
		let enc = Utf8Encoding;
		let mut s = s;
		s.commit(Transaction::Insert { pos: TextPosition::new(0, 0), text: "x".into() }, &enc).unwrap();
		assert_eq!(*seen.borrow(), 0);
	}

	#[test]
	fn newline_then_undo_merges_lines_back() {
		let (text, mut s) = stream();
		let enc = Utf8Encoding;
		s.commit(Transaction::Insert { pos: TextPosition::new(0, 0), text: "ab".into() }, &enc).unwrap();
		s.commit(Transaction::NewLine { pos: TextPosition::new(0, 1), prefix: String::new() }, &enc).unwrap();
		assert_eq!(text.borrow().last_line(), 1);
		s.undo(&enc).unwrap();
		assert_eq!(text.borrow().last_line(), 0);
		assert_eq!(text.borrow().get_line(0).unwrap(), "ab");
	}
}
