use crate::dispatch::{DispatchService, MethodTableBuilder};
use crate::error::ServiceError;
use kestrel_doc::{Document, DocumentSet, StreamEvent, Transaction, TransactionStream, Unsubscribe};
use kestrel_pipe::{ContextManager, Pipe};
use kestrel_rpc::{MethodOutcome, Service};
use kestrel_text::{TextBlock, TextPosition};
use kestrel_value::{Value, kgr_object};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Registers the shared [`TextPosition`] cell backing each live cursor, so
/// `/document/render` can read a cursor's current position directly
/// instead of round-tripping through `/document/cursor`.
#[derive(Default)]
pub struct CursorPositions {
	next_id: RefCell<u64>,
	cells: RefCell<HashMap<u64, Rc<RefCell<TextPosition>>>>,
}

impl CursorPositions {
	pub fn new() -> Rc<Self> {
		Rc::new(CursorPositions::default())
	}

	fn register(&self) -> (u64, Rc<RefCell<TextPosition>>) {
		let mut next = self.next_id.borrow_mut();
		let id = *next;
		*next += 1;
		let cell = Rc::new(RefCell::new(TextPosition::new(0, 0)));
		self.cells.borrow_mut().insert(id, Rc::clone(&cell));
		(id, cell)
	}

	pub fn get(&self, id: u64) -> Option<Rc<RefCell<TextPosition>>> {
		self.cells.borrow().get(&id).cloned()
	}

	fn forget(&self, id: u64) {
		self.cells.borrow_mut().remove(&id);
	}
}

fn line_len(text: &TextBlock, encoding: &dyn kestrel_text::Encoding, line: u64) -> u64 {
	text.get_line(line).map(|s| encoding.codepoint_count(s.as_bytes())).unwrap_or(0)
}

fn clamp(text: &TextBlock, encoding: &dyn kestrel_text::Encoding, pos: TextPosition) -> TextPosition {
	let line = pos.line.min(text.last_line());
	let column = pos.column.min(line_len(text, encoding, line));
	TextPosition::new(line, column)
}

fn step_forward(text: &TextBlock, encoding: &dyn kestrel_text::Encoding, pos: TextPosition) -> TextPosition {
	let len = line_len(text, encoding, pos.line);
	if pos.column < len {
		TextPosition::new(pos.line, pos.column + 1)
	} else if pos.line < text.last_line() {
		TextPosition::new(pos.line + 1, 0)
	} else {
		pos
	}
}

fn step_backward(text: &TextBlock, encoding: &dyn kestrel_text::Encoding, pos: TextPosition) -> TextPosition {
	if pos.column > 0 {
		TextPosition::new(pos.line, pos.column - 1)
	} else if pos.line > 0 {
		TextPosition::new(pos.line - 1, line_len(text, encoding, pos.line - 1))
	} else {
		pos
	}
}

/// One connection's live cursor over a [`Document`]'s shared
/// [`TransactionStream`], per spec.md §6's `/document/cursor`.
///
/// Grounded in `original_source/components/framework/headers/sloked/
/// text/cursor/TransactionCursor.h`: `line`/`column` are tracked locally
/// (not recomputed from the stream), updated directly from this cursor's
/// own commits/undo/redo, and patched via a shared-hub listener when a
/// sibling stream commits. Sibling `Rollback`/`Revert` events are not
/// patched against — `TransactionStream::undo` notifies listeners with
/// the forward transaction it is undoing, not the inverse it actually
/// applied, so `commit_patch` would compute the wrong shift; this is a
/// known simplification, see DESIGN.md.
pub struct DocumentCursor {
	id: u64,
	document: Rc<Document>,
	stream: TransactionStream,
	position: Rc<RefCell<TextPosition>>,
	_sibling_sub: Unsubscribe,
}

impl DocumentCursor {
	fn open(positions: &CursorPositions, document: Rc<Document>) -> Self {
		let (id, position) = positions.register();
		let stream = document.open_stream();
		let stream_id = stream.id();
		let sibling_position = Rc::clone(&position);
		let sibling_document = Rc::clone(&document);
		let sub = stream.on_change(move |origin, event, tx| {
			if origin == stream_id || event != StreamEvent::Commit {
				return;
			}
			let mut pos = sibling_position.borrow_mut();
			*pos = tx.commit_patch(sibling_document.encoding(), *pos);
		});
		DocumentCursor { id, document, stream, position, _sibling_sub: sub }
	}

	fn position(&self) -> TextPosition {
		*self.position.borrow()
	}

	fn set_position(&self, pos: TextPosition) {
		*self.position.borrow_mut() = pos;
	}

	fn with_text<R>(&self, f: impl FnOnce(&TextBlock, &dyn kestrel_text::Encoding) -> R) -> R {
		let text = self.document.text().borrow();
		f(&text, self.document.encoding())
	}

	fn commit(&mut self, tx: Transaction) -> Result<TextPosition, ServiceError> {
		let pos = self.stream.commit(tx, self.document.encoding())?;
		self.set_position(pos);
		Ok(pos)
	}
}

fn position_value(pos: TextPosition) -> Value {
	kgr_object!("line" => pos.line as i64, "column" => pos.column as i64)
}

fn parse_count(params: &Value) -> u64 {
	params.field("count").and_then(Value::as_int).filter(|n| *n >= 0).map(|n| n as u64).unwrap_or(1)
}

/// The operations `/document/cursor` answers once a [`DocumentCursor`] is
/// bound, shared between [`CursorService`]'s wire `connect` flow and
/// [`spawn_bound`]'s in-process one so the two never drift apart.
fn dispatch(cursor: &mut DocumentCursor, method: &str, params: &Value) -> MethodOutcome {
	match method {
		"insert" => {
			let Some(text) = params.field("text").and_then(Value::as_str).map(str::to_string) else {
				return ServiceError::BadParams("missing text".to_string()).into();
			};
			let pos = cursor.position();
			match cursor.commit(Transaction::Insert { pos, text }) {
				Ok(new_pos) => MethodOutcome::Result(position_value(new_pos)),
				Err(err) => err.into(),
			}
		}
		"newLine" => {
			let prefix = params.field("prefix").and_then(Value::as_str).unwrap_or("").to_string();
			let pos = cursor.position();
			match cursor.commit(Transaction::NewLine { pos, prefix }) {
				Ok(new_pos) => MethodOutcome::Result(position_value(new_pos)),
				Err(err) => err.into(),
			}
		}
		"deleteBackward" => {
			let pos = cursor.position();
			match cursor.commit(Transaction::DeleteBackward { pos }) {
				Ok(new_pos) => MethodOutcome::Result(position_value(new_pos)),
				Err(err) => err.into(),
			}
		}
		"deleteForward" => {
			let pos = cursor.position();
			match cursor.commit(Transaction::DeleteForward { pos }) {
				Ok(new_pos) => MethodOutcome::Result(position_value(new_pos)),
				Err(err) => err.into(),
			}
		}
		"clearRegion" => {
			let (Some(from_line), Some(from_column), Some(to_line), Some(to_column)) = (
				params.field("fromLine").and_then(Value::as_int),
				params.field("fromColumn").and_then(Value::as_int),
				params.field("toLine").and_then(Value::as_int),
				params.field("toColumn").and_then(Value::as_int),
			) else {
				return ServiceError::BadParams("missing region bounds".to_string()).into();
			};
			let from = TextPosition::new(from_line as u64, from_column as u64);
			let to = TextPosition::new(to_line as u64, to_column as u64);
			match cursor.commit(Transaction::ClearRegion { from, to }) {
				Ok(new_pos) => MethodOutcome::Result(position_value(new_pos)),
				Err(err) => err.into(),
			}
		}
		"undo" => match cursor.stream.undo(cursor.document.encoding()) {
			Ok(Some(pos)) => {
				cursor.set_position(pos);
				MethodOutcome::Result(position_value(pos))
			}
			Ok(None) => MethodOutcome::Result(position_value(cursor.position())),
			Err(err) => ServiceError::from(err).into(),
		},
		"redo" => match cursor.stream.redo(cursor.document.encoding()) {
			Ok(Some(pos)) => {
				cursor.set_position(pos);
				MethodOutcome::Result(position_value(pos))
			}
			Ok(None) => MethodOutcome::Result(position_value(cursor.position())),
			Err(err) => ServiceError::from(err).into(),
		},
		"moveUp" => {
			let count = parse_count(params);
			let pos = cursor.position();
			let target = TextPosition::new(pos.line.saturating_sub(count), pos.column);
			let clamped = cursor.with_text(|text, encoding| clamp(text, encoding, target));
			cursor.set_position(clamped);
			MethodOutcome::Result(position_value(clamped))
		}
		"moveDown" => {
			let count = parse_count(params);
			let pos = cursor.position();
			let target = TextPosition::new(pos.line.saturating_add(count), pos.column);
			let clamped = cursor.with_text(|text, encoding| clamp(text, encoding, target));
			cursor.set_position(clamped);
			MethodOutcome::Result(position_value(clamped))
		}
		"moveForward" => {
			let count = parse_count(params);
			let mut pos = cursor.position();
			for _ in 0..count {
				pos = cursor.with_text(|text, encoding| step_forward(text, encoding, pos));
			}
			cursor.set_position(pos);
			MethodOutcome::Result(position_value(pos))
		}
		"moveBackward" => {
			let count = parse_count(params);
			let mut pos = cursor.position();
			for _ in 0..count {
				pos = cursor.with_text(|text, encoding| step_backward(text, encoding, pos));
			}
			cursor.set_position(pos);
			MethodOutcome::Result(position_value(pos))
		}
		"moveTo" => {
			let (Some(line), Some(column)) = (params.field("line").and_then(Value::as_int), params.field("column").and_then(Value::as_int)) else {
				return ServiceError::BadParams("missing line/column".to_string()).into();
			};
			let target = TextPosition::new(line as u64, column as u64);
			let clamped = cursor.with_text(|text, encoding| clamp(text, encoding, target));
			cursor.set_position(clamped);
			MethodOutcome::Result(position_value(clamped))
		}
		"getPosition" => MethodOutcome::Result(position_value(cursor.position())),
		"getId" => MethodOutcome::Result(Value::Int(cursor.id as i64)),
		_ => MethodOutcome::Error(format!("Unknown method: {method}")),
	}
}

fn dispatch_bound(cursor: &Rc<RefCell<Option<DocumentCursor>>>, method: &str, params: &Value) -> MethodOutcome {
	let mut guard = cursor.borrow_mut();
	let Some(cursor) = guard.as_mut() else {
		return ServiceError::NoDocumentBound.into();
	};
	dispatch(cursor, method, params)
}

/// Binds a cursor to `document_id` and spawns its dispatch loop directly,
/// without the wire `connect` handshake `/document/cursor` otherwise
/// requires — for widgets built in the same process (see
/// [`crate::screen::ScreenService`]'s `newTextEditor`), where routing the
/// handshake's reply around the pipe before handing it to
/// `kestrel_screen::editor::TextEditor` would race the editor's own first
/// call on the same pipe.
pub fn spawn_bound(documents: &Rc<DocumentSet>, positions: &Rc<CursorPositions>, document_id: u64, manager: &ContextManager) -> Result<(Pipe, u64), ServiceError> {
	let doc = documents.by_id(document_id)?;
	let cursor = Rc::new(RefCell::new(DocumentCursor::open(positions, doc)));
	let cursor_id = cursor.borrow().id;
	let positions = Rc::clone(positions);
	let (client, server) = Pipe::pair();
	manager.spawn(async move {
		while let Some(request) = server.read_wait().await {
			let method = request.field("method").and_then(Value::as_str).unwrap_or_default().to_string();
			let params = request.field("params").cloned().unwrap_or(Value::Null);
			let outcome = dispatch(&mut cursor.borrow_mut(), &method, &params);
			let reply = match outcome {
				MethodOutcome::Result(value) => value,
				MethodOutcome::Error(message) => kgr_object!("error" => message),
			};
			if server.write(reply).is_err() {
				break;
			}
			if method == "close" {
				positions.forget(cursor.borrow().id);
			}
		}
	});
	Ok((client, cursor_id))
}

/// `/document/cursor`, per spec.md §6.
pub struct CursorService {
	documents: Rc<DocumentSet>,
	positions: Rc<CursorPositions>,
}

impl CursorService {
	pub fn new(documents: Rc<DocumentSet>, positions: Rc<CursorPositions>) -> Self {
		CursorService { documents, positions }
	}
}

impl Service for CursorService {
	fn attach(&self, pipe: Pipe, manager: &ContextManager) {
		let documents = Rc::clone(&self.documents);
		let positions = Rc::clone(&self.positions);
		let inner = DispatchService::new(move || {
			let cursor: Rc<RefCell<Option<DocumentCursor>>> = Rc::new(RefCell::new(None));
			let documents = Rc::clone(&documents);
			let positions = Rc::clone(&positions);

			let cursor_connect = Rc::clone(&cursor);
			let positions_connect = Rc::clone(&positions);
			let cursor_generic = Rc::clone(&cursor);
			let positions_drop = Rc::clone(&positions);
			let cursor_drop = Rc::clone(&cursor);

			MethodTableBuilder::new()
				.method("connect", move |params| {
					let Some(id) = params.field("documentId").and_then(Value::as_int) else {
						return ServiceError::BadParams("missing documentId".to_string()).into();
					};
					match documents.by_id(id as u64) {
						Ok(doc) => {
							let opened = DocumentCursor::open(&positions_connect, doc);
							let reply = kgr_object!("cursorId" => opened.id as i64);
							*cursor_connect.borrow_mut() = Some(opened);
							MethodOutcome::Result(reply)
						}
						Err(err) => ServiceError::from(err).into(),
					}
				})
				.method("close", move |_params| {
					if let Some(cursor) = cursor_drop.borrow_mut().take() {
						positions_drop.forget(cursor.id);
					}
					MethodOutcome::Result(Value::Null)
				})
				.method("insert", move |params| dispatch_bound(&cursor_generic, "insert", &params))
				.method("newLine", {
					let cursor = Rc::clone(&cursor);
					move |params| dispatch_bound(&cursor, "newLine", &params)
				})
				.method("deleteBackward", {
					let cursor = Rc::clone(&cursor);
					move |params| dispatch_bound(&cursor, "deleteBackward", &params)
				})
				.method("deleteForward", {
					let cursor = Rc::clone(&cursor);
					move |params| dispatch_bound(&cursor, "deleteForward", &params)
				})
				.method("clearRegion", {
					let cursor = Rc::clone(&cursor);
					move |params| dispatch_bound(&cursor, "clearRegion", &params)
				})
				.method("undo", {
					let cursor = Rc::clone(&cursor);
					move |params| dispatch_bound(&cursor, "undo", &params)
				})
				.method("redo", {
					let cursor = Rc::clone(&cursor);
					move |params| dispatch_bound(&cursor, "redo", &params)
				})
				.method("moveUp", {
					let cursor = Rc::clone(&cursor);
					move |params| dispatch_bound(&cursor, "moveUp", &params)
				})
				.method("moveDown", {
					let cursor = Rc::clone(&cursor);
					move |params| dispatch_bound(&cursor, "moveDown", &params)
				})
				.method("moveForward", {
					let cursor = Rc::clone(&cursor);
					move |params| dispatch_bound(&cursor, "moveForward", &params)
				})
				.method("moveBackward", {
					let cursor = Rc::clone(&cursor);
					move |params| dispatch_bound(&cursor, "moveBackward", &params)
				})
				.method("moveTo", {
					let cursor = Rc::clone(&cursor);
					move |params| dispatch_bound(&cursor, "moveTo", &params)
				})
				.method("getPosition", {
					let cursor = Rc::clone(&cursor);
					move |params| dispatch_bound(&cursor, "getPosition", &params)
				})
				.method("getId", {
					let cursor = Rc::clone(&cursor);
					move |params| dispatch_bound(&cursor, "getId", &params)
				})
				.build()
		});
		inner.attach(pipe, manager);
	}
}
