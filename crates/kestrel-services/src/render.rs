use crate::cursor::CursorPositions;
use crate::dispatch::{DispatchService, MethodTableBuilder};
use crate::error::ServiceError;
use kestrel_doc::{DocumentSet, StreamEvent, TextPositionRange, Unsubscribe};
use kestrel_pipe::{ContextManager, Pipe};
use kestrel_render::{RenderEngine, RenderMode};
use kestrel_rpc::{MethodOutcome, Service};
use kestrel_text::{TextPosition, Utf8Encoding};
use kestrel_value::{Value, kgr_object};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// One connection's view over a document's [`RenderEngine`], per
/// spec.md §6's `/document/render`.
///
/// `kestrel_screen::editor::TextEditor::render` calls `render` with only
/// `{height, width}` — no starting line and no cursor id, unlike spec.md's
/// `render{line,height,partial?}` — so this keeps its own scroll position
/// (`top`) and reads the cursor it was told about at `attach` time from a
/// shared [`CursorPositions`] registry rather than asking `/document/cursor`
/// over RPC on every frame. `width` is accepted but unused: `RenderEngine`
/// doesn't wrap lines, so there is nothing to size against yet. Both are
/// known simplifications, see DESIGN.md.
struct RenderBinding {
	engine: Rc<RefCell<RenderEngine>>,
	cursor_id: Option<u64>,
	top: Cell<u64>,
	_sub: Unsubscribe,
}

/// Flattens `RenderEngine::render`'s per-line fragment arrays into the
/// single flat sequence `TextEditor::render` expects, joined by an
/// explicit `{tag: false, content: "\n"}` separator between lines.
fn flatten(rows: Vec<(u64, Value)>) -> Vec<Value> {
	let mut out = Vec::new();
	for (i, (_line, row)) in rows.into_iter().enumerate() {
		if i > 0 {
			out.push(kgr_object!("tag" => false, "content" => "\n"));
		}
		if let Some(fragments) = row.as_array() {
			out.extend(fragments.iter().cloned());
		}
	}
	out
}

fn cursor_in_viewport(cursor: TextPosition, top: u64) -> Value {
	let line = cursor.line.saturating_sub(top);
	kgr_object!("line" => line as i64, "column" => cursor.column as i64)
}

fn handle_render(binding: &RenderBinding, positions: &CursorPositions, params: &Value) -> MethodOutcome {
	let (Some(height), Some(_width)) = (params.field("height").and_then(Value::as_int), params.field("width").and_then(Value::as_int)) else {
		return ServiceError::BadParams("missing height/width".to_string()).into();
	};
	let height = height.max(0) as u64;

	let cursor = binding.cursor_id.and_then(|id| positions.get(id)).map(|cell| *cell.borrow()).unwrap_or(TextPosition::new(0, 0));

	let mut top = binding.top.get();
	if cursor.line < top {
		top = cursor.line;
	} else if height > 0 && cursor.line >= top.saturating_add(height) {
		top = cursor.line.saturating_sub(height - 1);
	}
	binding.top.set(top);

	let rows = match binding.engine.borrow_mut().render(top, height, RenderMode::Full) {
		Ok(rows) => rows,
		Err(err) => return ServiceError::from(err).into(),
	};
	let content = Value::Array(flatten(rows));
	let cursor_value = cursor_in_viewport(cursor, top);
	MethodOutcome::Result(kgr_object!("content" => content, "cursor" => cursor_value))
}

fn open_binding(documents: &DocumentSet, document_id: u64, cursor_id: Option<u64>) -> Result<RenderBinding, ServiceError> {
	let doc = documents.by_id(document_id)?;
	let engine = RenderEngine::new(Rc::clone(doc.text()), Box::new(Utf8Encoding), doc.tagger());
	let engine = Rc::new(RefCell::new(engine));
	let invalidator = Rc::clone(&engine);

	let stream = doc.open_stream();
	let sub = stream.on_change(move |_origin, event, tx| {
		if event != StreamEvent::Commit {
			return;
		}
		let range = TextPositionRange { start: tx.position(), end: TextPosition::MAX };
		invalidator.borrow_mut().invalidate(range);
	});

	Ok(RenderBinding { engine, cursor_id, top: Cell::new(0), _sub: sub })
}

/// Binds a render view onto `document_id` and spawns its dispatch loop
/// directly, skipping the wire `attach` handshake — for the same reason
/// [`crate::cursor::spawn_bound`] does: a widget built in-process must be
/// able to make its first real call the instant it receives the pipe.
pub fn spawn_bound(documents: &Rc<DocumentSet>, positions: &Rc<CursorPositions>, document_id: u64, cursor_id: Option<u64>, manager: &ContextManager) -> Result<Pipe, ServiceError> {
	let binding = open_binding(documents, document_id, cursor_id)?;
	let positions = Rc::clone(positions);
	let (client, server) = Pipe::pair();
	manager.spawn(async move {
		while let Some(request) = server.read_wait().await {
			let method = request.field("method").and_then(Value::as_str).unwrap_or_default().to_string();
			let params = request.field("params").cloned().unwrap_or(Value::Null);
			let outcome = match method.as_str() {
				"render" => handle_render(&binding, &positions, &params),
				"close" => MethodOutcome::Result(Value::Null),
				other => MethodOutcome::Error(format!("Unknown method: {other}")),
			};
			let reply = match outcome {
				MethodOutcome::Result(value) => value,
				MethodOutcome::Error(message) => kgr_object!("error" => message),
			};
			if server.write(reply).is_err() {
				break;
			}
			if method == "close" {
				break;
			}
		}
	});
	Ok(client)
}

/// `/document/render`, per spec.md §6.
pub struct RenderService {
	documents: Rc<DocumentSet>,
	positions: Rc<CursorPositions>,
}

impl RenderService {
	pub fn new(documents: Rc<DocumentSet>, positions: Rc<CursorPositions>) -> Self {
		RenderService { documents, positions }
	}
}

impl Service for RenderService {
	fn attach(&self, pipe: Pipe, manager: &ContextManager) {
		let documents = Rc::clone(&self.documents);
		let positions = Rc::clone(&self.positions);
		let inner = DispatchService::new(move || {
			let binding: Rc<RefCell<Option<RenderBinding>>> = Rc::new(RefCell::new(None));
			let documents = Rc::clone(&documents);
			let positions = Rc::clone(&positions);

			let binding_connect = Rc::clone(&binding);
			let binding_render = Rc::clone(&binding);
			let binding_close = Rc::clone(&binding);

			MethodTableBuilder::new()
				.method("attach", move |params| {
					let Some(id) = params.field("document").and_then(Value::as_int) else {
						return ServiceError::BadParams("missing document".to_string()).into();
					};
					let cursor_id = params.field("cursorId").and_then(Value::as_int).map(|n| n as u64);
					match open_binding(&documents, id as u64, cursor_id) {
						Ok(binding) => {
							*binding_connect.borrow_mut() = Some(binding);
							MethodOutcome::Result(Value::Null)
						}
						Err(err) => err.into(),
					}
				})
				.method("render", move |params| {
					let guard = binding_render.borrow();
					let Some(binding) = guard.as_ref() else {
						return ServiceError::NoDocumentBound.into();
					};
					handle_render(binding, &positions, &params)
				})
				.method("close", move |_params| {
					*binding_close.borrow_mut() = None;
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
	use kestrel_doc::Newline;
	use tokio::task::LocalSet;

	#[tokio::test]
	async fn render_returns_flattened_content_and_a_null_cursor_without_a_cursor_id() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let documents = Rc::new(DocumentSet::new());
				let positions = CursorPositions::new();
				let doc = documents.open("memory://a", Newline::Lf, "ab\ncd");

				let service = RenderService::new(Rc::clone(&documents), Rc::clone(&positions));
				let (client, server) = Pipe::pair();
				service.attach(server, &manager);

				client.write(kgr_object!("method" => "attach", "params" => kgr_object!("document" => doc.id() as i64))).unwrap();
				client.read_wait().await.unwrap();

				client.write(kgr_object!("method" => "render", "params" => kgr_object!("height" => 2_i64, "width" => 80_i64))).unwrap();
				let reply = client.read_wait().await.unwrap();
				let content = reply.field("content").and_then(Value::as_array).unwrap();
				assert!(content.iter().any(|fragment| fragment.field("content").and_then(Value::as_str) == Some("\n")));
				assert_eq!(reply.field("cursor").and_then(|c| c.field("line")).and_then(Value::as_int), Some(0));
			})
			.await;
	}

	#[tokio::test]
	async fn spawn_bound_tracks_a_shared_cursor_position_without_a_handshake() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let documents = Rc::new(DocumentSet::new());
				let positions = CursorPositions::new();
				let doc = documents.new_blank(Newline::Lf);

				let (cursor_client, cursor_id) = crate::cursor::spawn_bound(&documents, &positions, doc.id(), &manager).unwrap();
				cursor_client.write(kgr_object!("method" => "newLine", "params" => Value::Null)).unwrap();
				cursor_client.read_wait().await.unwrap();

				let render_client = spawn_bound(&documents, &positions, doc.id(), Some(cursor_id), &manager).unwrap();
				render_client.write(kgr_object!("method" => "render", "params" => kgr_object!("height" => 5_i64, "width" => 80_i64))).unwrap();
				let reply = render_client.read_wait().await.unwrap();
				assert_eq!(reply.field("cursor").and_then(|c| c.field("line")).and_then(Value::as_int), Some(1));
			})
			.await;
	}
}
