use crate::cursor::{self, CursorPositions};
use crate::dispatch::{DispatchService, MethodTableBuilder};
use crate::error::ServiceError;
use crate::render;
use async_trait::async_trait;
use kestrel_doc::DocumentSet;
use kestrel_pipe::{ContextManager, Pipe};
use kestrel_rpc::{MethodOutcome, Service};
use kestrel_screen::{
	Component, ComponentPath, ComponentTree, Constraint, Direction, Handle, InputEvent, KeyTable, PaneContent, Position, Rect, ScreenError, Size, Surface, TextEditor, resolve_container_mut,
	resolve_handle, resolve_handle_mut,
};
use kestrel_value::{Value, kgr_object};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// The leaf a freshly created window starts out holding until
/// `newTextEditor` gives it real content — the tree always needs a child to
/// walk for composition, even an empty one.
struct PlaceholderPane;

#[async_trait(?Send)]
impl PaneContent for PlaceholderPane {
	async fn render_surface(&mut self, _size: Size) -> Surface {
		Surface::default()
	}

	fn process_input(&mut self, _event: &InputEvent) -> bool {
		false
	}
}

/// The tree's own leaf for a text editor: shares the same [`TextEditor`]
/// `/screen/component/text/pane` drives directly, so the generic
/// `Handle::render_surface` composite pass shows real content instead of a
/// placeholder. `process_input` stays `false` here exactly as it does on
/// `TextEditor`'s own [`PaneContent`] impl — a keystroke destined for a
/// pane goes through `/screen/component/text/pane`, not the generic
/// synchronous tree dispatch, since driving a cursor is inherently async.
struct TreePane(Rc<TextEditor>);

#[async_trait(?Send)]
impl PaneContent for TreePane {
	async fn render_surface(&mut self, size: Size) -> Surface {
		self.0.render(size).await.unwrap_or_default()
	}

	fn process_input(&mut self, _event: &InputEvent) -> bool {
		false
	}
}

/// Registers every [`TextEditor`] `newTextEditor` creates, keyed by a fresh
/// pane id — `/screen/component/text/pane` looks panes up here rather than
/// through the tree, since `Component::TextPane` erases back to `dyn
/// PaneContent` and loses the concrete methods a remote caller needs to
/// drive keystrokes and renders one at a time.
#[derive(Default)]
pub struct TextPaneRegistry {
	next_id: RefCell<u64>,
	panes: RefCell<HashMap<u64, Rc<TextEditor>>>,
}

impl TextPaneRegistry {
	pub fn new() -> Rc<Self> {
		Rc::new(TextPaneRegistry::default())
	}

	fn register(&self, editor: Rc<TextEditor>) -> u64 {
		let mut next = self.next_id.borrow_mut();
		let id = *next;
		*next += 1;
		self.panes.borrow_mut().insert(id, editor);
		id
	}

	pub fn get(&self, id: u64) -> Option<Rc<TextEditor>> {
		self.panes.borrow().get(&id).cloned()
	}
}

fn path_param(params: &Value) -> Result<ComponentPath, ServiceError> {
	let raw = params.field("path").and_then(Value::as_str).ok_or_else(|| ServiceError::BadParams("missing path".to_string()))?;
	Ok(ComponentPath::parse(raw)?)
}

fn direction_param(params: &Value) -> Result<Direction, ServiceError> {
	match params.field("direction").and_then(Value::as_str) {
		Some("horizontal") => Ok(Direction::Horizontal),
		Some("vertical") => Ok(Direction::Vertical),
		_ => Err(ServiceError::BadParams("direction must be \"horizontal\" or \"vertical\"".to_string())),
	}
}

fn info_value(component: Option<&Component>) -> Value {
	match component {
		None => kgr_object!("kind" => "empty"),
		Some(Component::Multiplexer(m)) => kgr_object!("kind" => "multiplexer", "windows" => m.windows.len() as i64),
		Some(Component::Splitter(s)) => kgr_object!("kind" => "splitter", "windows" => s.windows.len() as i64, "active" => s.active as i64, "direction" => match s.direction {
			Direction::Horizontal => "horizontal",
			Direction::Vertical => "vertical",
		}),
		Some(Component::Tabber(t)) => kgr_object!("kind" => "tabber", "windows" => t.windows.len() as i64, "active" => t.active as i64),
		Some(Component::TextPane(_)) => kgr_object!("kind" => "textPane"),
	}
}

/// `/screen/manager`, per spec.md §4.12–§4.13: creates and inspects nodes
/// in the path-addressable component tree. Windows are only ever added,
/// never removed — `Multiplexer`/`Splitter`/`Tabber` expose no removal
/// operation to build one on top of, so this is narrower than the tree
/// surface `original_source/components/framework/headers/sloked/screen/
/// Screen.h` describes; see DESIGN.md.
pub struct ScreenManagerService {
	tree: Rc<ComponentTree>,
	documents: Rc<DocumentSet>,
	positions: Rc<CursorPositions>,
	panes: Rc<TextPaneRegistry>,
}

impl ScreenManagerService {
	pub fn new(tree: Rc<ComponentTree>, documents: Rc<DocumentSet>, positions: Rc<CursorPositions>, panes: Rc<TextPaneRegistry>) -> Self {
		ScreenManagerService { tree, documents, positions, panes }
	}
}

impl Service for ScreenManagerService {
	fn attach(&self, pipe: Pipe, manager: &ContextManager) {
		let tree = Rc::clone(&self.tree);
		let documents = Rc::clone(&self.documents);
		let positions = Rc::clone(&self.positions);
		let panes = Rc::clone(&self.panes);
		let context = *manager;

		let inner = DispatchService::new(move || {
			let tree = Rc::clone(&tree);
			let documents = Rc::clone(&documents);
			let positions = Rc::clone(&positions);
			let panes = Rc::clone(&panes);

			let tree_multiplexer = Rc::clone(&tree);
			let tree_splitter = Rc::clone(&tree);
			let tree_tabber = Rc::clone(&tree);
			let tree_window = Rc::clone(&tree);
			let tree_editor = Rc::clone(&tree);
			let tree_info = Rc::clone(&tree);
			let tree_focus = Rc::clone(&tree);

			MethodTableBuilder::new()
				.method("newMultiplexer", move |params| {
					let path = match path_param(&params) {
						Ok(path) => path,
						Err(err) => return err.into(),
					};
					let result = tree_multiplexer.with_tree(|root| {
						resolve_handle_mut(root, &path).map(|handle| handle.set_child(Component::Multiplexer(kestrel_screen::Multiplexer::new())))
					});
					match result {
						Ok(Ok(())) => MethodOutcome::Result(Value::Null),
						Ok(Err(err)) => ServiceError::from(err).into(),
						Err(err) => ServiceError::from(err).into(),
					}
				})
				.method("newSplitter", move |params| {
					let path = match path_param(&params) {
						Ok(path) => path,
						Err(err) => return err.into(),
					};
					let direction = match direction_param(&params) {
						Ok(direction) => direction,
						Err(err) => return err.into(),
					};
					let result = tree_splitter.with_tree(|root| resolve_handle_mut(root, &path).map(|handle| handle.set_child(Component::Splitter(kestrel_screen::Splitter::new(direction)))));
					match result {
						Ok(Ok(())) => MethodOutcome::Result(Value::Null),
						Ok(Err(err)) => ServiceError::from(err).into(),
						Err(err) => ServiceError::from(err).into(),
					}
				})
				.method("newTabber", move |params| {
					let path = match path_param(&params) {
						Ok(path) => path,
						Err(err) => return err.into(),
					};
					let result = tree_tabber.with_tree(|root| resolve_handle_mut(root, &path).map(|handle| handle.set_child(Component::Tabber(kestrel_screen::Tabber::new()))));
					match result {
						Ok(Ok(())) => MethodOutcome::Result(Value::Null),
						Ok(Err(err)) => ServiceError::from(err).into(),
						Err(err) => ServiceError::from(err).into(),
					}
				})
				.method("newWindow", move |params| {
					let path = match path_param(&params) {
						Ok(path) => path,
						Err(err) => return err.into(),
					};
					let result = tree_window.with_tree(|root| -> Result<usize, ScreenError> {
						let container = resolve_container_mut(root, &path)?;
						match container {
							Component::Multiplexer(m) => {
								let x = params.field("x").and_then(Value::as_int).unwrap_or(0) as u16;
								let y = params.field("y").and_then(Value::as_int).unwrap_or(0) as u16;
								let width = params.field("width").and_then(Value::as_int).unwrap_or(0) as u16;
								let height = params.field("height").and_then(Value::as_int).unwrap_or(0) as u16;
								let rect = Rect::new(Position::new(x, y), Size::new(width, height));
								Ok(m.add_window(rect, Handle::with_child(Component::TextPane(Box::new(PlaceholderPane)))))
							}
							Component::Splitter(s) => {
								let dimension = params.field("dimension").and_then(Value::as_float).unwrap_or(1.0) as f32;
								let min = params.field("min").and_then(Value::as_int).unwrap_or(0) as u16;
								let max = params.field("max").and_then(Value::as_int).unwrap_or(u16::MAX as i64) as u16;
								let constraint = Constraint::new(dimension, min, max);
								Ok(s.add_window(constraint, Handle::with_child(Component::TextPane(Box::new(PlaceholderPane)))))
							}
							Component::Tabber(t) => Ok(t.add_window(Handle::with_child(Component::TextPane(Box::new(PlaceholderPane))))),
							Component::TextPane(_) => Err(ScreenError::TypeMismatch),
						}
					});
					match result {
						Ok(Ok(index)) => MethodOutcome::Result(kgr_object!("index" => index as i64)),
						Ok(Err(err)) => ServiceError::from(err).into(),
						Err(err) => ServiceError::from(err).into(),
					}
				})
				.method("newTextEditor", move |params| {
					let path = match path_param(&params) {
						Ok(path) => path,
						Err(err) => return err.into(),
					};
					let Some(document_id) = params.field("document").and_then(Value::as_int) else {
						return ServiceError::BadParams("missing document".to_string()).into();
					};

					let (cursor_pipe, cursor_id) = match cursor::spawn_bound(&documents, &positions, document_id as u64, &context) {
						Ok(bound) => bound,
						Err(err) => return err.into(),
					};
					let render_pipe = match render::spawn_bound(&documents, &positions, document_id as u64, Some(cursor_id), &context) {
						Ok(pipe) => pipe,
						Err(err) => return err.into(),
					};

					let editor = Rc::new(TextEditor::new(cursor_pipe, render_pipe, KeyTable::default()));
					let pane_id = panes.register(Rc::clone(&editor));

					let result = tree_editor.with_tree(|root| resolve_handle_mut(root, &path).map(|handle| handle.set_child(Component::TextPane(Box::new(TreePane(editor))))));
					match result {
						Ok(Ok(())) => MethodOutcome::Result(kgr_object!("paneId" => pane_id as i64, "cursorId" => cursor_id as i64)),
						Ok(Err(err)) => ServiceError::from(err).into(),
						Err(err) => ServiceError::from(err).into(),
					}
				})
				.method("getInfo", move |params| {
					let raw = params.as_str().or_else(|| params.field("path").and_then(Value::as_str));
					let Some(raw) = raw else {
						return ServiceError::BadParams("missing path".to_string()).into();
					};
					let path = match ComponentPath::parse(raw) {
						Ok(path) => path,
						Err(err) => return ServiceError::from(err).into(),
					};
					let result = tree_info.with_tree(|root| resolve_handle(root, &path).map(|handle| info_value(handle.child())));
					match result {
						Ok(Ok(value)) => MethodOutcome::Result(value),
						Ok(Err(err)) => ServiceError::from(err).into(),
						Err(err) => ServiceError::from(err).into(),
					}
				})
				.method("setFocus", move |params| {
					let path = match path_param(&params) {
						Ok(path) => path,
						Err(err) => return err.into(),
					};
					let Some(index) = params.field("index").and_then(Value::as_int) else {
						return ServiceError::BadParams("missing index".to_string()).into();
					};
					let index = index as usize;
					let result = tree_focus.with_tree(|root| -> Result<(), ScreenError> {
						let container = resolve_container_mut(root, &path)?;
						match container {
							Component::Multiplexer(m) => m.focus(index),
							Component::Splitter(s) => s.focus(index),
							Component::Tabber(t) => t.select(index),
							Component::TextPane(_) => Err(ScreenError::TypeMismatch),
						}
					});
					match result {
						Ok(Ok(())) => MethodOutcome::Result(Value::Null),
						Ok(Err(err)) => ServiceError::from(err).into(),
						Err(err) => ServiceError::from(err).into(),
					}
				})
				.build()
		});
		inner.attach(pipe, manager);
	}
}

fn parse_input_event(params: &Value) -> Option<InputEvent> {
	match params.field("type").and_then(Value::as_str)? {
		"char" => Some(InputEvent::Char(params.field("value").and_then(Value::as_str)?.chars().next()?)),
		"enter" => Some(InputEvent::Enter),
		"backspace" => Some(InputEvent::Backspace),
		"delete" => Some(InputEvent::Delete),
		"arrowUp" => Some(InputEvent::ArrowUp),
		"arrowDown" => Some(InputEvent::ArrowDown),
		"arrowLeft" => Some(InputEvent::ArrowLeft),
		"arrowRight" => Some(InputEvent::ArrowRight),
		"chord" => Some(InputEvent::Chord {
			ctrl: params.field("ctrl").and_then(Value::as_bool).unwrap_or(false),
			alt: params.field("alt").and_then(Value::as_bool).unwrap_or(false),
			shift: params.field("shift").and_then(Value::as_bool).unwrap_or(false),
			key: params.field("key").and_then(Value::as_str)?.chars().next()?,
		}),
		"resize" => Some(InputEvent::Resize(Size::new(
			params.field("width").and_then(Value::as_int)? as u16,
			params.field("height").and_then(Value::as_int)? as u16,
		))),
		_ => None,
	}
}

/// `/screen/component/input/forward`, per spec.md §4.12: dispatches one
/// event into the tree from its root. `Handle::process_input` already
/// descends through a container's focused window on its own, so no path is
/// needed — the whole tree is a single call.
pub struct ScreenInputForwardService {
	tree: Rc<ComponentTree>,
	broadcast: Rc<RefCell<Vec<Rc<Pipe>>>>,
}

impl ScreenInputForwardService {
	pub fn new(tree: Rc<ComponentTree>, broadcast: Rc<RefCell<Vec<Rc<Pipe>>>>) -> Self {
		ScreenInputForwardService { tree, broadcast }
	}
}

impl Service for ScreenInputForwardService {
	fn attach(&self, pipe: Pipe, manager: &ContextManager) {
		let tree = Rc::clone(&self.tree);
		let broadcast = Rc::clone(&self.broadcast);
		let inner = DispatchService::new(move || {
			let tree = Rc::clone(&tree);
			let broadcast = Rc::clone(&broadcast);
			MethodTableBuilder::new()
				.method("forward", move |params| {
					let Some(event) = parse_input_event(&params) else {
						return ServiceError::BadParams("invalid event".to_string()).into();
					};
					let result = tree.with_tree(|root| root.process_input(&event));
					match result {
						Ok(consumed) => {
							broadcast.borrow_mut().retain(|pipe| !pipe.is_closed());
							for pipe in broadcast.borrow().iter() {
								let _ = pipe.write(params.clone());
							}
							MethodOutcome::Result(Value::Bool(consumed))
						}
						Err(err) => ServiceError::from(err).into(),
					}
				})
				.build()
		});
		inner.attach(pipe, manager);
	}
}

/// `/screen/component/input/notify`, per spec.md §4.12: a push-only mirror
/// of every event `/screen/component/input/forward` has dispatched, for a
/// second screen (or a test harness) to observe without itself driving the
/// tree.
pub struct ScreenInputNotifyService {
	broadcast: Rc<RefCell<Vec<Rc<Pipe>>>>,
}

impl ScreenInputNotifyService {
	pub fn new(broadcast: Rc<RefCell<Vec<Rc<Pipe>>>>) -> Self {
		ScreenInputNotifyService { broadcast }
	}
}

impl Service for ScreenInputNotifyService {
	fn attach(&self, pipe: Pipe, _manager: &ContextManager) {
		self.broadcast.borrow_mut().push(Rc::new(pipe));
	}
}

/// `/screen/size/notify`, per spec.md §4.12: a push-only feed of `{width,
/// height}` resize events, mirroring `/document/notify`'s shape. Nothing in
/// this crate drives a real terminal, so nothing calls
/// [`ScreenSizeNotifyService::broadcast`] yet — the owning screen thread is
/// expected to, on each resize signal it receives.
pub struct ScreenSizeNotifyService {
	subscribers: Rc<RefCell<Vec<Rc<Pipe>>>>,
}

impl ScreenSizeNotifyService {
	pub fn new() -> Self {
		ScreenSizeNotifyService { subscribers: Rc::new(RefCell::new(Vec::new())) }
	}

	pub fn broadcast(&self, size: Size) {
		let mut subscribers = self.subscribers.borrow_mut();
		subscribers.retain(|pipe| !pipe.is_closed());
		for pipe in subscribers.iter() {
			let _ = pipe.write(kgr_object!("width" => size.width as i64, "height" => size.height as i64));
		}
	}
}

impl Default for ScreenSizeNotifyService {
	fn default() -> Self {
		ScreenSizeNotifyService::new()
	}
}

impl Service for ScreenSizeNotifyService {
	fn attach(&self, pipe: Pipe, _manager: &ContextManager) {
		self.subscribers.borrow_mut().push(Rc::new(pipe));
	}
}

/// `/screen/component/text/pane`, per spec.md §4.13: a connection's
/// interactive view of one [`TextEditor`] `newTextEditor` created. Kept
/// outside [`DispatchService`] because its real work — forwarding a
/// keystroke or a render request over the editor's own cursor/render pipes
/// — is async, and [`crate::dispatch::MethodHandler`] is not.
pub struct ScreenTextPaneService {
	panes: Rc<TextPaneRegistry>,
}

impl ScreenTextPaneService {
	pub fn new(panes: Rc<TextPaneRegistry>) -> Self {
		ScreenTextPaneService { panes }
	}
}

impl Service for ScreenTextPaneService {
	fn attach(&self, pipe: Pipe, manager: &ContextManager) {
		let panes = Rc::clone(&self.panes);
		manager.spawn(async move {
			let Some(request) = pipe.read_wait().await else { return };
			let Some(pane_id) = request.field("params").and_then(|p| p.field("paneId")).and_then(Value::as_int) else {
				let _ = pipe.write(kgr_object!("error" => ServiceError::BadParams("missing paneId".to_string()).to_string()));
				return;
			};
			let Some(editor) = panes.get(pane_id as u64) else {
				let _ = pipe.write(kgr_object!("error" => ServiceError::UnknownScreen(pane_id as u64).to_string()));
				return;
			};
			let _ = pipe.write(Value::Null);

			while let Some(request) = pipe.read_wait().await {
				let method = request.field("method").and_then(Value::as_str).unwrap_or_default().to_string();
				let params = request.field("params").cloned().unwrap_or(Value::Null);
				let reply = match method.as_str() {
					"processInput" => match parse_input_event(&params) {
						Some(event) => Value::Bool(editor.process_input(&event).await),
						None => kgr_object!("error" => ServiceError::BadParams("invalid event".to_string()).to_string()),
					},
					"render" => {
						let (Some(height), Some(width)) = (params.field("height").and_then(Value::as_int), params.field("width").and_then(Value::as_int)) else {
							let _ = pipe.write(kgr_object!("error" => ServiceError::BadParams("missing height/width".to_string()).to_string()));
							continue;
						};
						match editor.render(Size::new(width as u16, height as u16)).await {
							Ok(surface) => {
								let fragments = surface
									.lines
									.first()
									.map(|line| line.iter().map(|fragment| kgr_object!("tag" => fragment.tag, "content" => fragment.content.clone())).collect())
									.unwrap_or_default();
								let cursor = surface
									.cursor
									.map(|position| kgr_object!("line" => position.y as i64, "column" => position.x as i64))
									.unwrap_or(Value::Null);
								kgr_object!("content" => Value::Array(fragments), "cursor" => cursor)
							}
							Err(err) => kgr_object!("error" => err.to_string()),
						}
					}
					other => kgr_object!("error" => format!("Unknown method: {other}")),
				};
				if pipe.write(reply).is_err() {
					break;
				}
			}
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use kestrel_doc::Newline;
	use tokio::task::LocalSet;

	fn new_tree() -> Rc<ComponentTree> {
		Rc::new(ComponentTree::new(Handle::empty()))
	}

	#[tokio::test]
	async fn builds_a_splitter_with_two_windows_and_reports_their_count() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let tree = new_tree();
				let documents = Rc::new(DocumentSet::new());
				let positions = CursorPositions::new();
				let panes = TextPaneRegistry::new();

				let service = ScreenManagerService::new(Rc::clone(&tree), documents, positions, panes);
				let (client, server) = Pipe::pair();
				service.attach(server, &manager);

				client.write(kgr_object!("method" => "newSplitter", "params" => kgr_object!("path" => "/", "direction" => "horizontal"))).unwrap();
				client.read_wait().await.unwrap();

				client.write(kgr_object!("method" => "newWindow", "params" => kgr_object!("path" => "/self", "dimension" => 1.0))).unwrap();
				let first = client.read_wait().await.unwrap();
				assert_eq!(first.field("index").and_then(Value::as_int), Some(0));

				client.write(kgr_object!("method" => "newWindow", "params" => kgr_object!("path" => "/self", "dimension" => 1.0))).unwrap();
				client.read_wait().await.unwrap();

				client.write(kgr_object!("method" => "getInfo", "params" => Value::String("/".to_string()))).unwrap();
				let info = client.read_wait().await.unwrap();
				assert_eq!(info.field("kind").and_then(Value::as_str), Some("splitter"));
				assert_eq!(info.field("windows").and_then(Value::as_int), Some(2));
			})
			.await;
	}

	#[tokio::test]
	async fn new_text_editor_wires_a_live_cursor_and_render_pair() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let tree = new_tree();
				let documents = Rc::new(DocumentSet::new());
				let positions = CursorPositions::new();
				let panes = TextPaneRegistry::new();
				let doc = documents.new_blank(Newline::Lf);

				let service = ScreenManagerService::new(Rc::clone(&tree), Rc::clone(&documents), Rc::clone(&positions), Rc::clone(&panes));
				let (client, server) = Pipe::pair();
				service.attach(server, &manager);

				client.write(kgr_object!("method" => "newMultiplexer", "params" => kgr_object!("path" => "/"))).unwrap();
				client.read_wait().await.unwrap();

				client.write(kgr_object!("method" => "newWindow", "params" => kgr_object!("path" => "/self", "width" => 80_i64, "height" => 24_i64))).unwrap();
				client.read_wait().await.unwrap();

				client.write(kgr_object!("method" => "newTextEditor", "params" => kgr_object!("path" => "/0", "document" => doc.id() as i64))).unwrap();
				let reply = client.read_wait().await.unwrap();
				let pane_id = reply.field("paneId").and_then(Value::as_int).unwrap() as u64;

				let editor = panes.get(pane_id).unwrap();
				let surface = editor.render(Size::new(80, 24)).await.unwrap();
				assert_eq!(surface.lines.len(), 1);
			})
			.await;
	}

	#[tokio::test]
	async fn forward_dispatches_into_the_focused_window() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let tree = new_tree();
				let documents = Rc::new(DocumentSet::new());
				let positions = CursorPositions::new();
				let panes = TextPaneRegistry::new();
				let doc = documents.new_blank(Newline::Lf);

				let manager_service = ScreenManagerService::new(Rc::clone(&tree), Rc::clone(&documents), Rc::clone(&positions), Rc::clone(&panes));
				let (manager_client, manager_server) = Pipe::pair();
				manager_service.attach(manager_server, &manager);

				manager_client.write(kgr_object!("method" => "newMultiplexer", "params" => kgr_object!("path" => "/"))).unwrap();
				manager_client.read_wait().await.unwrap();
				manager_client.write(kgr_object!("method" => "newWindow", "params" => kgr_object!("path" => "/self"))).unwrap();
				manager_client.read_wait().await.unwrap();
				manager_client.write(kgr_object!("method" => "newTextEditor", "params" => kgr_object!("path" => "/0", "document" => doc.id() as i64))).unwrap();
				let reply = manager_client.read_wait().await.unwrap();
				let cursor_id = reply.field("cursorId").and_then(Value::as_int).unwrap() as u64;
				assert!(positions.get(cursor_id).is_some());

				let broadcast = Rc::new(RefCell::new(Vec::new()));
				let input_service = ScreenInputForwardService::new(Rc::clone(&tree), broadcast);
				let (input_client, input_server) = Pipe::pair();
				input_service.attach(input_server, &manager);

				input_client.write(kgr_object!("method" => "forward", "params" => kgr_object!("type" => "char", "value" => "q"))).unwrap();
				let forwarded = input_client.read_wait().await.unwrap();
				assert_eq!(forwarded, Value::Bool(false));
			})
			.await;
	}

	#[test]
	fn reentrant_lock_reports_deadlock_prevented_not_a_hang() {
		let tree = ComponentTree::new(Handle::empty());
		let outer = tree.with_tree(|_root| {
			let inner = tree.with_tree(|_root| ());
			assert!(matches!(inner, Err(ScreenError::DeadlockPrevented)));
		});
		assert!(outer.is_ok());
	}
}
