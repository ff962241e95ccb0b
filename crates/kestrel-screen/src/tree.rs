use crate::error::ScreenError;
use crate::geometry::{Constraint, Direction, Position, Rect, Size, distribute};
use crate::monitor::Monitor;
use crate::path::{ComponentPath, Segment};
use async_trait::async_trait;

/// A keyboard or resize event dispatched down the component tree, per
/// spec.md §4.12's input-dispatch pass.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
	Char(char),
	Enter,
	Backspace,
	Delete,
	ArrowUp,
	ArrowDown,
	ArrowLeft,
	ArrowRight,
	Chord { ctrl: bool, alt: bool, shift: bool, key: char },
	Resize(Size),
}

/// One rendered fragment of a line — mirrors the `{tag, content}` shape
/// `kestrel-render`'s cache entries carry over the wire.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderedFragment {
	pub tag: bool,
	pub content: String,
}

/// A component's rendered pixel/glyph buffer, produced by
/// [`Handle::render_surface`] and read back by [`Handle::show_surface`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Surface {
	pub lines: Vec<Vec<RenderedFragment>>,
	pub cursor: Option<Position>,
}

/// The leaf content behind a [`Component::TextPane`] — typically a
/// [`crate::editor::TextEditor`]. Kept as a trait so this crate doesn't
/// depend on any particular RPC client wiring.
#[async_trait(?Send)]
pub trait PaneContent {
	async fn render_surface(&mut self, size: Size) -> Surface;
	/// Returns `true` if the event was consumed.
	fn process_input(&mut self, event: &InputEvent) -> bool;
}

type InputListener = Box<dyn FnMut(&InputEvent) -> bool>;

/// A handle owns at most one child component plus the ordered list of
/// input listeners that get first refusal on any event descending through
/// it, per spec.md §4.12.
pub struct Handle {
	child: Option<Component>,
	listeners: Vec<InputListener>,
	cached: Surface,
}

impl Handle {
	pub fn empty() -> Self {
		Handle { child: None, listeners: Vec::new(), cached: Surface::default() }
	}

	pub fn with_child(child: Component) -> Self {
		Handle { child: Some(child), listeners: Vec::new(), cached: Surface::default() }
	}

	pub fn child(&self) -> Option<&Component> {
		self.child.as_ref()
	}

	pub fn child_mut(&mut self) -> Option<&mut Component> {
		self.child.as_mut()
	}

	pub fn set_child(&mut self, child: Component) {
		self.child = Some(child);
	}

	/// Appends a listener; listeners run in registration order and the
	/// first to return `true` consumes the event.
	pub fn add_input_listener(&mut self, listener: InputListener) {
		self.listeners.push(listener);
	}

	/// Runs listeners first; if none consume the event it descends into
	/// the child component (and, for containers, into the focused
	/// window).
	pub fn process_input(&mut self, event: &InputEvent) -> bool {
		for listener in &mut self.listeners {
			if listener(event) {
				return true;
			}
		}
		match &mut self.child {
			Some(component) => component.process_input(event),
			None => false,
		}
	}

	pub async fn render_surface(&mut self, size: Size) -> Surface {
		let surface = match &mut self.child {
			Some(component) => component.render_surface(size).await,
			None => Surface::default(),
		};
		self.cached = surface.clone();
		surface
	}

	pub fn cached_surface(&self) -> &Surface {
		&self.cached
	}

	/// Collects `(rect, surface)` pairs in paint order: for containers,
	/// each window in composite order (focused/active last where that
	/// matters); for a leaf, its own cached surface.
	pub fn show_surface(&self, rect: Rect) -> Vec<(Rect, Surface)> {
		match &self.child {
			None => vec![(rect, self.cached.clone())],
			Some(Component::TextPane(_)) => vec![(rect, self.cached.clone())],
			Some(Component::Multiplexer(multiplexer)) => {
				let mut out = Vec::new();
				for window in &multiplexer.windows {
					let window_rect = Rect::new(Position::new(rect.position.x + window.rect.position.x, rect.position.y + window.rect.position.y), window.rect.size);
					out.extend(window.handle.show_surface(window_rect));
				}
				out
			}
			Some(Component::Splitter(splitter)) => {
				let total = match splitter.direction {
					Direction::Horizontal => rect.size.width,
					Direction::Vertical => rect.size.height,
				};
				let cross = match splitter.direction {
					Direction::Horizontal => rect.size.height,
					Direction::Vertical => rect.size.width,
				};
				let sizes = splitter.layout(total);
				let mut out = Vec::new();
				let mut offset = 0u16;
				for (window, extent) in splitter.windows.iter().zip(sizes.iter()) {
					let (position, size) = match splitter.direction {
						Direction::Horizontal => (Position::new(rect.position.x + offset, rect.position.y), Size::new(*extent, cross)),
						Direction::Vertical => (Position::new(rect.position.x, rect.position.y + offset), Size::new(cross, *extent)),
					};
					out.extend(window.handle.show_surface(Rect::new(position, size)));
					offset += extent;
				}
				out
			}
			Some(Component::Tabber(tabber)) => match tabber.windows.get(tabber.active) {
				Some(handle) => handle.show_surface(rect),
				None => Vec::new(),
			},
		}
	}
}

pub struct MultiplexerWindow {
	pub handle: Handle,
	pub rect: Rect,
}

/// Windows are free-floating rectangles on a shared canvas; overlap is
/// resolved by focus order, last entry drawn (and dispatched to) first.
#[derive(Default)]
pub struct Multiplexer {
	pub windows: Vec<MultiplexerWindow>,
}

impl Multiplexer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_window(&mut self, rect: Rect, handle: Handle) -> usize {
		self.windows.push(MultiplexerWindow { handle, rect });
		self.windows.len() - 1
	}

	/// Moves the window at `index` to the back of the focus order.
	pub fn focus(&mut self, index: usize) -> Result<(), ScreenError> {
		if index >= self.windows.len() {
			tracing::debug!(index, windows = self.windows.len(), "multiplexer focus index out of range");
			return Err(ScreenError::PathNotFound(index.to_string()));
		}
		let window = self.windows.remove(index);
		self.windows.push(window);
		Ok(())
	}
}

pub struct SplitterWindow {
	pub handle: Handle,
	pub constraint: Constraint,
}

/// Windows laid out along `direction`, each with a proportional-share
/// [`Constraint`]; `active` is the window that receives input.
pub struct Splitter {
	pub direction: Direction,
	pub windows: Vec<SplitterWindow>,
	pub active: usize,
}

impl Splitter {
	pub fn new(direction: Direction) -> Self {
		Splitter { direction, windows: Vec::new(), active: 0 }
	}

	pub fn add_window(&mut self, constraint: Constraint, handle: Handle) -> usize {
		self.windows.push(SplitterWindow { handle, constraint });
		self.windows.len() - 1
	}

	pub fn focus(&mut self, index: usize) -> Result<(), ScreenError> {
		if index >= self.windows.len() {
			return Err(ScreenError::PathNotFound(index.to_string()));
		}
		self.active = index;
		Ok(())
	}

	/// Distributes `total` cells along the split axis per spec.md §4.12.
	pub fn layout(&self, total: u16) -> Vec<u16> {
		let constraints: Vec<Constraint> = self.windows.iter().map(|w| w.constraint).collect();
		distribute(total, &constraints)
	}
}

/// Windows share the full rect; one is visible (and receives input) at a
/// time.
#[derive(Default)]
pub struct Tabber {
	pub windows: Vec<Handle>,
	pub active: usize,
}

impl Tabber {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add_window(&mut self, handle: Handle) -> usize {
		self.windows.push(handle);
		self.windows.len() - 1
	}

	pub fn select(&mut self, index: usize) -> Result<(), ScreenError> {
		if index >= self.windows.len() {
			return Err(ScreenError::PathNotFound(index.to_string()));
		}
		self.active = index;
		Ok(())
	}
}

/// A node in the path-addressable component tree, per spec.md §4.12.
pub enum Component {
	Multiplexer(Multiplexer),
	Splitter(Splitter),
	Tabber(Tabber),
	TextPane(Box<dyn PaneContent>),
}

impl Component {
	fn process_input(&mut self, event: &InputEvent) -> bool {
		match self {
			Component::Multiplexer(m) => m.windows.last_mut().is_some_and(|w| w.handle.process_input(event)),
			Component::Splitter(s) => {
				let active = s.active;
				s.windows.get_mut(active).is_some_and(|w| w.handle.process_input(event))
			}
			Component::Tabber(t) => {
				let active = t.active;
				t.windows.get_mut(active).is_some_and(|h| h.process_input(event))
			}
			Component::TextPane(pane) => pane.process_input(event),
		}
	}

	async fn render_surface(&mut self, size: Size) -> Surface {
		match self {
			Component::Multiplexer(m) => {
				for window in &mut m.windows {
					let window_size = window.rect.size;
					window.handle.render_surface(window_size).await;
				}
				Surface::default()
			}
			Component::Splitter(s) => {
				let direction = s.direction;
				let total = match direction {
					Direction::Horizontal => size.width,
					Direction::Vertical => size.height,
				};
				let cross = match direction {
					Direction::Horizontal => size.height,
					Direction::Vertical => size.width,
				};
				let sizes = s.layout(total);
				for (window, extent) in s.windows.iter_mut().zip(sizes.iter()) {
					let window_size = match direction {
						Direction::Horizontal => Size::new(*extent, cross),
						Direction::Vertical => Size::new(cross, *extent),
					};
					window.handle.render_surface(window_size).await;
				}
				Surface::default()
			}
			Component::Tabber(t) => {
				let active = t.active;
				if let Some(handle) = t.windows.get_mut(active) {
					handle.render_surface(size).await;
				}
				Surface::default()
			}
			Component::TextPane(pane) => pane.render_surface(size).await,
		}
	}

	fn window_handle(&self, index: usize) -> Result<&Handle, ScreenError> {
		match self {
			Component::Multiplexer(m) => m.windows.get(index).map(|w| &w.handle).ok_or_else(|| ScreenError::PathNotFound(index.to_string())),
			Component::Splitter(s) => s.windows.get(index).map(|w| &w.handle).ok_or_else(|| ScreenError::PathNotFound(index.to_string())),
			Component::Tabber(t) => t.windows.get(index).ok_or_else(|| ScreenError::PathNotFound(index.to_string())),
			Component::TextPane(_) => Err(ScreenError::TypeMismatch),
		}
	}

	fn window_handle_mut(&mut self, index: usize) -> Result<&mut Handle, ScreenError> {
		match self {
			Component::Multiplexer(m) => m.windows.get_mut(index).map(|w| &mut w.handle).ok_or_else(|| ScreenError::PathNotFound(index.to_string())),
			Component::Splitter(s) => s.windows.get_mut(index).map(|w| &mut w.handle).ok_or_else(|| ScreenError::PathNotFound(index.to_string())),
			Component::Tabber(t) => t.windows.get_mut(index).ok_or_else(|| ScreenError::PathNotFound(index.to_string())),
			Component::TextPane(_) => Err(ScreenError::TypeMismatch),
		}
	}

	pub fn as_multiplexer(&self) -> Result<&Multiplexer, ScreenError> {
		match self {
			Component::Multiplexer(m) => Ok(m),
			_ => Err(ScreenError::TypeMismatch),
		}
	}

	pub fn as_multiplexer_mut(&mut self) -> Result<&mut Multiplexer, ScreenError> {
		match self {
			Component::Multiplexer(m) => Ok(m),
			_ => Err(ScreenError::TypeMismatch),
		}
	}

	pub fn as_splitter(&self) -> Result<&Splitter, ScreenError> {
		match self {
			Component::Splitter(s) => Ok(s),
			_ => Err(ScreenError::TypeMismatch),
		}
	}

	pub fn as_splitter_mut(&mut self) -> Result<&mut Splitter, ScreenError> {
		match self {
			Component::Splitter(s) => Ok(s),
			_ => Err(ScreenError::TypeMismatch),
		}
	}

	pub fn as_tabber(&self) -> Result<&Tabber, ScreenError> {
		match self {
			Component::Tabber(t) => Ok(t),
			_ => Err(ScreenError::TypeMismatch),
		}
	}

	pub fn as_tabber_mut(&mut self) -> Result<&mut Tabber, ScreenError> {
		match self {
			Component::Tabber(t) => Ok(t),
			_ => Err(ScreenError::TypeMismatch),
		}
	}

	pub fn as_text_pane_mut(&mut self) -> Result<&mut dyn PaneContent, ScreenError> {
		match self {
			Component::TextPane(pane) => Ok(pane.as_mut()),
			_ => Err(ScreenError::TypeMismatch),
		}
	}
}

/// Traverses from `root` following `path`'s index segments. Fails on a
/// trailing `self` sentinel — use [`resolve_container`] for that case.
pub fn resolve_handle<'a>(root: &'a Handle, path: &ComponentPath) -> Result<&'a Handle, ScreenError> {
	let mut current = root;
	for segment in path.segments() {
		match segment {
			Segment::Index(index) => {
				let component = current.child.as_ref().ok_or_else(|| ScreenError::PathNotFound(index.to_string()))?;
				current = component.window_handle(*index)?;
			}
			Segment::SelfSentinel => return Err(ScreenError::TypeMismatch),
		}
	}
	Ok(current)
}

pub fn resolve_handle_mut<'a>(root: &'a mut Handle, path: &ComponentPath) -> Result<&'a mut Handle, ScreenError> {
	let mut current = root;
	for segment in path.segments() {
		match segment {
			Segment::Index(index) => {
				let component = current.child.as_mut().ok_or_else(|| ScreenError::PathNotFound(index.to_string()))?;
				current = component.window_handle_mut(*index)?;
			}
			Segment::SelfSentinel => return Err(ScreenError::TypeMismatch),
		}
	}
	Ok(current)
}

/// Resolves the container a path addresses: `"/0/1/self"` returns the
/// container at `/0/1`, same as `"/0/1"` with no trailing sentinel — the
/// sentinel exists for callers that need to disambiguate "the container
/// itself" from "window N of that container" when writing the path by
/// hand, not for a different resolution rule.
pub fn resolve_container<'a>(root: &'a Handle, path: &ComponentPath) -> Result<&'a Component, ScreenError> {
	let segments = path.segments();
	let handle_path = if segments.last() == Some(&Segment::SelfSentinel) { ComponentPath(segments[..segments.len() - 1].to_vec()) } else { ComponentPath(segments.to_vec()) };
	let handle = resolve_handle(root, &handle_path)?;
	handle.child().ok_or(ScreenError::TypeMismatch)
}

pub fn resolve_container_mut<'a>(root: &'a mut Handle, path: &ComponentPath) -> Result<&'a mut Component, ScreenError> {
	let segments = path.segments();
	let handle_path = if segments.last() == Some(&Segment::SelfSentinel) { ComponentPath(segments[..segments.len() - 1].to_vec()) } else { ComponentPath(segments.to_vec()) };
	let handle = resolve_handle_mut(root, &handle_path)?;
	handle.child_mut().ok_or(ScreenError::TypeMismatch)
}

/// The whole screen component tree, serialized behind a [`Monitor`] per
/// spec.md §4.12/§5.
pub struct ComponentTree {
	monitor: Monitor<Handle>,
}

impl ComponentTree {
	pub fn new(root: Handle) -> Self {
		ComponentTree { monitor: Monitor::new(root) }
	}

	pub fn is_holder(&self) -> bool {
		self.monitor.is_holder()
	}

	/// Takes the monitor for the duration of `f`, refusing with
	/// `DeadlockPrevented` if the calling thread already holds it.
	pub fn with_tree<R>(&self, f: impl FnOnce(&mut Handle) -> R) -> Result<R, ScreenError> {
		let mut guard = self.monitor.lock()?;
		Ok(f(&mut guard))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct StubPane {
		rendered: Surface,
		consume_next: bool,
	}

	#[async_trait(?Send)]
	impl PaneContent for StubPane {
		async fn render_surface(&mut self, _size: Size) -> Surface {
			self.rendered.clone()
		}

		fn process_input(&mut self, _event: &InputEvent) -> bool {
			self.consume_next
		}
	}

	fn stub_pane(content: &str, consumes: bool) -> Handle {
		let surface = Surface { lines: vec![vec![RenderedFragment { tag: false, content: content.to_string() }]], cursor: None };
		Handle::with_child(Component::TextPane(Box::new(StubPane { rendered: surface, consume_next: consumes })))
	}

	#[test]
	fn traverse_splitter_window_by_index() {
		let mut splitter = Splitter::new(Direction::Horizontal);
		splitter.add_window(Constraint::new(1.0, 0, 200), stub_pane("left", false));
		splitter.add_window(Constraint::new(1.0, 0, 200), stub_pane("right", false));
		let root = Handle::with_child(Component::Splitter(splitter));

		let path = ComponentPath::parse("/1").unwrap();
		let handle = resolve_handle(&root, &path).unwrap();
		assert!(matches!(handle.child(), Some(Component::TextPane(_))));
	}

	#[test]
	fn self_sentinel_resolves_the_container_not_a_window() {
		let mut splitter = Splitter::new(Direction::Vertical);
		splitter.add_window(Constraint::new(1.0, 0, 200), stub_pane("top", false));
		let root = Handle::with_child(Component::Splitter(splitter));

		let path = ComponentPath::parse("/self").unwrap();
		let container = resolve_container(&root, &path).unwrap();
		assert!(container.as_splitter().is_ok());
	}

	#[test]
	fn wrong_variant_access_is_type_mismatch() {
		let root = Handle::with_child(Component::Tabber(Tabber::new()));
		let path = ComponentPath::parse("/self").unwrap();
		let container = resolve_container(&root, &path).unwrap();
		assert_eq!(container.as_splitter().unwrap_err(), ScreenError::TypeMismatch);
	}

	#[test]
	fn missing_window_index_is_path_not_found() {
		let root = Handle::with_child(Component::Tabber(Tabber::new()));
		let path = ComponentPath::parse("/0").unwrap();
		assert!(matches!(resolve_handle(&root, &path), Err(ScreenError::PathNotFound(_))));
	}

	#[test]
	fn listener_consumes_before_the_event_descends() {
		let mut root = stub_pane("leaf", false);
		let mut saw_event = false;
		root.add_input_listener(Box::new(move |_event| {
			saw_event = true;
			true
		}));
		let consumed = root.process_input(&InputEvent::Enter);
		assert!(consumed);
	}

	#[test]
	fn event_descends_into_the_child_when_no_listener_consumes() {
		let mut root = stub_pane("leaf", true);
		assert!(root.process_input(&InputEvent::Enter));
	}

	#[test]
	fn tabber_dispatches_only_to_the_active_window() {
		let mut tabber = Tabber::new();
		tabber.add_window(stub_pane("first", false));
		tabber.add_window(stub_pane("second", true));
		tabber.select(1).unwrap();
		let mut root = Handle::with_child(Component::Tabber(tabber));
		assert!(root.process_input(&InputEvent::Enter));
	}

	#[tokio::test]
	async fn splitter_layout_sizes_match_render_and_show_surface() {
		let mut splitter = Splitter::new(Direction::Horizontal);
		splitter.add_window(Constraint::new(1.0, 0, 200), stub_pane("left", false));
		splitter.add_window(Constraint::new(1.0, 0, 200), stub_pane("right", false));
		let mut root = Handle::with_child(Component::Splitter(splitter));

		root.render_surface(Size::new(100, 10)).await;
		let shown = root.show_surface(Rect::new(Position::default(), Size::new(100, 10)));
		assert_eq!(shown.len(), 2);
		assert_eq!(shown[0].0.size, Size::new(50, 10));
		assert_eq!(shown[1].0.position, Position::new(50, 0));
		assert_eq!(shown[0].1.lines[0][0].content, "left");
		assert_eq!(shown[1].1.lines[0][0].content, "right");
	}

	#[test]
	fn monitor_refuses_reentrant_tree_access() {
		let tree = ComponentTree::new(Handle::empty());
		assert!(!tree.is_holder());
		let result = tree.with_tree(|_root| {
			assert!(tree.is_holder());
			tree.with_tree(|_| ())
		});
		assert_eq!(result.unwrap().unwrap_err(), ScreenError::DeadlockPrevented);
	}
}
