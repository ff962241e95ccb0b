use crate::error::ScreenError;
use crate::geometry::{Position, Size};
use crate::tree::{InputEvent, PaneContent, RenderedFragment, Surface};
use async_trait::async_trait;
use kestrel_pipe::Pipe;
use kestrel_value::{kgr_object, Value};

/// A single key, independent of any particular terminal's encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
	Char(char),
	Enter,
	Tab,
	Backspace,
	Delete,
	ArrowUp,
	ArrowDown,
	ArrowLeft,
	ArrowRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
	pub ctrl: bool,
	pub alt: bool,
	pub shift: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyChord {
	pub key: Key,
	pub modifiers: Modifiers,
}

impl KeyChord {
	pub fn plain(key: Key) -> Self {
		KeyChord { key, modifiers: Modifiers::default() }
	}

	pub fn ctrl(key: Key) -> Self {
		KeyChord { key, modifiers: Modifiers { ctrl: true, ..Modifiers::default() } }
	}
}

/// Which chords trigger undo/redo. Configurable rather than hardcoded:
/// spec.md speaks of "a bound chord", not a fixed key, and the two keys
/// an editor reserves for this vary by convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTable {
	pub undo: KeyChord,
	pub redo: KeyChord,
}

impl Default for KeyTable {
	fn default() -> Self {
		KeyTable { undo: KeyChord::ctrl(Key::Char('z')), redo: KeyChord::ctrl(Key::Char('y')) }
	}
}

/// A thin request/response wrapper over a [`Pipe`]: writes `{method,
/// params}` and awaits the single bare reply. `Pipe` is a plain FIFO with
/// no id-based correlation, so this only works when calls on one pipe are
/// made one at a time and answered in order — true for the per-widget
/// cursor/render pipes this wraps.
pub struct PipeClient {
	pipe: Pipe,
}

impl PipeClient {
	pub fn new(pipe: Pipe) -> Self {
		PipeClient { pipe }
	}

	pub async fn call(&self, method: &str, params: Value) -> Result<Value, ScreenError> {
		let request = kgr_object!("method" => method, "params" => params);
		self.pipe.write(request).map_err(|_| ScreenError::PipeClosed)?;
		self.pipe.read_wait().await.ok_or(ScreenError::PipeClosed)
	}
}

/// A text-editing pane: drives a cursor service and a render service over
/// two pipes, per spec.md §4.13.
pub struct TextEditor {
	cursor: PipeClient,
	render: PipeClient,
	keys: KeyTable,
}

impl TextEditor {
	pub fn new(cursor: Pipe, render: Pipe, keys: KeyTable) -> Self {
		TextEditor { cursor: PipeClient::new(cursor), render: PipeClient::new(render), keys }
	}

	fn chord_of(event: &InputEvent) -> Option<KeyChord> {
		match event {
			InputEvent::Chord { ctrl, alt, shift, key } => Some(KeyChord { key: Key::Char(*key), modifiers: Modifiers { ctrl: *ctrl, alt: *alt, shift: *shift } }),
			InputEvent::Char(c) => Some(KeyChord::plain(Key::Char(*c))),
			InputEvent::Enter => Some(KeyChord::plain(Key::Enter)),
			InputEvent::Backspace => Some(KeyChord::plain(Key::Backspace)),
			InputEvent::Delete => Some(KeyChord::plain(Key::Delete)),
			InputEvent::ArrowUp => Some(KeyChord::plain(Key::ArrowUp)),
			InputEvent::ArrowDown => Some(KeyChord::plain(Key::ArrowDown)),
			InputEvent::ArrowLeft => Some(KeyChord::plain(Key::ArrowLeft)),
			InputEvent::ArrowRight => Some(KeyChord::plain(Key::ArrowRight)),
			InputEvent::Resize(_) => None,
		}
	}

	/// Maps a key to the cursor-service call it produces. Resize events
	/// are consumed by [`TextEditor::render`] instead and are not handled
	/// here.
	fn dispatch(&self, chord: KeyChord) -> Option<(&'static str, Value)> {
		if chord == self.keys.undo {
			return Some(("undo", Value::Null));
		}
		if chord == self.keys.redo {
			return Some(("redo", Value::Null));
		}
		match chord.key {
			Key::Char(c) if !chord.modifiers.ctrl && !chord.modifiers.alt => Some(("insert", kgr_object!("text" => c.to_string()))),
			Key::Tab => Some(("insert", kgr_object!("text" => "\t"))),
			Key::Enter => Some(("newLine", Value::Null)),
			Key::Backspace => Some(("deleteBackward", Value::Null)),
			Key::Delete => Some(("deleteForward", Value::Null)),
			Key::ArrowUp => Some(("moveUp", Value::Null)),
			Key::ArrowDown => Some(("moveDown", Value::Null)),
			Key::ArrowLeft => Some(("moveBackward", Value::Null)),
			Key::ArrowRight => Some(("moveForward", Value::Null)),
			_ => None,
		}
	}

	/// Translates an input event into a cursor-service call and fires it,
	/// ignoring the reply. Returns `true` if the event produced a call.
	pub async fn process_input(&self, event: &InputEvent) -> bool {
		let Some(chord) = Self::chord_of(event) else { return false };
		let Some((method, params)) = self.dispatch(chord) else { return false };
		self.cursor.call(method, params).await.is_ok()
	}

	/// Requests a render of `size` from the render service and turns the
	/// reply's fragment array and cursor position into a [`Surface`].
	pub async fn render(&self, size: Size) -> Result<Surface, ScreenError> {
		let params = kgr_object!("height" => size.height as i64, "width" => size.width as i64);
		let reply = self.render.call("render", params).await?;

		let fragments = reply
			.field("content")
			.and_then(Value::as_array)
			.map(|items| {
				items
					.iter()
					.map(|fragment| {
						let tag = fragment.field("tag").and_then(Value::as_bool).unwrap_or(false);
						let content = fragment.field("content").and_then(Value::as_str).unwrap_or_default().to_string();
						RenderedFragment { tag, content }
					})
					.collect()
			})
			.unwrap_or_default();

		let cursor = reply.field("cursor").and_then(|position| {
			let line = position.field("line").and_then(Value::as_int)? as u16;
			let column = position.field("column").and_then(Value::as_int)? as u16;
			Some(Position::new(column, line))
		});

		Ok(Surface { lines: vec![fragments], cursor })
	}
}

#[async_trait(?Send)]
impl PaneContent for TextEditor {
	async fn render_surface(&mut self, size: Size) -> Surface {
		self.render(size).await.unwrap_or_default()
	}

	fn process_input(&mut self, _event: &InputEvent) -> bool {
		false
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::task::LocalSet;

	#[tokio::test]
	async fn typed_character_calls_insert_on_the_cursor_service() {
		LocalSet::new()
			.run_until(async {
				let (cursor, cursor_remote) = Pipe::pair();
				let (render, _render_remote) = Pipe::pair();
				let editor = TextEditor::new(cursor, render, KeyTable::default());

				tokio::task::spawn_local(async move {
					let request = cursor_remote.read_wait().await.unwrap();
					assert_eq!(request.field("method").and_then(Value::as_str), Some("insert"));
					assert_eq!(request.field("params").and_then(|p| p.field("text")).and_then(Value::as_str), Some("x"));
					cursor_remote.write(Value::Null).unwrap();
				});

				let consumed = editor.process_input(&InputEvent::Char('x')).await;
				assert!(consumed);
			})
			.await;
	}

	#[tokio::test]
	async fn undo_chord_calls_undo_not_insert() {
		LocalSet::new()
			.run_until(async {
				let (cursor, cursor_remote) = Pipe::pair();
				let (render, _render_remote) = Pipe::pair();
				let editor = TextEditor::new(cursor, render, KeyTable::default());

				tokio::task::spawn_local(async move {
					let request = cursor_remote.read_wait().await.unwrap();
					assert_eq!(request.field("method").and_then(Value::as_str), Some("undo"));
					cursor_remote.write(Value::Null).unwrap();
				});

				let consumed = editor.process_input(&InputEvent::Chord { ctrl: true, alt: false, shift: false, key: 'z' }).await;
				assert!(consumed);
			})
			.await;
	}

	#[tokio::test]
	async fn render_turns_fragments_and_cursor_into_a_surface() {
		LocalSet::new()
			.run_until(async {
				let (cursor, _cursor_remote) = Pipe::pair();
				let (render, render_remote) = Pipe::pair();
				let editor = TextEditor::new(cursor, render, KeyTable::default());

				tokio::task::spawn_local(async move {
					let _request = render_remote.read_wait().await.unwrap();
					let reply = kgr_object!(
						"content" => vec![kgr_object!("tag" => true, "content" => "hi")],
						"cursor" => kgr_object!("line" => 2_i64, "column" => 5_i64),
					);
					render_remote.write(reply).unwrap();
				});

				let surface = editor.render(Size::new(80, 24)).await.unwrap();
				assert_eq!(surface.lines[0][0].content, "hi");
				assert!(surface.lines[0][0].tag);
				assert_eq!(surface.cursor, Some(Position::new(5, 2)));
			})
			.await;
	}
}
