//! The path-addressable screen component tree and the text-editor widget
//! built on it, per spec.md §4.12–§4.13. A [`tree::ComponentTree`] holds a
//! root [`tree::Handle`] behind a [`monitor::Monitor`]: containers
//! ([`tree::Multiplexer`], [`tree::Splitter`], [`tree::Tabber`]) nest
//! arbitrarily, addressed by [`path::ComponentPath`], down to leaf
//! [`tree::Component::TextPane`]s such as [`editor::TextEditor`].

mod error;
mod geometry;
mod monitor;
mod path;
mod editor;
mod tree;

pub use error::ScreenError;
pub use geometry::{Constraint, Direction, Position, Rect, Size, distribute};
pub use monitor::{Monitor, MonitorGuard};
pub use path::{ComponentPath, Segment};
pub use editor::{Key, KeyChord, KeyTable, Modifiers, PipeClient, TextEditor};
pub use tree::{
	Component, ComponentTree, Handle, InputEvent, Multiplexer, MultiplexerWindow, PaneContent, RenderedFragment, Splitter, SplitterWindow, Surface, Tabber, resolve_container, resolve_container_mut,
	resolve_handle, resolve_handle_mut,
};
