use kestrel_value::Value;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipeError {
	#[error("pipe is closed")]
	Closed,
}

struct Queue {
	items: VecDeque<Value>,
	listener: Option<Box<dyn FnMut()>>,
}

impl Queue {
	fn new() -> Self {
		Queue { items: VecDeque::new(), listener: None }
	}

	fn push(&mut self, value: Value) {
		self.items.push_back(value);
		if self.items.len() == 1 {
			if let Some(listener) = self.listener.as_mut() {
				listener();
			}
		}
	}
}

/// One endpoint of a full-duplex, in-process channel of [`Value`]s, per
/// spec.md §3/§4.8. `Pipe::pair` creates both endpoints at once, each
/// endpoint's outgoing queue feeding the other's incoming queue.
///
/// Closing is a single shared lifecycle: either endpoint calling
/// [`Pipe::close`] closes the whole connection, matching the spec's
/// `Open`/`Closed` pipe lifecycle rather than a per-direction one.
pub struct Pipe {
	outgoing: Rc<RefCell<Queue>>,
	incoming: Rc<RefCell<Queue>>,
	closed: Rc<Cell<bool>>,
}

impl Pipe {
	pub fn pair() -> (Pipe, Pipe) {
		let a_to_b = Rc::new(RefCell::new(Queue::new()));
		let b_to_a = Rc::new(RefCell::new(Queue::new()));
		let closed = Rc::new(Cell::new(false));
		let a = Pipe { outgoing: Rc::clone(&a_to_b), incoming: Rc::clone(&b_to_a), closed: Rc::clone(&closed) };
		let b = Pipe { outgoing: b_to_a, incoming: a_to_b, closed };
		(a, b)
	}

	pub fn write(&self, value: Value) -> Result<(), PipeError> {
		if self.closed.get() {
			return Err(PipeError::Closed);
		}
		self.outgoing.borrow_mut().push(value);
		Ok(())
	}

	pub fn read(&self) -> Option<Value> {
		self.incoming.borrow_mut().items.pop_front()
	}

	/// Cooperatively waits until the incoming queue is non-empty or the
	/// pipe is closed. Never blocks the executing thread — it only ever
	/// yields between polls, so it's safe to call from a context-manager
	/// task.
	pub async fn read_wait(&self) -> Option<Value> {
		loop {
			if let Some(value) = self.read() {
				return Some(value);
			}
			if self.closed.get() {
				return None;
			}
			tokio::task::yield_now().await;
		}
	}

	pub fn close(&self) {
		self.closed.set(true);
	}

	pub fn is_closed(&self) -> bool {
		self.closed.get()
	}

	/// Registers the message listener, replacing any previous one
	/// (idempotent per spec.md §4.8). Fires at most once per
	/// empty-to-non-empty transition of this endpoint's incoming queue.
	pub fn on_message(&self, listener: impl FnMut() + 'static) {
		self.incoming.borrow_mut().listener = Some(Box::new(listener));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn write_then_read_delivers_in_fifo_order() {
		let (a, b) = Pipe::pair();
		a.write(Value::Int(1)).unwrap();
		a.write(Value::Int(2)).unwrap();
		assert_eq!(b.read(), Some(Value::Int(1)));
		assert_eq!(b.read(), Some(Value::Int(2)));
		assert_eq!(b.read(), None);
	}

	#[test]
	fn write_after_close_fails() {
		let (a, b) = Pipe::pair();
		a.close();
		assert_eq!(b.write(Value::Null), Err(PipeError::Closed));
	}

	#[test]
	fn reads_drain_remaining_then_report_closed() {
		let (a, b) = Pipe::pair();
		b.write(Value::Int(1)).unwrap();
		b.close();
		assert_eq!(a.read(), Some(Value::Int(1)));
		assert_eq!(a.read(), None);
		assert!(a.is_closed());
	}

	#[test]
	fn listener_fires_once_per_empty_to_nonempty_transition() {
		let (a, b) = Pipe::pair();
		let calls = Rc::new(RefCell::new(0));
		let calls2 = Rc::clone(&calls);
		a.on_message(move || *calls2.borrow_mut() += 1);

		b.write(Value::Int(1)).unwrap();
		assert_eq!(*calls.borrow(), 1);
		b.write(Value::Int(2)).unwrap();
		assert_eq!(*calls.borrow(), 1, "still non-empty, listener must not refire");

		a.read();
		b.write(Value::Int(3)).unwrap();
		assert_eq!(*calls.borrow(), 1, "queue never went empty, one item remained");

		a.read();
		a.read();
		b.write(Value::Int(4)).unwrap();
		assert_eq!(*calls.borrow(), 2);
	}

	#[tokio::test]
	async fn read_wait_returns_already_queued_value_without_yielding() {
		let (a, b) = Pipe::pair();
		b.write(Value::Int(7)).unwrap();
		assert_eq!(a.read_wait().await, Some(Value::Int(7)));
	}

	#[tokio::test]
	async fn read_wait_reports_none_once_closed_and_drained() {
		let (a, b) = Pipe::pair();
		b.write(Value::Int(1)).unwrap();
		b.close();
		assert_eq!(a.read_wait().await, Some(Value::Int(1)));
		assert_eq!(a.read_wait().await, None);
	}
}
