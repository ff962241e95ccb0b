use crate::error::ServiceError;
use kestrel_doc::{DocumentSet, StreamEvent};
use kestrel_pipe::{ContextManager, Pipe};
use kestrel_rpc::Service;
use kestrel_value::{Value, kgr_object};
use std::rc::Rc;

/// `/document/notify`, per spec.md §6: a push-only feed of `{line}`
/// events, one per committed edit, so a screen pane knows which line to
/// re-pull from `/document/render` instead of re-rendering blind.
///
/// Unlike every other service in this crate, this one never replies to a
/// request — it expects exactly one `{documentId}` message to open the
/// subscription, then only ever writes.
pub struct DocumentNotifyService {
	documents: Rc<DocumentSet>,
}

impl DocumentNotifyService {
	pub fn new(documents: Rc<DocumentSet>) -> Self {
		DocumentNotifyService { documents }
	}
}

impl Service for DocumentNotifyService {
	fn attach(&self, pipe: Pipe, manager: &ContextManager) {
		let documents = Rc::clone(&self.documents);
		let pipe = Rc::new(pipe);
		manager.spawn(async move {
			let Some(request) = pipe.read_wait().await else { return };
			let Some(id) = request.field("documentId").and_then(Value::as_int) else {
				let _ = pipe.write(kgr_object!("error" => ServiceError::BadParams("missing documentId".to_string()).to_string()));
				return;
			};
			let doc = match documents.by_id(id as u64) {
				Ok(doc) => doc,
				Err(err) => {
					let _ = pipe.write(kgr_object!("error" => ServiceError::from(err).to_string()));
					return;
				}
			};

			let stream = doc.open_stream();
			let notify_pipe = Rc::clone(&pipe);
			let _sub = stream.on_change(move |_origin, event, tx| {
				if event == StreamEvent::Commit {
					let _ = notify_pipe.write(kgr_object!("line" => tx.position().line as i64));
				}
			});

			// Keep the subscription alive for as long as the connection is
			// open; this task does nothing else once it's registered.
			while !pipe.is_closed() {
				tokio::task::yield_now().await;
			}
		});
	}
}
