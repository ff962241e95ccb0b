use crate::dispatch::{DispatchService, MethodTableBuilder};
use crate::error::ServiceError;
use crate::upstream::Upstream;
use kestrel_doc::{Document, DocumentSet, Newline};
use kestrel_rpc::{MethodOutcome, Service};
use kestrel_value::{Value, kgr_object};
use std::cell::RefCell;
use std::rc::Rc;

fn parse_encoding(params: &Value) -> Result<(), ServiceError> {
	match params.field("encoding").and_then(Value::as_str) {
		None | Some("utf8") | Some("utf-8") => Ok(()),
		Some(other) => Err(ServiceError::UnsupportedEncoding(other.to_string())),
	}
}

fn parse_newline(params: &Value) -> Newline {
	match params.field("newline").and_then(Value::as_str) {
		Some("crlf") => Newline::CrLf,
		_ => Newline::Lf,
	}
}

/// `/document/manager`, per spec.md §6: binds one connection to at most
/// one [`Document`] at a time, backed by a shared [`DocumentSet`] and a
/// pluggable [`Upstream`] for reading/writing the document's backing URI.
pub struct DocumentManagerService {
	documents: Rc<DocumentSet>,
	upstream: Rc<dyn Upstream>,
}

impl DocumentManagerService {
	pub fn new(documents: Rc<DocumentSet>, upstream: Rc<dyn Upstream>) -> Self {
		DocumentManagerService { documents, upstream }
	}
}

fn describe(doc: &Rc<Document>) -> Value {
	kgr_object!("id" => doc.id() as i64)
}

impl Service for DocumentManagerService {
	fn attach(&self, pipe: kestrel_pipe::Pipe, manager: &kestrel_pipe::ContextManager) {
		let documents = Rc::clone(&self.documents);
		let upstream = Rc::clone(&self.upstream);
		let inner = DispatchService::new(move || {
			let bound: Rc<RefCell<Option<Rc<Document>>>> = Rc::new(RefCell::new(None));
			let documents = Rc::clone(&documents);
			let upstream = Rc::clone(&upstream);

			let bound_new = Rc::clone(&bound);
			let documents_new = Rc::clone(&documents);
			let bound_open = Rc::clone(&bound);
			let documents_open = Rc::clone(&documents);
			let upstream_open = Rc::clone(&upstream);
			let bound_by_id = Rc::clone(&bound);
			let documents_by_id = Rc::clone(&documents);
			let bound_save = Rc::clone(&bound);
			let upstream_save = Rc::clone(&upstream);
			let bound_save_as = Rc::clone(&bound);
			let upstream_save_as = Rc::clone(&upstream);
			let bound_close = Rc::clone(&bound);
			let documents_close = Rc::clone(&documents);
			let bound_get_id = Rc::clone(&bound);
			let bound_get_upstream = Rc::clone(&bound);

			MethodTableBuilder::new()
				.method("new", move |params| {
					if let Err(err) = parse_encoding(&params) {
						return err.into();
					}
					let doc = documents_new.new_blank(parse_newline(&params));
					let reply = describe(&doc);
					*bound_new.borrow_mut() = Some(doc);
					MethodOutcome::Result(reply)
				})
				.method("open", move |params| {
					if let Err(err) = parse_encoding(&params) {
						return err.into();
					}
					let Some(path) = params.field("path").and_then(Value::as_str) else {
						return ServiceError::BadParams("missing path".to_string()).into();
					};
					let contents = match upstream_open.read(path) {
						Ok(contents) => contents,
						Err(err) => return ServiceError::Upstream(err).into(),
					};
					let doc = documents_open.open(path, parse_newline(&params), &contents);
					let reply = describe(&doc);
					*bound_open.borrow_mut() = Some(doc);
					MethodOutcome::Result(reply)
				})
				.method("openById", move |params| {
					let Some(id) = params.field("id").and_then(Value::as_int) else {
						return ServiceError::BadParams("missing id".to_string()).into();
					};
					match documents_by_id.by_id(id as u64) {
						Ok(doc) => {
							let reply = describe(&doc);
							*bound_by_id.borrow_mut() = Some(doc);
							MethodOutcome::Result(reply)
						}
						Err(err) => ServiceError::from(err).into(),
					}
				})
				.method("save", move |_params| {
					let Some(doc) = bound_save.borrow().clone() else {
						return ServiceError::NoDocumentBound.into();
					};
					let Some(uri) = doc.upstream_uri().map(str::to_string) else {
						return ServiceError::BadParams("document has no upstream uri".to_string()).into();
					};
					match upstream_save.write(&uri, &doc.render_to_string()) {
						Ok(()) => MethodOutcome::Result(Value::Null),
						Err(err) => ServiceError::Upstream(err).into(),
					}
				})
				.method("saveAs", move |params| {
					let Some(doc) = bound_save_as.borrow().clone() else {
						return ServiceError::NoDocumentBound.into();
					};
					let Some(path) = params.field("path").and_then(Value::as_str) else {
						return ServiceError::BadParams("missing path".to_string()).into();
					};
					match upstream_save_as.write(path, &doc.render_to_string()) {
						Ok(()) => MethodOutcome::Result(Value::Null),
						Err(err) => ServiceError::Upstream(err).into(),
					}
				})
				.method("close", move |_params| {
					if let Some(doc) = bound_close.borrow_mut().take() {
						documents_close.close(doc.id());
					}
					MethodOutcome::Result(Value::Null)
				})
				.method("getId", move |_params| match bound_get_id.borrow().as_ref() {
					Some(doc) => MethodOutcome::Result(Value::Int(doc.id() as i64)),
					None => ServiceError::NoDocumentBound.into(),
				})
				.method("getUpstream", move |_params| match bound_get_upstream.borrow().as_ref() {
					Some(doc) => MethodOutcome::Result(doc.upstream_uri().map(Value::from).unwrap_or(Value::Null)),
					None => ServiceError::NoDocumentBound.into(),
				})
				.build()
		});
		inner.attach(pipe, manager);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use kestrel_pipe::ContextManager;
	use std::collections::HashMap;
	use tokio::task::LocalSet;

	struct MemoryUpstream {
		files: Rc<RefCell<HashMap<String, String>>>,
	}

	impl Upstream for MemoryUpstream {
		fn read(&self, uri: &str) -> Result<String, String> {
			self.files.borrow().get(uri).cloned().ok_or_else(|| "not found".to_string())
		}

		fn write(&self, uri: &str, contents: &str) -> Result<(), String> {
			self.files.borrow_mut().insert(uri.to_string(), contents.to_string());
			Ok(())
		}
	}

	#[tokio::test]
	async fn new_then_get_id_round_trips() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let documents = Rc::new(DocumentSet::new());
				let upstream: Rc<dyn Upstream> = Rc::new(MemoryUpstream { files: Rc::new(RefCell::new(HashMap::new())) });
				let service = DocumentManagerService::new(Rc::clone(&documents), upstream);
				let (client, server) = kestrel_pipe::Pipe::pair();
				service.attach(server, &manager);

				client.write(kgr_object!("method" => "new", "params" => kgr_object!("newline" => "lf"))).unwrap();
				let reply = client.read_wait().await.unwrap();
				let id = reply.field("id").and_then(Value::as_int).unwrap();

				client.write(kgr_object!("method" => "getId", "params" => Value::Null)).unwrap();
				let id_reply = client.read_wait().await.unwrap();
				assert_eq!(id_reply.as_int(), Some(id));
			})
			.await;
	}

	#[tokio::test]
	async fn open_reads_through_the_upstream_and_save_writes_back() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let documents = Rc::new(DocumentSet::new());
				let files = Rc::new(RefCell::new(HashMap::new()));
				files.borrow_mut().insert("memory://a".to_string(), "hello".to_string());
				let upstream: Rc<dyn Upstream> = Rc::new(MemoryUpstream { files: Rc::clone(&files) });
				let service = DocumentManagerService::new(Rc::clone(&documents), upstream);
				let (client, server) = kestrel_pipe::Pipe::pair();
				service.attach(server, &manager);

				client.write(kgr_object!("method" => "open", "params" => kgr_object!("path" => "memory://a"))).unwrap();
				client.read_wait().await.unwrap();

				let doc = documents.by_id(0).unwrap();
				assert_eq!(doc.text().borrow().get_line(0).unwrap(), "hello");

				client.write(kgr_object!("method" => "save", "params" => Value::Null)).unwrap();
				let reply = client.read_wait().await.unwrap();
				assert!(reply.field("error").is_none());
				assert_eq!(files.borrow().get("memory://a").unwrap(), "hello");
			})
			.await;
	}

	#[tokio::test]
	async fn opening_a_missing_path_reports_an_error_not_a_panic() {
		LocalSet::new()
			.run_until(async {
				let manager = ContextManager::new();
				let documents = Rc::new(DocumentSet::new());
				let upstream: Rc<dyn Upstream> = Rc::new(MemoryUpstream { files: Rc::new(RefCell::new(HashMap::new())) });
				let service = DocumentManagerService::new(documents, upstream);
				let (client, server) = kestrel_pipe::Pipe::pair();
				service.attach(server, &manager);

				client.write(kgr_object!("method" => "open", "params" => kgr_object!("path" => "memory://missing"))).unwrap();
				let reply = client.read_wait().await.unwrap();
				assert!(reply.field("error").is_some());
			})
			.await;
	}
}
