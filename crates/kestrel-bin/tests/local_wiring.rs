//! Drives `kestrel_bin::server::build` the way `main` does, but over local
//! pipes only: open a document, stand up a text pane for it, push a
//! keystroke through, render it back, then shut the whole server down.

use kestrel_bin::server;
use kestrel_config::KestrelConfig;
use kestrel_pipe::ContextManager;
use kestrel_value::{Value, kgr_object};
use tokio::task::LocalSet;

#[tokio::test]
async fn document_to_pane_round_trip_then_shutdown() {
	LocalSet::new()
		.run_until(async {
			let manager = ContextManager::new();
			let config = KestrelConfig::default();
			let app = server::build(&config);
			server::bootstrap_admin(&app, &manager, "test-secret").await;

			let documents = app.named.connect("/document/manager", &manager).unwrap();
			documents.write(kgr_object!("method" => "new", "params" => kgr_object!("newline" => "lf"))).unwrap();
			let reply = documents.read_wait().await.unwrap();
			let document_id = reply.field("id").and_then(Value::as_int).unwrap();

			let screen = app.named.connect("/screen/manager", &manager).unwrap();
			screen.write(kgr_object!("method" => "newMultiplexer", "params" => kgr_object!("path" => "/"))).unwrap();
			screen.read_wait().await.unwrap();
			screen
				.write(kgr_object!("method" => "newWindow", "params" => kgr_object!("path" => "/self", "width" => 80_i64, "height" => 24_i64)))
				.unwrap();
			screen.read_wait().await.unwrap();
			screen
				.write(kgr_object!("method" => "newTextEditor", "params" => kgr_object!("path" => "/0", "document" => document_id)))
				.unwrap();
			let editor_reply = screen.read_wait().await.unwrap();
			let pane_id = editor_reply.field("paneId").and_then(Value::as_int).unwrap();

			let pane = app.named.connect("/screen/component/text/pane", &manager).unwrap();
			pane.write(kgr_object!("method" => "bind", "params" => kgr_object!("paneId" => pane_id))).unwrap();
			pane.read_wait().await.unwrap();

			pane.write(kgr_object!("method" => "processInput", "params" => kgr_object!("type" => "char", "value" => "k"))).unwrap();
			let consumed = pane.read_wait().await.unwrap();
			assert_eq!(consumed, Value::Bool(true));

			pane.write(kgr_object!("method" => "render", "params" => kgr_object!("width" => 80_i64, "height" => 24_i64))).unwrap();
			let surface = pane.read_wait().await.unwrap();
			assert!(surface.field("error").is_none());

			let shutdown = app.named.connect("/editor/shutdown", &manager).unwrap();
			shutdown.write(kgr_object!("method" => "shutdown", "params" => Value::Null)).unwrap();
			shutdown.read_wait().await.unwrap();
			assert!(app.lifetime.is_cancelled());
		})
		.await;
}
