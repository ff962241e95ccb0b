use kestrel_bridge::{Authenticator, BridgeServer};
use kestrel_config::KestrelConfig;
use kestrel_doc::DocumentSet;
use kestrel_pipe::{ContextManager, StandardLifetime};
use kestrel_rpc::NamedServer;
use kestrel_screen::{ComponentTree, Handle};
use kestrel_services::{
	AuthorizationService, CursorPositions, CursorService, DirectoryAuthenticator, DocumentManagerService, DocumentNotifyService, FilesystemUpstream, RenderService, ScreenInputForwardService, ScreenInputNotifyService, ScreenManagerService, ScreenSizeNotifyService, ScreenTextPaneService,
	SearchService, ShutdownService, TextPaneRegistry, UserDirectory,
};
use kestrel_value::kgr_object;
use std::rc::Rc;
use tokio::net::TcpListener;

/// The endpoints every process registers, per spec.md §6. Used both to
/// build the local [`NamedServer`] and to `announce` each path to a
/// connecting bridge peer.
const ENDPOINTS: &[&str] = &[
	"/document/manager",
	"/document/cursor",
	"/document/render",
	"/document/notify",
	"/document/search",
	"/screen/manager",
	"/screen/size/notify",
	"/screen/component/input/forward",
	"/screen/component/input/notify",
	"/screen/component/text/pane",
	"/editor/shutdown",
	"/editor/authorization",
];

/// Everything a running process needs: the local service registry plus the
/// pieces `main` drives directly (the lifetime it waits on to exit, the
/// authenticator a bridge listener hands incoming connections, and the
/// size-notify service a terminal resize handler would call `broadcast`
/// on — left unused here since `kestrel-bin` has no real terminal).
pub struct KestrelServer {
	pub named: Rc<NamedServer>,
	pub lifetime: StandardLifetime,
	pub authenticator: Rc<DirectoryAuthenticator>,
	pub directory: Rc<UserDirectory>,
	pub tree: Rc<ComponentTree>,
}

/// Builds every `/document`, `/screen` and `/editor` service and registers
/// them on a fresh [`NamedServer`], per spec.md §6's module boundaries.
/// `config.default_encoding` isn't consulted yet: `DocumentSet` only ever
/// registers `Utf8Encoding`, so there is nowhere to plug another one in.
pub fn build(_config: &KestrelConfig) -> KestrelServer {
	let documents = Rc::new(DocumentSet::new());
	let positions = CursorPositions::new();
	let tree = Rc::new(ComponentTree::new(Handle::empty()));
	let panes = TextPaneRegistry::new();
	let upstream = Rc::new(FilesystemUpstream);
	let directory = UserDirectory::new();
	let authenticator = Rc::new(DirectoryAuthenticator::new(Rc::clone(&directory)));
	let lifetime = StandardLifetime::new();

	let broadcast_input = Rc::new(std::cell::RefCell::new(Vec::new()));

	let named = NamedServer::new();
	named.register("/document/manager", Rc::new(DocumentManagerService::new(Rc::clone(&documents), Rc::clone(&upstream) as Rc<dyn kestrel_services::Upstream>))).expect("fresh registry");
	named.register("/document/cursor", Rc::new(CursorService::new(Rc::clone(&documents), Rc::clone(&positions)))).expect("fresh registry");
	named.register("/document/render", Rc::new(RenderService::new(Rc::clone(&documents), Rc::clone(&positions)))).expect("fresh registry");
	named.register("/document/notify", Rc::new(DocumentNotifyService::new(Rc::clone(&documents)))).expect("fresh registry");
	named.register("/document/search", Rc::new(SearchService::new(Rc::clone(&documents)))).expect("fresh registry");
	named.register("/screen/manager", Rc::new(ScreenManagerService::new(Rc::clone(&tree), Rc::clone(&documents), Rc::clone(&positions), Rc::clone(&panes)))).expect("fresh registry");
	named.register("/screen/size/notify", Rc::new(ScreenSizeNotifyService::new())).expect("fresh registry");
	named.register("/screen/component/input/forward", Rc::new(ScreenInputForwardService::new(Rc::clone(&tree), Rc::clone(&broadcast_input)))).expect("fresh registry");
	named.register("/screen/component/input/notify", Rc::new(ScreenInputNotifyService::new(Rc::clone(&broadcast_input)))).expect("fresh registry");
	named.register("/screen/component/text/pane", Rc::new(ScreenTextPaneService::new(Rc::clone(&panes)))).expect("fresh registry");
	named.register("/editor/shutdown", Rc::new(ShutdownService::new(lifetime.clone()))).expect("fresh registry");
	named.register("/editor/authorization", Rc::new(AuthorizationService::new(Rc::clone(&directory)))).expect("fresh registry");

	KestrelServer { named, lifetime, authenticator, directory, tree }
}

/// Seeds one unrestricted principal so `/editor/authorization` has a way
/// in before any `addUser` call over the wire adds more. Goes through the
/// same `addUser` RPC the service exposes to anyone else, rather than
/// reaching into `UserDirectory` directly — there's no privileged
/// shortcut, just the first call.
pub async fn bootstrap_admin(server: &KestrelServer, manager: &ContextManager, secret: &str) {
	let pipe = server.named.connect("/editor/authorization", manager).expect("just registered");
	pipe.write(kgr_object!("method" => "addUser", "params" => kgr_object!("name" => "admin", "secret" => secret.to_string()))).expect("fresh pipe");
	pipe.read_wait().await;
	pipe.close();
}

/// Accepts bridge connections on `addr` until `server.lifetime` is
/// cancelled, each wrapped in its own [`BridgeServer`] over the endpoints
/// in [`ENDPOINTS`], per spec.md §4.11.
pub async fn serve_bridge(server: &KestrelServer, manager: Rc<ContextManager>, addr: std::net::SocketAddr, response_timeout: std::time::Duration) -> std::io::Result<()> {
	let listener = TcpListener::bind(addr).await?;
	tracing::info!(%addr, "kestrel bridge listening");

	loop {
		tokio::select! {
			accepted = listener.accept() => {
				let (stream, peer) = accepted?;
				tracing::info!(%peer, "bridge peer connected");
				let net = Rc::new(kestrel_rpc::NetInterface::new(stream, response_timeout));
				let bridge = BridgeServer::new(Rc::clone(&net), Rc::clone(&server.named), Rc::clone(&manager), Some(Rc::clone(&server.authenticator) as Rc<dyn Authenticator>));

				for path in ENDPOINTS.iter().copied() {
					if let Err(err) = bridge.announce(path).await {
						tracing::warn!(%peer, path, %err, "failed to announce endpoint");
					}
				}

				let manager_for_pump = Rc::clone(&manager);
				manager_for_pump.spawn(async move {
					loop {
						if net.process(1).await.is_err() || net.is_closed() {
							break;
						}
					}
				});
			}
			() = server.lifetime.cancelled() => {
				tracing::info!("shutdown requested, closing bridge listener");
				return Ok(());
			}
		}
	}
}
