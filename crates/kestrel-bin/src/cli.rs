use clap::Parser;
use std::net::SocketAddr;

/// Integration-test process wiring every `/document`, `/screen` and
/// `/editor` endpoint onto a local service registry and, if `--bind` is
/// given, a [`kestrel_bridge::BridgeServer`] listening for remote peers.
#[derive(Parser, Debug)]
#[command(name = "kestrel")]
#[command(about = "kestrel editor core, wired up for integration testing")]
#[command(version)]
pub struct Cli {
	/// Address to accept distributed bridge connections on. Omit to run
	/// local-pipe-only.
	#[arg(long)]
	pub bind: Option<SocketAddr>,

	/// Shared secret `/editor/authorization` accepts logins against before
	/// any `addUser` call adds more principals.
	#[arg(long, default_value = "kestrel")]
	pub secret: String,
}
