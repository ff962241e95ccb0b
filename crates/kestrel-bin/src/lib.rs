//! Wiring for the `kestrel` binary: every `/document`, `/screen` and
//! `/editor` endpoint onto one [`kestrel_rpc::NamedServer`], plus the
//! optional [`kestrel_bridge::BridgeServer`] listener tying it to remote
//! peers. Split out as a library so integration tests can drive the same
//! wiring `main` does.

pub mod cli;
pub mod server;
