//! Master/slave transport bridging a local [`kestrel_rpc::NamedServer`] to
//! a peer over a [`kestrel_rpc::NetInterface`], with a challenge/response
//! auth handshake and per-principal access/modify ACLs, per spec.md §4.11.

mod acl;
mod auth;
mod error;
mod server;

pub use acl::{Acl, Principal};
pub use auth::{Authenticator, SharedSecretAuthenticator};
pub use error::BridgeError;
pub use server::BridgeServer;
