//! The Named Server (service registry, spec.md §4.9) and Net Interface
//! (length-prefixed wire protocol, spec.md §4.10) that together form the
//! local and remote halves of the RPC bus.

mod error;
mod net;
mod registry;

pub use error::RpcError;
pub use net::{MethodHandler, MethodOutcome, NetInterface, ResponseOutcome};
pub use registry::{NamedServer, Service};
