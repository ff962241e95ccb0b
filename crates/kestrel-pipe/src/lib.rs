//! In-process pipes and the cooperative single-thread scheduling that
//! drives them, per spec.md §4.8. A [`Pipe`] is a full-duplex FIFO of
//! [`kestrel_value::Value`]s; [`ContextManager`] binds contexts (pipe
//! handlers) and [`DeferredTask`]s onto the ambient `tokio::task::LocalSet`
//! a process or test establishes once at its entry point;
//! [`StandardLifetime`] scopes a group of pending work for collective
//! cancellation.

mod context;
mod lifetime;
mod pipe;

pub use context::{ContextManager, DeferredTask};
pub use lifetime::StandardLifetime;
pub use pipe::{Pipe, PipeError};
