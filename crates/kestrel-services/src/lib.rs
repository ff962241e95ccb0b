//! The `/document`, `/screen` and `/editor` service endpoints, per spec.md
//! §6: each wraps a [`kestrel_rpc::Service`] speaking the `{method, params}`
//! request / bare-value-or-`{error}` reply convention
//! [`dispatch::DispatchService`] shares across all of them, over state held
//! in [`kestrel_doc`], [`kestrel_render`] and [`kestrel_screen`].

mod authorization;
mod cursor;
mod dispatch;
mod documents;
mod error;
mod notify;
mod render;
mod screen;
mod search;
mod shutdown;
mod upstream;

pub use authorization::{AuthorizationService, DirectoryAuthenticator, UserDirectory};
pub use cursor::{CursorPositions, CursorService};
pub use dispatch::{DispatchService, MethodTable, MethodTableBuilder};
pub use documents::DocumentManagerService;
pub use error::ServiceError;
pub use notify::DocumentNotifyService;
pub use render::RenderService;
pub use screen::{ScreenInputForwardService, ScreenInputNotifyService, ScreenManagerService, ScreenSizeNotifyService, ScreenTextPaneService, TextPaneRegistry};
pub use search::SearchService;
pub use shutdown::ShutdownService;
pub use upstream::{FilesystemUpstream, Upstream};
