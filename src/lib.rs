#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod patch;
pub mod render;
pub mod router;
pub mod session;
pub mod socket;
pub mod telemetry;
pub mod test_harness;
pub mod view;
pub mod wire;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the working surface at the crate root for convenience
pub use crate::config::{Config, Limits, LoggingConfig};
pub use crate::patch::{PatchCodecError, PatchOp, compress, decompress};
pub use crate::render::{ComponentRef, RenderError, Rendered, RenderedComponent, render_view};
pub use crate::router::{RouteTarget, Router, RouterError};
pub use crate::session::SessionError;
pub use crate::session::actor::{
    Barrier, CloseReason, Inbound, SessionAction, SessionActor, SessionMessage, SessionPhase,
};
pub use crate::session::assign_async::{
    AsyncClauses, AsyncEnvelope, AsyncError, AsyncKind, AsyncOutcome, AsyncRef, AsyncResult,
    async_result,
};
pub use crate::session::lifecycle::{HookOutcome, MountHook, on_mount};
pub use crate::session::runtime::{SessionHandle, Transport, TransportError, spawn_session};
pub use crate::socket::{
    AssignKey, Assigns, ChangeHint, Endpoint, PushEvent, SessionId, Socket, SocketError,
};
pub use crate::view::{EventOutcome, SessionMeta, View, ViewError};
pub use crate::wire::{
    ClientEnvelope, EventPayload, JoinParams, PatchPayload, RedirectPayload, ReplyFrame,
    ReplyStatus, ServerEnvelope, Topic, WireError,
};
