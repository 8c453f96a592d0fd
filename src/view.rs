//! The view contract: a small closed set of optional operations the
//! session actor dispatches into.

use serde_json::Value;
use thiserror::Error;

use crate::render::{RenderError, Rendered};
use crate::session::assign_async::AsyncError;
use crate::socket::{Assigns, SessionId, Socket, SocketError};
use crate::wire::Topic;

/// Join-time attribution handed to lifecycle hooks.
#[derive(Debug, Clone)]
pub struct SessionMeta {
    pub id: SessionId,
    pub topic: Topic,
    /// Test-attribution tuple from the join params, when present.
    pub caller: Option<Value>,
    /// Options attached by the route handler.
    pub opts: Value,
}

/// Outcome of `handle_event`. The reply variant populates the scratch
/// reply, emitted after this cycle's patch and push-events.
#[derive(Debug)]
pub enum EventOutcome {
    NoReply(Socket),
    Reply(Value, Socket),
}

/// A failed user callback. Any of these terminates the session with a
/// crash close; they are never surfaced to the client as data.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("no handle_event clause for {event:?}")]
    UnhandledEvent { event: String },
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error(transparent)]
    Async(#[from] AsyncError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("{0}")]
    Failure(String),
}

/// A user-provided view.
///
/// All operations except `render` are optional; the defaults match a view
/// that exports nothing else. The actor consults `exports_mount` before
/// dispatching mount.
pub trait View: Send + Sync {
    /// Materialize the tree for the current assigns.
    fn render(&self, assigns: &Assigns) -> Result<Rendered, ViewError>;

    fn exports_mount(&self) -> bool {
        true
    }

    fn mount(&self, _params: &Value, socket: Socket) -> Result<Socket, ViewError> {
        Ok(socket)
    }

    fn handle_event(
        &self,
        event: &str,
        _payload: &Value,
        _socket: Socket,
    ) -> Result<EventOutcome, ViewError> {
        Err(ViewError::UnhandledEvent {
            event: event.to_string(),
        })
    }

    fn handle_info(&self, _message: &Value, socket: Socket) -> Result<Socket, ViewError> {
        Ok(socket)
    }
}
