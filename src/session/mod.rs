//! The per-subscription session engine: actor state machine, runtime
//! thread, asynchronous assigns, and pre-mount lifecycle hooks.

pub mod actor;
pub mod assign_async;
pub mod lifecycle;
pub mod runtime;

use thiserror::Error;

/// Failures of the session driving surface (mailbox sends and barriers).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session mailbox is closed")]
    MailboxClosed,
    #[error("session barrier timed out")]
    BarrierTimeout,
    #[error("failed to spawn session thread: {0}")]
    Spawn(String),
}
