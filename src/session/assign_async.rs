//! Asynchronous assigns: producer tasks, their result envelopes, and the
//! tagged `AsyncResult` wrapper views consume.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use crossbeam::channel::Sender;
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

use crate::render::Rendered;
use crate::session::actor::{Inbound, SessionMessage};
use crate::socket::AssignKey;

/// Identity of one async attempt. A superseding `assign_async` call for
/// the same key issues a fresh ref; results carrying a stale ref are
/// discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AsyncRef(Uuid);

impl AsyncRef {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Deferred-value state held as an assign. Exactly one of loading/ok/
/// failed is truthy; transitions are `Loading -> Ok | Failed` and only a
/// fresh `assign_async` call restarts to `Loading`.
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncResult {
    Loading,
    Ok(Value),
    Failed(Value),
}

impl AsyncResult {
    /// Canonical four-field assign encoding.
    pub fn to_value(&self) -> Value {
        match self {
            AsyncResult::Loading => json!({
                "loading": true, "ok": false, "failed": null, "result": null,
            }),
            AsyncResult::Ok(result) => json!({
                "loading": false, "ok": true, "failed": null, "result": result,
            }),
            AsyncResult::Failed(error) => json!({
                "loading": false, "ok": false, "failed": error, "result": error,
            }),
        }
    }

    pub fn from_value(value: &Value) -> Result<Self, AsyncError> {
        let Value::Object(fields) = value else {
            return Err(AsyncError::NotAsyncResult);
        };
        let truthy = |key: &str| fields.get(key).and_then(Value::as_bool).unwrap_or(false);
        let field = |key: &str| fields.get(key).cloned().unwrap_or(Value::Null);
        if !fields.contains_key("loading") || !fields.contains_key("ok") {
            return Err(AsyncError::NotAsyncResult);
        }
        if truthy("loading") {
            Ok(AsyncResult::Loading)
        } else if truthy("ok") {
            Ok(AsyncResult::Ok(field("result")))
        } else if field("failed") != Value::Null {
            Ok(AsyncResult::Failed(field("failed")))
        } else {
            Err(AsyncError::NotAsyncResult)
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, AsyncResult::Loading)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AsyncError {
    #[error("value is not an AsyncResult assign")]
    NotAsyncResult,
}

/// Self-addressed message a finished producer posts to its session.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncEnvelope {
    pub kind: AsyncKind,
    pub async_ref: AsyncRef,
    /// Targeted component, or `None` for the root view. Carried as an
    /// extension point; only the root path is dispatched.
    pub component_id: Option<String>,
    pub keys: Vec<AssignKey>,
    pub outcome: AsyncOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncKind {
    Assign,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AsyncOutcome {
    Ok(BTreeMap<AssignKey, Value>),
    Failed(Value),
}

/// Run the producer on its own thread and post the outcome back to the
/// owning session's mailbox. Producer panics are captured as failures;
/// they never crash the session.
pub(crate) fn spawn_producer<F>(
    tx: Sender<SessionMessage>,
    async_ref: AsyncRef,
    keys: Vec<AssignKey>,
    producer: F,
) where
    F: FnOnce() -> Result<BTreeMap<AssignKey, Value>, Value> + Send + 'static,
{
    std::thread::spawn(move || {
        let outcome = match catch_unwind(AssertUnwindSafe(producer)) {
            Ok(Ok(map)) => AsyncOutcome::Ok(map),
            Ok(Err(error)) => AsyncOutcome::Failed(error),
            Err(panic) => AsyncOutcome::Failed(Value::String(panic_message(&panic))),
        };
        let envelope = AsyncEnvelope {
            kind: AsyncKind::Assign,
            async_ref,
            component_id: None,
            keys,
            outcome,
        };
        // The session may already be gone; a dead mailbox is fine.
        let _ = tx.send(SessionMessage::Inbound(Inbound::AsyncResult(envelope)));
    });
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "async producer panicked".to_string()
    }
}

/// Clause selection over an `AsyncResult` assign, for use inside render.
pub struct AsyncClauses<'a> {
    pub loading: Box<dyn Fn() -> Rendered + 'a>,
    pub ok: Box<dyn Fn(&Value) -> Rendered + 'a>,
    pub failed: Box<dyn Fn(&Value) -> Rendered + 'a>,
}

/// Select and invoke the clause matching the assign's state.
///
/// A value that is not an `AsyncResult` encoding is a fatal argument
/// error, surfaced to the developer as a session crash.
pub fn async_result(value: &Value, clauses: AsyncClauses<'_>) -> Result<Rendered, AsyncError> {
    match AsyncResult::from_value(value)? {
        AsyncResult::Loading => Ok((clauses.loading)()),
        AsyncResult::Ok(result) => Ok((clauses.ok)(&result)),
        AsyncResult::Failed(error) => Ok((clauses.failed)(&error)),
    }
}
