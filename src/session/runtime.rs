//! Session runtime: one thread per subscription, serving its mailbox
//! FIFO and carrying the actor's actions out over the transport.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded};
use serde_json::Value;
use thiserror::Error;

use crate::config::Limits;
use crate::router::Router;
use crate::session::SessionError;
use crate::session::actor::{
    Barrier, CloseReason, Inbound, SessionAction, SessionActor, SessionMessage,
};
use crate::socket::{PushEvent, SessionId};
use crate::wire::{JoinParams, ServerEnvelope, Topic};

/// Outbound half of the duplex channel serving a session. Shared with the
/// transport layer; only the session thread sends.
pub trait Transport: Send + Sync {
    fn send(&self, envelope: ServerEnvelope) -> Result<(), TransportError>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
}

/// Driving surface for a spawned session.
pub struct SessionHandle {
    session_id: SessionId,
    topic: Topic,
    tx: Sender<SessionMessage>,
    thread: Option<thread::JoinHandle<CloseReason>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Clone of the mailbox sender, for callers that feed the session
    /// directly (transport glue, tests).
    pub fn sender(&self) -> Sender<SessionMessage> {
        self.tx.clone()
    }

    pub fn join(
        &self,
        params: JoinParams,
        msg_ref: Option<String>,
        join_ref: Option<String>,
    ) -> Result<(), SessionError> {
        self.send(Inbound::Join {
            params,
            msg_ref,
            join_ref,
        })
    }

    pub fn client_event(
        &self,
        event: impl Into<String>,
        payload: Value,
        msg_ref: Option<String>,
        join_ref: Option<String>,
    ) -> Result<(), SessionError> {
        self.send(Inbound::ClientEvent {
            event: event.into(),
            payload,
            msg_ref,
            join_ref,
        })
    }

    pub fn send_info(&self, message: Value) -> Result<(), SessionError> {
        self.send(Inbound::Info(message))
    }

    pub fn leave(&self) -> Result<(), SessionError> {
        self.send(Inbound::Leave)
    }

    pub fn transport_down(&self) -> Result<(), SessionError> {
        self.send(Inbound::TransportDown)
    }

    /// Synchronous barrier: returns once every prior mailbox message has
    /// been served.
    pub fn ping(&self, timeout: Duration) -> Result<(), SessionError> {
        self.barrier(timeout, Barrier::Ping)
    }

    /// Force a render cycle and return the new cycle counter.
    pub fn render_sync(&self, timeout: Duration) -> Result<i64, SessionError> {
        self.barrier(timeout, Barrier::RenderSync)
    }

    /// Push-events currently queued in the scratch (empty after a flush).
    pub fn get_events(&self, timeout: Duration) -> Result<Vec<PushEvent>, SessionError> {
        self.barrier(timeout, Barrier::GetEvents)
    }

    /// Flash delta currently in the scratch (empty after a flush).
    pub fn get_flash(
        &self,
        timeout: Duration,
    ) -> Result<BTreeMap<String, Value>, SessionError> {
        self.barrier(timeout, Barrier::GetFlash)
    }

    /// Wait for the session thread to stop and report why.
    pub fn close_reason(mut self) -> Option<CloseReason> {
        drop(self.tx);
        self.thread.take().and_then(|handle| handle.join().ok())
    }

    fn send(&self, msg: Inbound) -> Result<(), SessionError> {
        self.tx
            .send(SessionMessage::Inbound(msg))
            .map_err(|_| SessionError::MailboxClosed)
    }

    fn barrier<T>(
        &self,
        timeout: Duration,
        make: impl FnOnce(Sender<T>) -> Barrier,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(SessionMessage::Barrier(make(reply_tx)))
            .map_err(|_| SessionError::MailboxClosed)?;
        reply_rx
            .recv_timeout(timeout)
            .map_err(|_| SessionError::BarrierTimeout)
    }
}

/// Spawn the session actor for one subscription.
pub fn spawn_session(
    topic: Topic,
    router: Arc<Router>,
    limits: Limits,
    transport: Arc<dyn Transport>,
) -> Result<SessionHandle, SessionError> {
    let (tx, rx) = bounded(limits.max_mailbox_depth);
    let hibernate_after = Duration::from_millis(limits.hibernate_after_ms);
    let actor = SessionActor::new(topic.clone(), router, limits, tx.clone());
    let session_id = actor.session_id();

    let thread = thread::Builder::new()
        .name(format!("livedata-session-{session_id}"))
        .spawn(move || run_loop(actor, rx, transport, hibernate_after))
        .map_err(|err| SessionError::Spawn(err.to_string()))?;

    Ok(SessionHandle {
        session_id,
        topic,
        tx,
        thread: Some(thread),
    })
}

fn run_loop(
    mut actor: SessionActor,
    rx: Receiver<SessionMessage>,
    transport: Arc<dyn Transport>,
    hibernate_after: Duration,
) -> CloseReason {
    let span = tracing::info_span!(
        "session",
        session = %actor.session_id(),
        topic = %actor.topic(),
    );
    let _guard = span.enter();
    loop {
        let actions = match rx.recv_timeout(hibernate_after) {
            Ok(SessionMessage::Inbound(msg)) => actor.handle(msg),
            Ok(SessionMessage::Barrier(barrier)) => actor.answer_barrier(barrier),
            Err(RecvTimeoutError::Timeout) => {
                // Hibernation tick: state is kept as-is.
                tracing::trace!(session = %actor.session_id(), "hibernating");
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                actor.handle(Inbound::TransportDown);
                return CloseReason::Closed;
            }
        };

        for action in actions {
            match action {
                SessionAction::Send(envelope) => {
                    if transport.send(envelope).is_err() {
                        actor.handle(Inbound::TransportDown);
                        return CloseReason::Closed;
                    }
                }
                SessionAction::Close(reason) => {
                    tracing::debug!(session = %actor.session_id(), ?reason, "session stopped");
                    return reason;
                }
            }
        }
    }
}
